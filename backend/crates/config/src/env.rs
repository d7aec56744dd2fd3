use chrono::NaiveDateTime;
use metrica_common::error::{MetricaError, MetricaResult};
use metrica_common::DATETIME_FORMAT;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub clickhouse_host: String,
    pub clickhouse_port: u16,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub clickhouse_database: String,
    pub clickhouse_secure: bool,
    pub clickhouse_verify: bool,
    pub clickhouse_ca_cert: Option<String>,
    pub clickhouse_timeout_secs: u64,
    /// Category names in the order they are synced.
    pub categories: Vec<String>,
    /// Lower bound used when a destination table holds no rows yet.
    pub epoch_start: NaiveDateTime,
    /// Keep going after a category fails instead of aborting the run.
    pub isolate_categories: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> MetricaResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        Ok(Self {
            clickhouse_host: get_var("CLICKHOUSE_HOST")?,
            clickhouse_port: get_var_or("CLICKHOUSE_PORT", "8443")
                .parse()
                .map_err(|e| MetricaError::Config(format!("invalid CLICKHOUSE_PORT: {e}")))?,
            clickhouse_user: get_var_or("CLICKHOUSE_USER", "default"),
            clickhouse_password: get_var_or("CLICKHOUSE_PASSWORD", ""),
            clickhouse_database: get_var_or("CLICKHOUSE_DATABASE", "default"),
            clickhouse_secure: parse_bool("CLICKHOUSE_SECURE", true)?,
            clickhouse_verify: parse_bool("CLICKHOUSE_VERIFY", true)?,
            clickhouse_ca_cert: env::var("CLICKHOUSE_CA_CERT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            clickhouse_timeout_secs: get_var_or("CLICKHOUSE_TIMEOUT_SECS", "60")
                .parse()
                .map_err(|e| {
                    MetricaError::Config(format!("invalid CLICKHOUSE_TIMEOUT_SECS: {e}"))
                })?,
            categories: parse_list("SYNC_CATEGORIES", "installations,events")?,
            epoch_start: NaiveDateTime::parse_from_str(
                &get_var_or("SYNC_EPOCH_START", "2020-01-01 00:00:00"),
                DATETIME_FORMAT,
            )
            .map_err(|e| MetricaError::Config(format!("invalid SYNC_EPOCH_START: {e}")))?,
            isolate_categories: parse_bool("SYNC_ISOLATE_CATEGORIES", false)?,
        })
    }

    /// Base URL of the ClickHouse HTTP interface.
    pub fn clickhouse_url(&self) -> String {
        let scheme = if self.clickhouse_secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.clickhouse_host, self.clickhouse_port)
    }
}

fn get_var(key: &str) -> MetricaResult<String> {
    env::var(key).map_err(|_| MetricaError::Config(format!("{key} is required but not set")))
}

fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_bool(key: &str, default: bool) -> MetricaResult<bool> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(MetricaError::Config(format!(
                "invalid {key}: expected a boolean, got {other:?}"
            ))),
        },
    }
}

/// Split a comma-separated var into trimmed, lowercased, non-empty entries.
fn parse_list(key: &str, default: &str) -> MetricaResult<Vec<String>> {
    let raw = get_var_or(key, default);
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    if items.is_empty() {
        return Err(MetricaError::Config(format!("{key} is set but lists nothing")));
    }

    Ok(items)
}

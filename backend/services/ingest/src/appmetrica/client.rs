use std::time::Duration;

use reqwest::{Client, StatusCode};

use super::models::Application;

pub const DEFAULT_BASE_URL: &str = "https://api.appmetrica.yandex.ru";

#[derive(Debug, Clone)]
pub struct AppMetricaClientConfig {
    pub base_url: String,
    pub token: String,
    pub applications: Vec<Application>,
    pub poll_max_attempts: u32,
    pub poll_interval_secs: u64,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl AppMetricaClientConfig {
    /// Load AppMetrica config from environment.
    ///
    /// `APPMETRICA_TOKEN` and `APPMETRICA_APP_IDS` are mandatory; everything
    /// else has a default.
    pub fn from_env() -> Result<Self, String> {
        let token = std::env::var("APPMETRICA_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| "APPMETRICA_TOKEN is required but not set".to_string())?;

        let applications = parse_csv_applications("APPMETRICA_APP_IDS")?;

        let base_url = std::env::var("APPMETRICA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let poll_max_attempts: u32 = env_or("APPMETRICA_POLL_MAX_ATTEMPTS", 40)?;
        if poll_max_attempts == 0 {
            return Err("APPMETRICA_POLL_MAX_ATTEMPTS must be at least 1".to_string());
        }
        let poll_interval_secs = env_or("APPMETRICA_POLL_INTERVAL_SECS", 30)?;
        let max_retries = env_or("APPMETRICA_MAX_RETRIES", 3)?;
        let timeout_secs = env_or("APPMETRICA_TIMEOUT_SECS", 300)?;

        Ok(Self {
            base_url,
            token,
            applications,
            poll_max_attempts,
            poll_interval_secs,
            max_retries,
            timeout_secs,
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, String> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated list of application ids (optionally `name:id`).
/// Returns `Err` if the var is missing or lists nothing.
pub fn parse_csv_applications(env_key: &str) -> Result<Vec<Application>, String> {
    let raw = std::env::var(env_key)
        .map_err(|_| format!("{env_key} is required but not set"))?;

    let apps = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Application::parse)
        .collect::<Result<Vec<_>, _>>()?;

    if apps.is_empty() {
        return Err(format!("{env_key} is set but contains no application ids"));
    }

    Ok(apps)
}

/// Raw outcome of one HTTP exchange with the export endpoint.
#[derive(Debug, Clone)]
pub struct ExportResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Clone)]
pub struct AppMetricaClient {
    client: Client,
    config: AppMetricaClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum AppMetricaClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl AppMetricaClient {
    pub fn new(config: AppMetricaClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn config(&self) -> &AppMetricaClientConfig {
        &self.config
    }

    /// Probe the management API; anything but `200 OK` is a failure.
    pub async fn test_connection(&self) -> Result<(), AppMetricaClientError> {
        let response = self.get("/management/v1/applications", &[]).await?;

        if response.status == StatusCode::OK {
            tracing::info!("connected to appmetrica");
            Ok(())
        } else {
            tracing::error!(status = %response.status, "appmetrica connectivity check failed");
            Err(AppMetricaClientError::HttpError {
                status: response.status,
                body: response.body,
            })
        }
    }

    /// Issue one export request. Status interpretation is left to the caller;
    /// only transport failures are errors here.
    pub async fn request_export(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<ExportResponse, AppMetricaClientError> {
        self.get(endpoint, params).await
    }

    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<ExportResponse, AppMetricaClientError> {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .get(&url)
                .header("Authorization", format!("OAuth {}", self.config.token))
                .query(params)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(AppMetricaClientError::RequestError(e));
                }
            };

            let status = response.status();
            let body = response.text().await?;
            return Ok(ExportResponse { status, body });
        }

        Err(AppMetricaClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

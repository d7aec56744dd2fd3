mod appmetrica;
mod error;
mod loader;
mod sync;
mod watermark;

#[cfg(test)]
mod test_support;

use std::process::ExitCode;

use metrica_config::{init_tracing, AppConfig};
use metrica_db::client::ClickHouseConfig;

use crate::appmetrica::category::DataCategory;
use crate::appmetrica::client::{AppMetricaClient, AppMetricaClientConfig};
use crate::appmetrica::export::PollPolicy;
use crate::error::SyncError;
use crate::sync::{SyncOrchestrator, SyncSettings};

fn clickhouse_config(config: &AppConfig) -> ClickHouseConfig {
    ClickHouseConfig {
        url: config.clickhouse_url(),
        user: config.clickhouse_user.clone(),
        password: config.clickhouse_password.clone(),
        database: config.clickhouse_database.clone(),
        verify_tls: config.clickhouse_verify,
        ca_cert_path: config.clickhouse_ca_cert.clone(),
        timeout_secs: config.clickhouse_timeout_secs,
    }
}

fn sync_settings(
    config: &AppConfig,
    appmetrica: &AppMetricaClientConfig,
) -> Result<SyncSettings, SyncError> {
    let categories = DataCategory::parse_list(&config.categories).map_err(SyncError::Config)?;

    Ok(SyncSettings {
        database: config.clickhouse_database.clone(),
        categories,
        epoch_start: config.epoch_start,
        isolate_categories: config.isolate_categories,
        poll: PollPolicy::new(appmetrica.poll_max_attempts, appmetrica.poll_interval_secs),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing("info");

    tracing::info!(service = "metrica-ingest", "starting");

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let appmetrica_config = match AppMetricaClientConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid appmetrica configuration");
            return ExitCode::FAILURE;
        }
    };

    let settings = match sync_settings(&config, &appmetrica_config) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "invalid sync settings");
            return ExitCode::FAILURE;
        }
    };

    let store = match metrica_db::create_repository(clickhouse_config(&config)) {
        Ok(repo) => repo,
        Err(e) => {
            tracing::error!(error = %e, "failed to configure clickhouse");
            return ExitCode::FAILURE;
        }
    };

    let client = match AppMetricaClient::new(appmetrica_config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to build appmetrica client");
            return ExitCode::FAILURE;
        }
    };

    let applications = client.config().applications.clone();
    tracing::info!(
        applications = applications.len(),
        categories = ?settings.categories,
        poll_ceiling_secs = settings.poll.ceiling_secs(),
        "appmetrica sync configured"
    );

    let orchestrator = SyncOrchestrator::new(client, store, settings);
    let mut failed_runs = 0;

    for app in &applications {
        match orchestrator.run(app.id).await {
            Ok(report) if report.is_success() => {
                tracing::info!(
                    app = %app,
                    run_id = %report.run_id,
                    rows = report.rows_loaded(),
                    "sync completed"
                );
            }
            Ok(report) => {
                failed_runs += 1;
                for failure in &report.failed {
                    tracing::error!(
                        app = %app,
                        run_id = %report.run_id,
                        category = %failure.category,
                        error = %failure.error,
                        "category failed"
                    );
                }
            }
            Err(e) => {
                failed_runs += 1;
                tracing::error!(app = %app, error = %e, "sync failed");
            }
        }
    }

    if failed_runs > 0 {
        tracing::error!(failed_runs, "sync finished with failures");
        ExitCode::FAILURE
    } else {
        tracing::info!("sync finished");
        ExitCode::SUCCESS
    }
}

pub mod analytics;
pub mod client;

use analytics::ch_repository::ChAnalyticsRepository;
use client::{ClickHouseClient, ClickHouseConfig};
use metrica_common::error::MetricaResult;

/// Build a ClickHouse-backed analytics repository. No connection is opened yet.
pub fn create_repository(config: ClickHouseConfig) -> MetricaResult<ChAnalyticsRepository> {
    tracing::info!(url = %config.url, database = %config.database, "configuring clickhouse");
    let client = ClickHouseClient::new(config)?;
    Ok(ChAnalyticsRepository::new(client))
}

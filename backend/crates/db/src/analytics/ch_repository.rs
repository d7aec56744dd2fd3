use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::analytics::models::{validate_identifier, Row, TableRef};
use crate::analytics::repositories::{AnalyticsRepository, EqFilter};
use crate::client::ClickHouseClient;
use metrica_common::error::{MetricaError, MetricaResult};
use metrica_common::DATETIME_FORMAT;

#[derive(Clone)]
pub struct ChAnalyticsRepository {
    client: Arc<ClickHouseClient>,
}

impl ChAnalyticsRepository {
    pub fn new(client: ClickHouseClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    fn max_timestamp_sql(
        table: &TableRef,
        timestamp_column: &str,
        filter: Option<EqFilter<'_>>,
    ) -> MetricaResult<String> {
        validate_identifier(timestamp_column)?;

        let where_clause = match filter {
            Some(f) => {
                validate_identifier(f.column)?;
                format!(" WHERE {} = {}", f.column, f.value)
            }
            None => String::new(),
        };

        Ok(format!(
            "SELECT maxOrNull({timestamp_column}) AS max_ts FROM {}{where_clause} FORMAT JSONEachRow",
            table.qualified()
        ))
    }
}

/// Parse a ClickHouse `DateTime` / `DateTime64` rendering.
fn parse_clickhouse_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

#[async_trait]
impl AnalyticsRepository for ChAnalyticsRepository {
    async fn connect(&self) -> MetricaResult<()> {
        self.client.connect().await
    }

    fn disconnect(&self) {
        self.client.disconnect();
    }

    async fn max_timestamp(
        &self,
        table: &TableRef,
        timestamp_column: &str,
        filter: Option<EqFilter<'_>>,
    ) -> MetricaResult<Option<NaiveDateTime>> {
        let sql = Self::max_timestamp_sql(table, timestamp_column, filter)?;
        let rows = self.client.query_rows(&sql).await?;

        let value = rows
            .first()
            .and_then(|r| r.get("max_ts"))
            .ok_or_else(|| MetricaError::Query(format!("no max_ts in response for {table}")))?;

        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::String(s) => parse_clickhouse_datetime(s)
                .map(Some)
                .ok_or_else(|| MetricaError::Query(format!("unparseable max_ts {s:?}"))),
            other => Err(MetricaError::Query(format!("unexpected max_ts value {other}"))),
        }
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Row]) -> MetricaResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.client
            .insert_json_rows(&table.qualified(), rows)
            .await?;

        tracing::info!(table = %table, rows = rows.len(), "inserted rows");
        Ok(rows.len())
    }
}

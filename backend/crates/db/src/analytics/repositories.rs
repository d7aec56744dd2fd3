use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::analytics::models::{Row, TableRef};
use metrica_common::error::MetricaResult;

/// Restricts an aggregate to rows where `column = value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EqFilter<'a> {
    pub column: &'a str,
    pub value: u64,
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Open the connection and verify the server responds.
    async fn connect(&self) -> MetricaResult<()>;

    /// Release the connection. Later reads and writes fail with `StorageUnavailable`.
    fn disconnect(&self);

    /// `MAX(timestamp_column)` over `table`, or `None` when no row matches.
    async fn max_timestamp(
        &self,
        table: &TableRef,
        timestamp_column: &str,
        filter: Option<EqFilter<'_>>,
    ) -> MetricaResult<Option<NaiveDateTime>>;

    /// Insert all rows as one bulk write. Returns the number of rows sent.
    async fn insert_rows(&self, table: &TableRef, rows: &[Row]) -> MetricaResult<usize>;
}

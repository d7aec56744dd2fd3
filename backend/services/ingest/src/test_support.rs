//! In-memory stand-in for the ClickHouse repository.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDateTime;

use metrica_common::error::{MetricaError, MetricaResult};
use metrica_db::analytics::models::{Row, TableRef};
use metrica_db::analytics::repositories::{AnalyticsRepository, EqFilter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkQuery {
    pub table: String,
    pub column: String,
    pub filter: Option<(String, u64)>,
}

#[derive(Clone, Default)]
pub struct MockStore {
    pub refuse_connect: bool,
    /// Tables whose inserts fail.
    pub failing_tables: Vec<String>,
    pub watermark: Option<NaiveDateTime>,
    pub connects: Arc<AtomicUsize>,
    pub connected: Arc<AtomicBool>,
    pub disconnects: Arc<AtomicUsize>,
    pub watermark_queries: Arc<Mutex<Vec<WatermarkQuery>>>,
    pub inserts: Arc<Mutex<Vec<(String, Vec<Row>)>>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(mut self, watermark: NaiveDateTime) -> Self {
        self.watermark = Some(watermark);
        self
    }

    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub fn failing_inserts_into(mut self, table: &str) -> Self {
        self.failing_tables.push(table.to_string());
        self
    }

    pub fn inserted_tables(&self) -> Vec<String> {
        self.inserts
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    fn ensure_connected(&self) -> MetricaResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MetricaError::StorageUnavailable("not connected".to_string()))
        }
    }
}

#[async_trait]
impl AnalyticsRepository for MockStore {
    async fn connect(&self) -> MetricaResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect {
            return Err(MetricaError::StorageUnavailable(
                "connection refused".to_string(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn max_timestamp(
        &self,
        table: &TableRef,
        timestamp_column: &str,
        filter: Option<EqFilter<'_>>,
    ) -> MetricaResult<Option<NaiveDateTime>> {
        self.ensure_connected()?;
        self.watermark_queries.lock().unwrap().push(WatermarkQuery {
            table: table.qualified(),
            column: timestamp_column.to_string(),
            filter: filter.map(|f| (f.column.to_string(), f.value)),
        });
        Ok(self.watermark)
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[Row]) -> MetricaResult<usize> {
        self.ensure_connected()?;
        if self.failing_tables.iter().any(|t| *t == table.table) {
            return Err(MetricaError::StorageWrite(format!(
                "insert into {table} rejected"
            )));
        }
        self.inserts
            .lock()
            .unwrap()
            .push((table.qualified(), rows.to_vec()));
        Ok(rows.len())
    }
}

use chrono::NaiveDateTime;

use metrica_db::analytics::models::Row;
use metrica_db::analytics::repositories::AnalyticsRepository;

use crate::appmetrica::category::DataCategory;
use crate::appmetrica::models::RecordBatch;
use crate::appmetrica::schema::{coerce_record, parse_datetime};
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub rows: usize,
    /// Newest timestamp in the batch; the next run starts after it.
    pub max_timestamp: Option<NaiveDateTime>,
}

impl LoadSummary {
    fn empty() -> Self {
        Self {
            rows: 0,
            max_timestamp: None,
        }
    }
}

/// Coerces an export batch and writes it as one bulk insert.
pub struct ResultLoader<'a, R> {
    repo: &'a R,
    database: &'a str,
}

impl<'a, R: AnalyticsRepository> ResultLoader<'a, R> {
    pub fn new(repo: &'a R, database: &'a str) -> Self {
        Self { repo, database }
    }

    /// Every record is coerced before anything is written: one bad record
    /// keeps the whole batch out of the table.
    pub async fn load(
        &self,
        category: DataCategory,
        records: &RecordBatch,
    ) -> Result<LoadSummary, SyncError> {
        if records.is_empty() {
            tracing::info!(%category, "export returned no records, nothing to load");
            return Ok(LoadSummary::empty());
        }

        let table = category.table_ref(self.database)?;

        let rows = records
            .iter()
            .map(|record| coerce_record(category, record))
            .collect::<Result<Vec<Row>, _>>()
            .map_err(|violation| {
                tracing::error!(
                    %category,
                    field = %violation.field,
                    value = %violation.value,
                    "record does not match destination schema"
                );
                SyncError::SchemaViolation(violation)
            })?;

        let inserted = self.repo.insert_rows(&table, &rows).await.map_err(|e| {
            tracing::error!(%category, table = %table, rows = rows.len(), error = %e, "bulk insert failed");
            SyncError::Storage(e)
        })?;

        let max_timestamp = rows
            .iter()
            .filter_map(|row| row.get(category.timestamp_column()))
            .filter_map(|v| v.as_str())
            .filter_map(parse_datetime)
            .max();

        tracing::info!(%category, table = %table, rows = inserted, ?max_timestamp, "loaded batch");

        Ok(LoadSummary {
            rows: inserted,
            max_timestamp,
        })
    }
}

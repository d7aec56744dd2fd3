use chrono::NaiveDateTime;

use metrica_db::analytics::repositories::{AnalyticsRepository, EqFilter};

use crate::appmetrica::category::DataCategory;
use crate::error::SyncError;

/// Where the next export window starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watermark {
    /// Newest timestamp already in the table.
    Stored(NaiveDateTime),
    /// Nothing stored yet; the configured epoch start.
    Epoch(NaiveDateTime),
}

impl Watermark {
    /// First second to request. A stored second is already loaded; the epoch
    /// second is not.
    pub fn export_since(&self) -> NaiveDateTime {
        match *self {
            Self::Stored(ts) => ts + chrono::Duration::seconds(1),
            Self::Epoch(ts) => ts,
        }
    }
}

/// Reads the newest persisted timestamp for a category and application.
/// Nothing is cached: every call queries the store.
pub struct WatermarkReader<'a, R> {
    repo: &'a R,
    database: &'a str,
    epoch_start: NaiveDateTime,
}

impl<'a, R: AnalyticsRepository> WatermarkReader<'a, R> {
    pub fn new(repo: &'a R, database: &'a str, epoch_start: NaiveDateTime) -> Self {
        Self {
            repo,
            database,
            epoch_start,
        }
    }

    /// Max timestamp already stored, or the epoch start when the table holds
    /// nothing for this application yet.
    pub async fn get_max_timestamp(
        &self,
        category: DataCategory,
        app_id: u64,
    ) -> Result<Watermark, SyncError> {
        let table = category.table_ref(self.database)?;
        let filter = EqFilter {
            column: category.application_column(),
            value: app_id,
        };

        let max = self
            .repo
            .max_timestamp(&table, category.timestamp_column(), Some(filter))
            .await
            .map_err(|e| {
                tracing::error!(%category, app_id, table = %table, error = %e, "watermark query failed");
                SyncError::Storage(e)
            })?;

        match max {
            Some(ts) => {
                tracing::info!(%category, app_id, watermark = %ts, "read watermark");
                Ok(Watermark::Stored(ts))
            }
            None => {
                tracing::info!(
                    %category,
                    app_id,
                    epoch_start = %self.epoch_start,
                    "no rows yet, starting from epoch"
                );
                Ok(Watermark::Epoch(self.epoch_start))
            }
        }
    }
}

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::Instrument;
use uuid::Uuid;

use metrica_db::analytics::repositories::AnalyticsRepository;

use crate::appmetrica::category::DataCategory;
use crate::appmetrica::client::AppMetricaClient;
use crate::appmetrica::export::{ExportJob, ExportRequest, PollPolicy};
use crate::error::{Endpoint, SyncError};
use crate::loader::{LoadSummary, ResultLoader};
use crate::watermark::WatermarkReader;

/// Source of "now"; replaced in tests to pin the export window.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub database: String,
    /// Synced in this order.
    pub categories: Vec<DataCategory>,
    pub epoch_start: NaiveDateTime,
    /// Keep going after a category fails instead of aborting the run.
    pub isolate_categories: bool,
    pub poll: PollPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Loaded(LoadSummary),
    /// The window between the watermark and yesterday's last second is empty.
    UpToDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryResult {
    pub category: DataCategory,
    pub since: NaiveDateTime,
    pub until: NaiveDateTime,
    pub outcome: CategoryOutcome,
}

#[derive(Debug)]
pub struct CategoryFailure {
    pub category: DataCategory,
    pub error: SyncError,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub app_id: u64,
    pub completed: Vec<CategoryResult>,
    /// Only populated when categories are isolated.
    pub failed: Vec<CategoryFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn rows_loaded(&self) -> usize {
        self.completed
            .iter()
            .map(|r| match &r.outcome {
                CategoryOutcome::Loaded(summary) => summary.rows,
                CategoryOutcome::UpToDate => 0,
            })
            .sum()
    }
}

/// Holds the store connection for one run and releases it when dropped.
struct StoreSession<'a, R: AnalyticsRepository> {
    store: &'a R,
}

impl<'a, R: AnalyticsRepository> StoreSession<'a, R> {
    async fn open(store: &'a R) -> Result<Self, SyncError> {
        // guard first, so a half-open connection is released too
        let session = Self { store };
        store.connect().await.map_err(|e| {
            tracing::error!(error = %e, "clickhouse connection check failed");
            SyncError::Connection {
                which: Endpoint::Destination,
                reason: e.to_string(),
            }
        })?;
        Ok(session)
    }
}

impl<R: AnalyticsRepository> Drop for StoreSession<'_, R> {
    fn drop(&mut self) {
        self.store.disconnect();
        tracing::debug!("clickhouse connection released");
    }
}

pub struct SyncOrchestrator<R> {
    client: AppMetricaClient,
    store: R,
    settings: SyncSettings,
    clock: Clock,
}

impl<R: AnalyticsRepository> SyncOrchestrator<R> {
    pub fn new(client: AppMetricaClient, store: R, settings: SyncSettings) -> Self {
        Self {
            client,
            store,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sync every configured category for one application.
    pub async fn run(&self, app_id: u64) -> Result<RunReport, SyncError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_run", %run_id, app_id);
        self.run_inner(run_id, app_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, app_id: u64) -> Result<RunReport, SyncError> {
        let _session = StoreSession::open(&self.store).await?;

        self.client.test_connection().await.map_err(|e| {
            tracing::error!(error = %e, "appmetrica connection check failed");
            SyncError::Connection {
                which: Endpoint::Source,
                reason: e.to_string(),
            }
        })?;

        tracing::info!(
            categories = ?self.settings.categories,
            isolate = self.settings.isolate_categories,
            "starting sync run"
        );

        let mut report = RunReport {
            run_id,
            app_id,
            completed: Vec::new(),
            failed: Vec::new(),
        };

        for &category in &self.settings.categories {
            match self.sync_category(category, app_id).await {
                Ok(result) => report.completed.push(result),
                Err(error) => {
                    tracing::error!(%category, error = %error, "category sync failed");
                    if !self.settings.isolate_categories {
                        return Err(error);
                    }
                    report.failed.push(CategoryFailure { category, error });
                }
            }
        }

        tracing::info!(
            rows = report.rows_loaded(),
            failed = report.failed.len(),
            "sync run finished"
        );
        Ok(report)
    }

    async fn sync_category(
        &self,
        category: DataCategory,
        app_id: u64,
    ) -> Result<CategoryResult, SyncError> {
        let watermark =
            WatermarkReader::new(&self.store, &self.settings.database, self.settings.epoch_start)
                .get_max_timestamp(category, app_id)
                .await?;

        let since = watermark.export_since();
        let request = ExportRequest::new(category, app_id, since, (self.clock)());
        let until = request.until;

        if request.is_empty_range() {
            tracing::info!(%category, %since, %until, "already up to date, skipping export");
            return Ok(CategoryResult {
                category,
                since,
                until,
                outcome: CategoryOutcome::UpToDate,
            });
        }

        let mut job = ExportJob::new(&self.client);
        job.submit(request).await?;
        let records = job.poll(self.settings.poll).await?;

        let summary = ResultLoader::new(&self.store, &self.settings.database)
            .load(category, &records)
            .await?;

        Ok(CategoryResult {
            category,
            since,
            until,
            outcome: CategoryOutcome::Loaded(summary),
        })
    }
}

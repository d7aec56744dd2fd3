//! Asynchronous Logs API export: submit a request, then re-issue the identical
//! request until the export is ready.
//!
//! The Logs API deduplicates exports by request fingerprint (endpoint,
//! application, date range and field list). There is no job id: polling means
//! sending exactly the same query again. [`ExportJob`] freezes the parameters
//! at submit time so every poll replays them byte for byte.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use reqwest::StatusCode;

use metrica_common::DATETIME_FORMAT;

use super::category::DataCategory;
use super::client::{AppMetricaClient, AppMetricaClientError};
use super::models::{ExportPayload, RecordBatch};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequest {
    pub category: DataCategory,
    pub application_id: u64,
    pub since: NaiveDateTime,
    pub until: NaiveDateTime,
}

impl ExportRequest {
    /// Build a request covering `since` up to the last second of yesterday
    /// (relative to `now`), so the still-filling current day is never requested.
    pub fn new(
        category: DataCategory,
        application_id: u64,
        since: NaiveDateTime,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            category,
            application_id,
            since,
            until: last_complete_second(now),
        }
    }

    /// `true` when there is nothing to ask for: `since` is past `until`.
    pub fn is_empty_range(&self) -> bool {
        self.since > self.until
    }

    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("application_id", self.application_id.to_string()),
            ("date_since", self.since.format(DATETIME_FORMAT).to_string()),
            ("date_until", self.until.format(DATETIME_FORMAT).to_string()),
            ("fields", self.category.fields().join(",")),
        ]
    }
}

/// Start of `now`'s UTC day minus one second.
pub fn last_complete_second(now: DateTime<Utc>) -> NaiveDateTime {
    now.date_naive().and_time(NaiveTime::MIN) - chrono::Duration::seconds(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// At least one poll is always made.
    pub fn new(max_attempts: u32, interval_secs: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Worst-case time spent waiting before giving up.
    pub fn ceiling_secs(&self) -> u64 {
        u64::from(self.max_attempts) * self.interval.as_secs()
    }
}

impl Default for PollPolicy {
    /// 40 attempts, 30 seconds apart: a 20 minute ceiling.
    fn default() -> Self {
        Self::new(40, 30)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// `202`: the export started processing.
    Accepted,
    /// `200`: an identical request was already accepted.
    AlreadyRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    NotSubmitted,
    Pending,
    Ready,
    Failed,
    TimedOut,
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::TimedOut)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("export request rejected: HTTP {status}: {body}")]
    RequestRejected { status: StatusCode, body: String },

    #[error("export failed: HTTP {status}: {body}")]
    ExportFailed { status: StatusCode, body: String },

    #[error("export not ready after {attempts} attempts ({elapsed_secs}s)")]
    ExportTimedOut { attempts: u32, elapsed_secs: u64 },

    #[error("export polled before a successful submit")]
    NotSubmitted,

    #[error("export already submitted")]
    AlreadySubmitted,

    #[error("export already finished in state {0:?}")]
    AlreadyFinished(ExportState),

    #[error("cannot decode export payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Client(#[from] AppMetricaClientError),
}

/// One export exchange for one category and application.
pub struct ExportJob<'a> {
    client: &'a AppMetricaClient,
    request: Option<ExportRequest>,
    state: ExportState,
}

impl<'a> ExportJob<'a> {
    pub fn new(client: &'a AppMetricaClient) -> Self {
        Self {
            client,
            request: None,
            state: ExportState::NotSubmitted,
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    /// Ask the Logs API to prepare the export. Callable once per job.
    pub async fn submit(&mut self, request: ExportRequest) -> Result<SubmitOutcome, ExportError> {
        if self.state != ExportState::NotSubmitted {
            return Err(ExportError::AlreadySubmitted);
        }

        let params = request.query_params();
        let response = match self
            .client
            .request_export(request.category.endpoint(), &params)
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.state = ExportState::Failed;
                tracing::error!(
                    category = %request.category,
                    app_id = request.application_id,
                    error = %e,
                    "export submit failed"
                );
                return Err(e.into());
            }
        };

        let outcome = match response.status {
            StatusCode::ACCEPTED => SubmitOutcome::Accepted,
            StatusCode::OK => SubmitOutcome::AlreadyRequested,
            status => {
                self.state = ExportState::Failed;
                tracing::error!(
                    category = %request.category,
                    app_id = request.application_id,
                    since = %request.since,
                    until = %request.until,
                    %status,
                    body = %response.body,
                    "export request rejected"
                );
                return Err(ExportError::RequestRejected {
                    status,
                    body: response.body,
                });
            }
        };

        tracing::info!(
            category = %request.category,
            app_id = request.application_id,
            since = %request.since,
            until = %request.until,
            ?outcome,
            "export submitted"
        );

        self.request = Some(request);
        self.state = ExportState::Pending;
        Ok(outcome)
    }

    /// Re-issue the submitted request until it is ready, fails, or the policy
    /// runs out of attempts. No sleep follows the final attempt.
    pub async fn poll(&mut self, policy: PollPolicy) -> Result<RecordBatch, ExportError> {
        let request = match (&self.request, self.state) {
            (None, _) => return Err(ExportError::NotSubmitted),
            (Some(_), state) if state.is_terminal() => {
                return Err(ExportError::AlreadyFinished(state))
            }
            (Some(request), _) => request,
        };
        let params = request.query_params();
        let endpoint = request.category.endpoint();

        for attempt in 1..=policy.max_attempts {
            let response = match self.client.request_export(endpoint, &params).await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::error!(
                        category = %request.category,
                        app_id = request.application_id,
                        attempt,
                        error = %e,
                        "export poll failed"
                    );
                    self.state = ExportState::Failed;
                    return Err(e.into());
                }
            };

            match response.status {
                StatusCode::ACCEPTED => {
                    tracing::debug!(
                        category = %request.category,
                        attempt,
                        max_attempts = policy.max_attempts,
                        "export still processing"
                    );
                    if attempt < policy.max_attempts {
                        tokio::time::sleep(policy.interval).await;
                    }
                }
                StatusCode::OK => {
                    let payload: ExportPayload = match serde_json::from_str(&response.body) {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::error!(
                                category = %request.category,
                                app_id = request.application_id,
                                since = %request.since,
                                until = %request.until,
                                attempt,
                                error = %e,
                                "export payload is not a data array"
                            );
                            self.state = ExportState::Failed;
                            return Err(ExportError::Decode(e.to_string()));
                        }
                    };

                    tracing::info!(
                        category = %request.category,
                        app_id = request.application_id,
                        attempt,
                        records = payload.data.len(),
                        "export ready"
                    );
                    self.state = ExportState::Ready;
                    return Ok(payload.data);
                }
                status => {
                    tracing::error!(
                        category = %request.category,
                        app_id = request.application_id,
                        since = %request.since,
                        until = %request.until,
                        attempt,
                        %status,
                        body = %response.body,
                        "export failed"
                    );
                    self.state = ExportState::Failed;
                    return Err(ExportError::ExportFailed {
                        status,
                        body: response.body,
                    });
                }
            }
        }

        let elapsed_secs = policy.ceiling_secs();
        tracing::error!(
            category = %request.category,
            app_id = request.application_id,
            since = %request.since,
            until = %request.until,
            attempts = policy.max_attempts,
            elapsed_secs,
            "export timed out"
        );
        self.state = ExportState::TimedOut;
        Err(ExportError::ExportTimedOut {
            attempts: policy.max_attempts,
            elapsed_secs,
        })
    }
}

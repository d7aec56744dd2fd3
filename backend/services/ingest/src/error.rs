use metrica_common::error::MetricaError;

use crate::appmetrica::export::ExportError;
use crate::appmetrica::schema::SchemaViolation;

/// Which side of the pipeline a pre-flight check failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Destination,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => f.write_str("appmetrica"),
            Self::Destination => f.write_str("clickhouse"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("{which} connection check failed: {reason}")]
    Connection { which: Endpoint, reason: String },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),

    #[error(transparent)]
    Storage(#[from] MetricaError),

    #[error("configuration error: {0}")]
    Config(String),
}

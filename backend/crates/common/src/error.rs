use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricaError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("storage write error: {0}")]
    StorageWrite(String),
}

pub type MetricaResult<T> = Result<T, MetricaError>;

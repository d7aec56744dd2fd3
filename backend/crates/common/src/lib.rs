pub mod error;

pub use error::{MetricaError, MetricaResult};

/// Timestamp layout shared by the AppMetrica Logs API and ClickHouse `DateTime`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

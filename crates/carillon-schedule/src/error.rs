//! Error types for the schedule core.

use thiserror::Error;

/// Result type for schedule operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors raised while building or enumerating schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The line matched none of the crontab entry shapes.
    #[error("unknown crontab line format: '{0}'")]
    UnknownLineFormat(String),

    /// The pre-filter accepted the line but the evaluator refused the
    /// expression.
    #[error("failed to parse cron expression '{line}': {source}")]
    CronExpr {
        line: String,
        source: cron::error::Error,
    },

    /// I/O failure reading a crontab stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure while rendering a dump.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

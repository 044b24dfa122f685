//! Error types for the recurring invoice engine and its store adapter.

use crate::recurrence::SeriesStatus;

/// Input rejected by the engine. Surfaced to the caller, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A date string could not be parsed as `YYYY-MM-DD` or RFC 3339.
    #[error("invalid date for {field}: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    /// Recurrence end date lies before its start date.
    #[error("recurrence end date {end} is before start date {start}")]
    EndBeforeStart { start: String, end: String },

    #[error("maxOccurrences must be at least 1")]
    ZeroMaxOccurrences,

    /// Reminders are enabled but no offset is selected.
    #[error("reminders are enabled but the schedule is empty")]
    EmptySchedule,

    /// A money/quantity field is not a decimal number.
    #[error("invalid decimal for {field}: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("cannot change series status from {from} to {to}")]
    InvalidStatusTransition { from: SeriesStatus, to: SeriesStatus },
}

/// Failure in the persistence adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored json is invalid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Convenience result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Renders a rusqlite error with its extended code, for log lines.
pub(crate) fn sqlite_error_string(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(code, msg) => {
            let message = msg.clone().unwrap_or_default();
            format!(
                "sqlite(code={:?}, extended_code={}, msg={})",
                code.code, code.extended_code, message
            )
        }
        other => other.to_string(),
    }
}

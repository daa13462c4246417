use std::fmt;

// === HistoryError ===

/// Errors raised by history persistence and query helpers.
///
/// Store mutations never surface these to callers; they are logged and the
/// operation reports a plain `bool`.
#[derive(Debug)]
pub enum HistoryError {
    /// Reading or writing persisted state failed.
    Io(String),
    /// Persisted state could not be encoded or decoded.
    Serialization(String),
    /// SQLite operation failed.
    Database(String),
    /// Reserving memory for a new entry failed.
    AllocationFailure(String),
    /// A day string was not in `YYYY-MM-DD` form.
    InvalidDate(String),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Io(msg) => write!(f, "History I/O error: {}", msg),
            HistoryError::Serialization(msg) => {
                write!(f, "History serialization error: {}", msg)
            }
            HistoryError::Database(msg) => write!(f, "History database error: {}", msg),
            HistoryError::AllocationFailure(msg) => {
                write!(f, "History allocation failed: {}", msg)
            }
            HistoryError::InvalidDate(date) => write!(f, "Invalid history date: {}", date),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<std::io::Error> for HistoryError {
    fn from(e: std::io::Error) -> Self {
        HistoryError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(e: serde_json::Error) -> Self {
        HistoryError::Serialization(e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for HistoryError {
    fn from(e: rusqlite::Error) -> Self {
        HistoryError::Database(e.to_string())
    }
}

impl From<std::collections::TryReserveError> for HistoryError {
    fn from(e: std::collections::TryReserveError) -> Self {
        HistoryError::AllocationFailure(e.to_string())
    }
}

// === ConfigError ===

/// Errors related to building the history configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// A configuration value could not be parsed or is out of range.
    Invalid(String),
    /// The requested backend is not compiled into this build.
    UnsupportedBackend(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid(msg) => write!(f, "Invalid history config: {}", msg),
            ConfigError::UnsupportedBackend(name) => {
                write!(f, "Unsupported history backend: {}", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

//! Error types for the rowbridge adapter.
//!
//! All public APIs return `BridgeResult<T>`: no panics in library code.
//! Every directive aborts on the first error and leaves prior table and
//! catalog state untouched.

use thiserror::Error;

/// Discriminant of [`BridgeError`], for callers that only need the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Naming,
    Schema,
    Parse,
    Storage,
    Catalog,
    Configuration,
}

/// Unified error type for all rowbridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Illegal table or column identifier
    #[error("naming error: '{name}' {reason}")]
    Naming { name: String, reason: String },

    /// Column/width mismatch or unresolved fold path at runtime
    #[error("schema error: {0}")]
    Schema(String),

    /// Malformed record during decode (record index is 0-based)
    #[error("parse error at record {record}: {message}")]
    Parse { record: usize, message: String },

    /// Local or remote I/O failure
    #[error("storage error at '{location}': {cause}")]
    Storage { location: String, cause: String },

    /// Binding to an unknown table, or a conflicting duplicate binding
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Unsupported format/mode combination
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for all rowbridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

impl BridgeError {
    pub fn naming(name: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::Naming {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn parse(record: usize, message: impl Into<String>) -> Self {
        BridgeError::Parse {
            record,
            message: message.into(),
        }
    }

    pub fn storage(location: impl Into<String>, cause: impl ToString) -> Self {
        BridgeError::Storage {
            location: location.into(),
            cause: cause.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Naming { .. } => ErrorKind::Naming,
            BridgeError::Schema(_) => ErrorKind::Schema,
            BridgeError::Parse { .. } => ErrorKind::Parse,
            BridgeError::Storage { .. } => ErrorKind::Storage,
            BridgeError::Catalog(_) => ErrorKind::Catalog,
            BridgeError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Re-label any error as a storage failure at `location`.
    ///
    /// Continuous-mode statements surface every fetch/decode/encode/write
    /// failure this way. Configuration errors pass through unchanged.
    pub(crate) fn into_storage(self, location: &str) -> Self {
        match self {
            BridgeError::Storage { .. } | BridgeError::Configuration(_) => self,
            other => BridgeError::storage(location, other),
        }
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::storage("<unknown>", err)
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::parse(err.line().saturating_sub(1), err.to_string())
    }
}

impl From<arrow::error::ArrowError> for BridgeError {
    fn from(err: arrow::error::ArrowError) -> Self {
        BridgeError::Schema(format!("arrow: {err}"))
    }
}

impl From<parquet::errors::ParquetError> for BridgeError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        BridgeError::parse(0, format!("parquet: {err}"))
    }
}

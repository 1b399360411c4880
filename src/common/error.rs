//! Error handling for the federated planner

use thiserror::Error;

/// Main error type for planning and execution
#[derive(Error, Debug)]
pub enum FederationError {
    /// FROM references a table or source absent from the registry
    #[error("Unresolved relation: {0}")]
    UnresolvedRelation(String),

    /// A required column is not declared by the source
    #[error("Unsupported column '{column}' for table '{table}'")]
    UnsupportedColumn { table: String, column: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    /// A federated source failed to serve a fetch
    #[error("Source error: {0}")]
    Source(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FederationError {
    pub fn unsupported_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        FederationError::UnsupportedColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Whether the query itself was rejected, as opposed to failing while it ran
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            FederationError::Parse(_)
                | FederationError::UnresolvedRelation(_)
                | FederationError::UnsupportedColumn { .. }
                | FederationError::InvalidArgument(_)
                | FederationError::NotImplemented(_)
        )
    }
}

impl From<serde_json::Error> for FederationError {
    fn from(err: serde_json::Error) -> Self {
        FederationError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for FederationError {
    fn from(err: csv::Error) -> Self {
        FederationError::Catalog(format!("CSV: {}", err))
    }
}

impl From<rusqlite::Error> for FederationError {
    fn from(err: rusqlite::Error) -> Self {
        FederationError::Execution(format!("local engine: {}", err))
    }
}

/// Result type alias used across the crate
pub type FederationResult<T> = std::result::Result<T, FederationError>;

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_err {
    ($msg:expr) => {
        $crate::common::error::FederationError::Internal($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::common::error::FederationError::Internal(format!($fmt, $($arg)*))
    };
}

/// Macro for creating not implemented errors
#[macro_export]
macro_rules! not_implemented_err {
    ($msg:expr) => {
        $crate::common::error::FederationError::NotImplemented($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::common::error::FederationError::NotImplemented(format!($fmt, $($arg)*))
    };
}

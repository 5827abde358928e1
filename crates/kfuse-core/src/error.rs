//! Error types for kfuse operations.
//!
//! Every failure carries a structured [`ErrorCode`] so stage reports and the CLI
//! can classify what went wrong without matching on message text.

use thiserror::Error;

/// Result type alias for kfuse operations.
pub type FusionResult<T> = Result<T, FusionError>;

/// Main error type for all kfuse operations.
#[derive(Error, Debug)]
pub enum FusionError {
    /// An input batch, group or record did not have the expected shape.
    #[error("Malformed input: {message}")]
    MalformedInput {
        message: String,
        code: ErrorCode,
        batch_index: Option<usize>,
    },

    /// A relationship endpoint did not resolve to an entity of the same group.
    #[error("Unresolved reference: {reference}")]
    UnresolvedReference { reference: String, code: ErrorCode },

    /// Entity lookup during a merge found nothing.
    #[error("Entity not found: {entity_id}")]
    MissingEntity { entity_id: String, code: ErrorCode },

    /// Relational store operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Similarity scorer or extraction model call failed.
    #[error("Model call failed: {message}")]
    ModelCall {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Graph store operation failed.
    #[error("Graph store error: {message}")]
    GraphStore {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A bounded external call did not finish in time.
    #[error("Timed out after {millis}ms: {operation}")]
    Timeout { operation: String, millis: u64 },

    /// Stage stopped early on a cancellation request.
    #[error("Cancelled during {stage}")]
    Cancelled { stage: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Provider not supported.
    #[error("Provider not supported: {provider}")]
    UnsupportedProvider { provider: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Input (IN_xxx)
    InNotAList,
    InNotAnObject,
    InMissingField,
    InUnknownCategory,

    // References (REF_xxx)
    RefUnresolved,

    // Entities (ENT_xxx)
    EntNotFound,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,
    DbBusy,

    // Model calls (MDL_xxx)
    MdlSimilarityFailed,
    MdlExtractionFailed,
    MdlInvalidResponse,

    // Graph (GRP_xxx)
    GrpConnectionFailed,
    GrpOperationFailed,

    // Network (NET_xxx)
    NetTimeout,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InNotAList => "IN_001",
            ErrorCode::InNotAnObject => "IN_002",
            ErrorCode::InMissingField => "IN_003",
            ErrorCode::InUnknownCategory => "IN_004",
            ErrorCode::RefUnresolved => "REF_001",
            ErrorCode::EntNotFound => "ENT_001",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::DbBusy => "DB_003",
            ErrorCode::MdlSimilarityFailed => "MDL_001",
            ErrorCode::MdlExtractionFailed => "MDL_002",
            ErrorCode::MdlInvalidResponse => "MDL_003",
            ErrorCode::GrpConnectionFailed => "GRP_001",
            ErrorCode::GrpOperationFailed => "GRP_002",
            ErrorCode::NetTimeout => "NET_001",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl FusionError {
    /// Create a malformed input error.
    pub fn malformed(message: impl Into<String>, code: ErrorCode) -> Self {
        Self::MalformedInput {
            message: message.into(),
            code,
            batch_index: None,
        }
    }

    /// Create a malformed input error tied to a batch.
    pub fn malformed_in_batch(batch_index: usize, message: impl Into<String>, code: ErrorCode) -> Self {
        Self::MalformedInput {
            message: message.into(),
            code,
            batch_index: Some(batch_index),
        }
    }

    /// Create an unresolved reference error.
    pub fn unresolved(reference: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            reference: reference.into(),
            code: ErrorCode::RefUnresolved,
        }
    }

    /// Create a missing entity error.
    pub fn missing_entity(entity_id: impl Into<String>) -> Self {
        Self::MissingEntity {
            entity_id: entity_id.into(),
            code: ErrorCode::EntNotFound,
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a similarity model error.
    pub fn similarity(message: impl Into<String>) -> Self {
        Self::ModelCall {
            message: message.into(),
            code: ErrorCode::MdlSimilarityFailed,
            source: None,
        }
    }

    /// Create an extraction model error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::ModelCall {
            message: message.into(),
            code: ErrorCode::MdlExtractionFailed,
            source: None,
        }
    }

    /// Create an invalid model response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::ModelCall {
            message: message.into(),
            code: ErrorCode::MdlInvalidResponse,
            source: None,
        }
    }

    /// Create a graph store error.
    pub fn graph_store(message: impl Into<String>) -> Self {
        Self::GraphStore {
            message: message.into(),
            code: ErrorCode::GrpOperationFailed,
            source: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(stage: impl Into<String>) -> Self {
        Self::Cancelled { stage: stage.into() }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedInput { code, .. } => *code,
            Self::UnresolvedReference { code, .. } => *code,
            Self::MissingEntity { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::ModelCall { code, .. } => *code,
            Self::GraphStore { code, .. } => *code,
            Self::Timeout { .. } => ErrorCode::NetTimeout,
            _ => ErrorCode::Internal,
        }
    }

    /// Whether retrying the same unit later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database { .. } | Self::Timeout { .. } | Self::ModelCall { .. } | Self::GraphStore { .. }
        )
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::MalformedInput { .. } => Some("Inspect the ingestion error log for the offending batch"),
            Self::Database { .. } => Some("Re-run the stage; committed units are kept"),
            Self::ModelCall { .. } => Some("Please check your similarity or extraction provider configuration"),
            Self::GraphStore { .. } => Some("Please check your graph store connection settings"),
            Self::Timeout { .. } => Some("Increase the configured timeout or reduce concurrency"),
            Self::Configuration(_) => Some("Please check the configuration file and KFUSE_* variables"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for FusionError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) =>
            {
                ErrorCode::DbBusy
            }
            _ => ErrorCode::DbOperationFailed,
        };
        Self::Database {
            message: err.to_string(),
            code,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_error() {
        let err = FusionError::malformed_in_batch(3, "Not a list", ErrorCode::InNotAList);
        assert_eq!(err.code(), ErrorCode::InNotAList);
        assert!(err.to_string().contains("Not a list"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_database_error_is_transient() {
        let err = FusionError::database("disk I/O");
        assert_eq!(err.code(), ErrorCode::DbOperationFailed);
        assert!(err.is_transient());
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_missing_entity_not_transient() {
        let err = FusionError::missing_entity("abc");
        assert_eq!(err.code(), ErrorCode::EntNotFound);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_code_as_str() {
        assert_eq!(ErrorCode::InNotAList.as_str(), "IN_001");
        assert_eq!(ErrorCode::DbOperationFailed.as_str(), "DB_002");
        assert_eq!(ErrorCode::GrpOperationFailed.as_str(), "GRP_002");
    }

    #[test]
    fn test_from_rusqlite() {
        let err: FusionError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.code(), ErrorCode::DbOperationFailed);
    }
}

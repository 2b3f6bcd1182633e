use chrono::{DateTime, Utc};
use sled::transaction::TransactionError;
use thiserror::Error;

/// Errors that can arise while interacting with the progression engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around catalog JSON errors.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, catalog files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Referenced record is absent or not owned by the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate pet creation, occupied slot or duplicate direct unlock.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Inventory holds less than the quantity an operation needs.
    #[error("insufficient {item_id}: required {required}, available {available}")]
    InsufficientResources {
        item_id: String,
        required: u32,
        available: u32,
    },

    /// Harvest or collect attempted before maturity.
    #[error("not ready until {ready_at}")]
    NotReady { ready_at: DateTime<Utc> },

    /// Caller supplied a value outside the accepted range.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Internal error (unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Boundary classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InsufficientResources,
    NotReady,
    InvalidInput,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::InsufficientResources { .. } => ErrorKind::InsufficientResources,
            EngineError::NotReady { .. } => ErrorKind::NotReady,
            EngineError::InvalidInput(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        }
    }

    /// Message safe to surface to a client. Infrastructure failures collapse to
    /// a generic text so storage details never leak.
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error, please try again later".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<TransactionError<EngineError>> for EngineError {
    fn from(err: TransactionError<EngineError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => EngineError::Sled(e),
        }
    }
}

use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, DocPipeError>;

/// The error type for pipeline operations.
///
/// The `Retryable` / `Unretryable` split is what the consumer worker maps to
/// nack / ack decisions; everything else is either surfaced to the HTTP
/// caller (`NotFound`, `DocumentQuarantined`, `Validation`) or treated as a
/// transport failure that relies on broker redelivery.
#[derive(Error, Debug)]
pub enum DocPipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document {0} has been permanently quarantined and cannot be retrieved")]
    DocumentQuarantined(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Retryable processing failure: {0}")]
    Retryable(String),

    #[error("Unretryable processing failure: {0}")]
    Unretryable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Antivirus failure: {0}")]
    Antivirus(String),

    #[error("Queueing system error: {0}")]
    QueueError(String),

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

// lapin::Error does not compose well with #[from] across its variants, so it
// is flattened to a message at the conversion boundary.
impl From<lapin::Error> for DocPipeError {
    fn from(err: lapin::Error) -> Self {
        DocPipeError::QueueError(err.to_string())
    }
}

impl From<object_store::Error> for DocPipeError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => DocPipeError::NotFound(path),
            other => DocPipeError::Storage(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for DocPipeError {
    fn from(err: sqlx::Error) -> Self {
        DocPipeError::Storage(err.to_string())
    }
}

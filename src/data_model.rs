use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Reserved processor id under which the antivirus scan outcome is exposed
/// on the results read path. Never persisted; synthesized from the scan
/// status at read time.
pub const ANTIVIRUS_PROCESSOR_ID: &str = "antivirus-scanner";

/// An uploaded document. Created by the upload flow, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub uploaded_by: String,
}

/// The ingestion status of an uploaded document, derived from which storage
/// area currently holds its blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    Ready,
    AwaitingScan,
    FailedScan,
}

impl ScanStatus {
    /// HTTP-equivalent status code exposed to clients.
    pub fn http_status(&self) -> u16 {
        match self {
            ScanStatus::Ready => 200,
            ScanStatus::AwaitingScan => 202,
            ScanStatus::FailedScan => 410,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ScanStatus::Ready => "Document is available for download",
            ScanStatus::AwaitingScan => {
                "Document awaiting scan not yet available. Try again later."
            }
            ScanStatus::FailedScan => {
                "Document has been permanently quarantined and cannot be retrieved."
            }
        }
    }
}

/// Client-facing view of a scan status: the status itself plus its derived
/// HTTP-equivalent code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStatusReport {
    pub scan_status: ScanStatus,
    pub http_status: u16,
    pub message: String,
}

impl From<ScanStatus> for ScanStatusReport {
    fn from(status: ScanStatus) -> Self {
        ScanStatusReport {
            scan_status: status,
            http_status: status.http_status(),
            message: status.message().to_string(),
        }
    }
}

/// Status of a single processor run. `Pending` and `MissingDependency` are
/// non-terminal; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorResultStatus {
    Complete,
    Unprocessable,
    RetryableError,
    Pending,
    MissingDependency,
}

impl ProcessorResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorResultStatus::Complete => "COMPLETE",
            ProcessorResultStatus::Unprocessable => "UNPROCESSABLE",
            ProcessorResultStatus::RetryableError => "RETRYABLE_ERROR",
            ProcessorResultStatus::Pending => "PENDING",
            ProcessorResultStatus::MissingDependency => "MISSING_DEPENDENCY",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "COMPLETE" => Some(ProcessorResultStatus::Complete),
            "UNPROCESSABLE" => Some(ProcessorResultStatus::Unprocessable),
            "RETRYABLE_ERROR" => Some(ProcessorResultStatus::RetryableError),
            "PENDING" => Some(ProcessorResultStatus::Pending),
            "MISSING_DEPENDENCY" => Some(ProcessorResultStatus::MissingDependency),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessorResultStatus::Complete
                | ProcessorResultStatus::Unprocessable
                | ProcessorResultStatus::RetryableError
        )
    }
}

impl std::fmt::Display for ProcessorResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted outcome of one processor run on one document, keyed by
/// (processor_id, document_id). The result payload is processor-defined and
/// opaque to the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorResult {
    pub processor_id: String,
    pub document_id: Uuid,
    pub status: ProcessorResultStatus,
    pub result: Value,
    pub timestamp: DateTime<Utc>,
}

impl ProcessorResult {
    pub fn pending(processor_id: String, document_id: Uuid) -> Self {
        ProcessorResult {
            processor_id,
            document_id,
            status: ProcessorResultStatus::Pending,
            result: json!({}),
            timestamp: Utc::now(),
        }
    }

    /// Successful outcome. The processor id is stamped later by the
    /// orchestrator from the resolved processor, matching the ownership rule
    /// that only the orchestrator decides which registry entry ran.
    pub fn complete(document_id: Uuid, result: Value) -> Self {
        ProcessorResult {
            processor_id: String::new(),
            document_id,
            status: ProcessorResultStatus::Complete,
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn missing_dependency(document_id: Uuid) -> Self {
        ProcessorResult {
            processor_id: String::new(),
            document_id,
            status: ProcessorResultStatus::MissingDependency,
            result: json!({ "state": "Waiting for processor dependency" }),
            timestamp: Utc::now(),
        }
    }

    pub fn retryable_error(document_id: Uuid, message: impl Into<String>) -> Self {
        ProcessorResult {
            processor_id: String::new(),
            document_id,
            status: ProcessorResultStatus::RetryableError,
            result: json!({ "error": message.into() }),
            timestamp: Utc::now(),
        }
    }

    pub fn unprocessable(document_id: Uuid, message: impl Into<String>) -> Self {
        ProcessorResult {
            processor_id: String::new(),
            document_id,
            status: ProcessorResultStatus::Unprocessable,
            result: json!({ "error": message.into() }),
            timestamp: Utc::now(),
        }
    }

    /// The `error` field of the result payload, when the payload carries one.
    pub fn error_message(&self) -> Option<&str> {
        self.result.get("error").and_then(Value::as_str)
    }
}

/// A single processing request as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingRequest {
    pub processor_id: String,
}

/// Wire envelope for a processing request: the unit of work delivered over
/// the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRequestEnvelope {
    pub document_id: String,
    pub request: ProcessingRequest,
}

/// Inbound "object created" event from the storage layer. Only events whose
/// `bucket` names the configured unscanned area are acted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectCreatedEvent {
    pub bucket: String,
    pub name: String,
}

/// Metadata recorded next to a document blob at upload time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub original_filename: String,
    pub uploaded_by: String,
    pub content_type: String,
}

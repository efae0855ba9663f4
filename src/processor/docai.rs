//! HTTP client for the document-AI processing backend, plus the shared
//! scan-gate-then-call flow used by the concrete processors.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use crate::data_model::{ProcessorResult, ScanStatus};
use crate::error::{DocPipeError, Result};
use crate::storage::BlobStorage;
use crate::utils::token::ServiceTokenProvider;

/// Backend call failure, split the way the processor contract needs it:
/// retryable failures become `RETRYABLE_ERROR` results, fatal ones become
/// `UNPROCESSABLE`.
#[derive(Debug)]
pub enum BackendError {
    Retryable(String),
    Fatal(String),
}

/// Response from the backend's `:process` endpoint. Only the fields the
/// processors consume are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessResponse {
    pub document: Option<BackendDocument>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendDocument {
    #[serde(default)]
    pub pages: Vec<BackendPage>,
    #[serde(default)]
    pub entities: Vec<BackendEntity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendPage {
    pub page_number: i32,
    pub image_quality_scores: Option<ImageQualityScores>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageQualityScores {
    pub quality_score: f32,
    #[serde(default)]
    pub detected_defects: Vec<DetectedDefect>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectedDefect {
    #[serde(rename = "type")]
    pub defect_type: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub mention_text: String,
}

/// Client for the document-AI backend. Authenticates with the service token;
/// the token provider refreshes it in the background.
pub struct DocAiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<ServiceTokenProvider>,
}

impl DocAiClient {
    pub fn new(base_url: impl Into<String>, token: Arc<ServiceTokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DocPipeError::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(DocAiClient {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    /// Submit raw document bytes to a backend processor.
    pub async fn process_document(
        &self,
        backend_processor_id: &str,
        content: &[u8],
        content_type: &str,
        options: Value,
    ) -> std::result::Result<ProcessResponse, BackendError> {
        let url = format!(
            "{}/v1/processors/{}:process",
            self.base_url.trim_end_matches('/'),
            backend_processor_id
        );
        let request = json!({
            "raw_document": {
                "content": BASE64.encode(content),
                "mime_type": content_type,
            },
            "skip_human_review": true,
            "process_options": options,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.token.token())
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<ProcessResponse>()
                .await
                .map_err(|e| BackendError::Fatal(format!("Malformed backend response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("Backend returned {status}: {body}");
        if status.as_u16() == 429 || status.is_server_error() {
            Err(BackendError::Retryable(message))
        } else {
            Err(BackendError::Fatal(message))
        }
    }
}

fn classify_transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() || e.is_connect() {
        BackendError::Retryable(e.to_string())
    } else {
        BackendError::Fatal(e.to_string())
    }
}

/// Common flow for backend-driven processors: gate on scan status, fetch the
/// scanned bytes, call the backend, and fold every failure into a result
/// status so the capability contract ("always returns a result") holds.
pub(crate) async fn run_backend_processor<T, F>(
    storage: &BlobStorage,
    client: &DocAiClient,
    backend_processor_id: &str,
    options: Value,
    document_id: &str,
    parse: F,
) -> ProcessorResult
where
    T: Serialize,
    F: FnOnce(ProcessResponse) -> Option<T>,
{
    let document_uuid = match Uuid::parse_str(document_id) {
        Ok(id) => id,
        Err(e) => {
            return ProcessorResult::unprocessable(
                Uuid::nil(),
                format!("Invalid document id '{document_id}': {e}"),
            )
        }
    };

    match storage.status(document_id).await {
        // Scan not finished yet: signal "retry later, cheaply" without
        // touching the backend.
        Ok(ScanStatus::AwaitingScan) => {
            return ProcessorResult::missing_dependency(document_uuid)
        }
        Ok(_) => {}
        Err(e) => {
            error!(document_id, error = %e, "Failed to resolve scan status");
            return ProcessorResult::unprocessable(document_uuid, e.to_string());
        }
    }

    let file = match storage.file_data(document_id).await {
        Ok(file) => file,
        Err(e) => {
            error!(document_id, error = %e, "Failed to fetch document content");
            return ProcessorResult::unprocessable(document_uuid, e.to_string());
        }
    };

    match client
        .process_document(backend_processor_id, &file.bytes, &file.content_type, options)
        .await
    {
        Ok(response) => match parse(response) {
            Some(parsed) => {
                let payload = serde_json::to_value(parsed).unwrap_or(Value::Null);
                ProcessorResult::complete(document_uuid, payload)
            }
            None => ProcessorResult::unprocessable(
                document_uuid,
                "Backend response contained no document".to_string(),
            ),
        },
        Err(BackendError::Retryable(message)) => {
            warn!(document_id, error = %message, "Retryable backend error processing document");
            ProcessorResult::retryable_error(document_uuid, message)
        }
        Err(BackendError::Fatal(message)) => {
            error!(document_id, error = %message, "Unrecoverable backend error processing document");
            ProcessorResult::unprocessable(document_uuid, message)
        }
    }
}

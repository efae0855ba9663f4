//! HTTP surface: upload, status/metadata, content download, enqueue, and
//! results endpoints, plus Prometheus metrics. Authentication and
//! authorization are handled upstream; the uploader identity arrives as a
//! forwarded header.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use crate::data_model::{
    Document, DocumentMetadata, ObjectCreatedEvent, ProcessingRequest, ProcessorResult,
    ScanStatus, ScanStatusReport,
};
use crate::error::DocPipeError;
use crate::processing::ProcessingService;
use crate::queue::TaskPublisher;
use crate::repository::DocumentRepository;
use crate::storage::BlobStorage;
use crate::utils::prometheus_metrics::*;

const UPLOADER_HEADER: &str = "x-uploaded-by";

/// The application state, shared across all handlers.
pub struct AppState {
    pub storage: Arc<BlobStorage>,
    pub documents: Arc<dyn DocumentRepository>,
    pub processing: Arc<ProcessingService>,
    pub scan_events: Arc<dyn TaskPublisher>,
    pub allowed_content_types: Vec<String>,
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/documents", post(upload_document))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/content", get(get_document_content))
        .route("/documents/:id/status", get(get_scan_status))
        .route("/documents/:id/process", post(enqueue_processing))
        .route("/documents/:id/results", get(get_processing_results))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

impl IntoResponse for DocPipeError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            DocPipeError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            DocPipeError::DocumentQuarantined(_) => (StatusCode::GONE, self.to_string()),
            DocPipeError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            DocPipeError::Unretryable(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            _ => {
                error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetDocumentResponse {
    pub id: Uuid,
    pub filename: String,
    pub uploaded_by: String,
    pub scan_status: ScanStatusReport,
}

/// Handles the posting of file uploads: validate the declared content type,
/// stash the blob in the unscanned area, persist the document row, and emit
/// the object-created event that triggers the scan worker.
async fn upload_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, DocPipeError> {
    let uploaded_by = headers
        .get(UPLOADER_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DocPipeError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| DocPipeError::Validation(format!("Failed to read upload: {e}")))?;
        file = Some((filename, content_type, data));
        break;
    }

    let Some((filename, content_type, data)) = file else {
        return Err(DocPipeError::Validation(
            "No 'file' field in upload".to_string(),
        ));
    };

    if !state.allowed_content_types.contains(&content_type) {
        warn!(
            content_type = %content_type,
            filename = %filename,
            "Rejected upload with disallowed content type"
        );
        return Err(DocPipeError::Validation("File type not allowed.".to_string()));
    }

    let document_id = Uuid::new_v4();
    let metadata = DocumentMetadata {
        original_filename: filename.clone(),
        uploaded_by: uploaded_by.clone(),
        content_type,
    };

    state
        .storage
        .upload(&document_id.to_string(), data, &metadata)
        .await?;
    state
        .documents
        .save(Document {
            id: document_id,
            filename,
            uploaded_by,
        })
        .await?;

    // Deployments with bucket notifications get this event for free; the
    // upload path emits it directly so no notification wiring is required.
    let event = ObjectCreatedEvent {
        bucket: state.storage.unscanned_area().to_string(),
        name: document_id.to_string(),
    };
    state.scan_events.publish(&serde_json::to_vec(&event)?).await?;

    DOCUMENTS_UPLOADED_TOTAL.inc();
    Ok(Json(UploadResponse { document_id }))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GetDocumentResponse>, DocPipeError> {
    let document_id = parse_document_id(&id)?;
    let status = state.storage.status(&id).await?;
    let document = state
        .documents
        .find_by_id(document_id)
        .await?
        .ok_or_else(|| DocPipeError::NotFound(id.clone()))?;

    Ok(Json(GetDocumentResponse {
        id: document.id,
        filename: document.filename,
        uploaded_by: document.uploaded_by,
        scan_status: ScanStatusReport::from(status),
    }))
}

async fn get_scan_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScanStatusReport>, DocPipeError> {
    parse_document_id(&id)?;
    let status = state.storage.status(&id).await?;
    Ok(Json(ScanStatusReport::from(status)))
}

async fn get_document_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, DocPipeError> {
    parse_document_id(&id)?;
    let status = state.storage.status(&id).await?;
    match status {
        ScanStatus::Ready => {
            let file = state.storage.file_data(&id).await?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, file.content_type)],
                file.bytes,
            )
                .into_response())
        }
        ScanStatus::AwaitingScan => Ok((
            StatusCode::ACCEPTED,
            Json(ScanStatusReport::from(status)),
        )
            .into_response()),
        ScanStatus::FailedScan => Err(DocPipeError::DocumentQuarantined(id)),
    }
}

#[derive(Debug, Deserialize)]
struct ReprocessQuery {
    #[serde(default)]
    reprocess: bool,
}

async fn enqueue_processing(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ReprocessQuery>,
    Json(requests): Json<Vec<ProcessingRequest>>,
) -> Result<StatusCode, DocPipeError> {
    let document_id = parse_document_id(&id)?;
    let outcome = state
        .processing
        .enqueue_processing(document_id, requests, query.reprocess)
        .await?;

    REQUESTS_ENQUEUED_TOTAL.inc_by(outcome.enqueued.len() as f64);
    REQUESTS_SKIPPED_DEDUP_TOTAL.inc_by(outcome.skipped.len() as f64);
    Ok(StatusCode::OK)
}

/// Persisted results for the document plus the synthesized antivirus
/// pseudo-result. The metadata probe enforces that the caller can only see
/// results for documents that are actually present in a readable area.
async fn get_processing_results(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ProcessorResult>>, DocPipeError> {
    let document_id = parse_document_id(&id)?;
    let status = state.storage.status(&id).await?;
    match status {
        ScanStatus::Ready => {
            state.storage.metadata(&id).await?;
        }
        ScanStatus::AwaitingScan => {
            state.storage.unscanned_metadata(&id).await?;
        }
        ScanStatus::FailedScan => return Err(DocPipeError::DocumentQuarantined(id)),
    }

    let mut results = state.processing.results_for_document(document_id).await?;
    results.push(ProcessingService::synthesize_antivirus_result(
        document_id,
        status,
    ));
    Ok(Json(results))
}

fn parse_document_id(id: &str) -> Result<Uuid, DocPipeError> {
    Uuid::parse_str(id).map_err(|_| DocPipeError::Validation(format!("Invalid document id '{id}'")))
}

/// Axum handler for /metrics.
pub async fn metrics_handler() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Could not encode prometheus metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Could not encode prometheus metrics: {}", e),
        );
    }
    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Prometheus metrics UTF-8 error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prometheus metrics UTF-8 error: {}", e),
            )
        }
    }
}

//! Processing orchestration: request enqueueing with dedup and the
//! quarantine gate, the synchronous classification ladder invoked by the
//! consumer worker, and the results read path.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::data_model::{
    ProcessingRequest, ProcessingRequestEnvelope, ProcessorResult, ProcessorResultStatus,
    ScanStatus, ScanStatusReport, ANTIVIRUS_PROCESSOR_ID,
};
use crate::error::{DocPipeError, Result};
use crate::processor::ProcessorRegistry;
use crate::queue::TaskPublisher;
use crate::repository::ProcessorResultRepository;
use crate::storage::BlobStorage;

/// What an enqueue call actually did: which processors were queued and which
/// were dropped because a result (PENDING or terminal) already existed.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOutcome {
    pub enqueued: Vec<String>,
    pub skipped: Vec<String>,
}

/// Orchestrates document processing. Exclusively owns request creation and
/// dedup decisions; terminal-state writes happen only through
/// [`process_request`](ProcessingService::process_request), which the
/// consumer worker drives.
pub struct ProcessingService {
    publisher: Arc<dyn TaskPublisher>,
    result_publisher: Arc<dyn TaskPublisher>,
    registry: Arc<ProcessorRegistry>,
    results: Arc<dyn ProcessorResultRepository>,
    storage: Arc<BlobStorage>,
}

impl ProcessingService {
    pub fn new(
        publisher: Arc<dyn TaskPublisher>,
        result_publisher: Arc<dyn TaskPublisher>,
        registry: Arc<ProcessorRegistry>,
        results: Arc<dyn ProcessorResultRepository>,
        storage: Arc<BlobStorage>,
    ) -> Self {
        ProcessingService {
            publisher,
            result_publisher,
            registry,
            results,
            storage,
        }
    }

    /// Enqueue processing requests for a document.
    ///
    /// Unless `reprocess` is set, processors that already have any result row
    /// are dropped from the batch, so a given (document, processor) pair is
    /// enqueued at most once through this path. A quarantined document
    /// refuses the whole batch. Publish and persist happen per item with no
    /// rollback of earlier items when a later one fails; orphaned PENDING
    /// rows after a partial enqueue are an accepted failure mode.
    pub async fn enqueue_processing(
        &self,
        document_id: Uuid,
        requests: Vec<ProcessingRequest>,
        reprocess: bool,
    ) -> Result<EnqueueOutcome> {
        if requests.is_empty() {
            return Err(DocPipeError::Validation(
                "No processing data was provided".to_string(),
            ));
        }

        let (requests, skipped) = if reprocess {
            (requests, Vec::new())
        } else {
            self.filter_already_processed(document_id, requests).await?
        };

        if !skipped.is_empty() {
            info!(
                document_id = %document_id,
                skipped = ?skipped,
                "Document already processed by these processors, request discarded for them"
            );
        }

        if requests.is_empty() {
            return Ok(EnqueueOutcome {
                enqueued: Vec::new(),
                skipped,
            });
        }

        let status = self.storage.status(&document_id.to_string()).await?;
        if status == ScanStatus::FailedScan {
            return Err(DocPipeError::DocumentQuarantined(document_id.to_string()));
        }

        debug!(document_id = %document_id, "Enqueuing processing request");

        let mut enqueued = Vec::new();
        for request in requests {
            let envelope = ProcessingRequestEnvelope {
                document_id: document_id.to_string(),
                request: request.clone(),
            };
            let payload = serde_json::to_vec(&envelope)?;
            self.publisher.publish(&payload).await?;
            self.results
                .save(ProcessorResult::pending(
                    request.processor_id.clone(),
                    document_id,
                ))
                .await?;
            debug!(processor_id = %request.processor_id, "Published request for processing");
            enqueued.push(request.processor_id);
        }

        Ok(EnqueueOutcome { enqueued, skipped })
    }

    async fn filter_already_processed(
        &self,
        document_id: Uuid,
        requests: Vec<ProcessingRequest>,
    ) -> Result<(Vec<ProcessingRequest>, Vec<String>)> {
        let processor_ids: Vec<String> = requests
            .iter()
            .map(|request| request.processor_id.clone())
            .collect();
        let existing = self
            .results
            .find_by_document_and_processor_ids(document_id, &processor_ids)
            .await?;
        let existing_ids: HashSet<String> = existing
            .iter()
            .map(|result| result.processor_id.clone())
            .collect();

        let (kept, dropped): (Vec<_>, Vec<_>) = requests
            .into_iter()
            .partition(|request| !existing_ids.contains(&request.processor_id));

        Ok((
            kept,
            dropped.into_iter().map(|request| request.processor_id).collect(),
        ))
    }

    /// Synchronous core of the consumer worker: resolve the processor, run
    /// it, and classify the outcome.
    ///
    /// Retryable failures (missing dependency, any non-terminal status)
    /// leave the PENDING row untouched so a later successful pass still
    /// dedups correctly. Unretryable failures persist the terminal row where
    /// applicable before failing.
    pub async fn process_request(
        &self,
        document_id: &str,
        request: &ProcessingRequest,
    ) -> Result<ProcessorResult> {
        let document_uuid = Uuid::parse_str(document_id).map_err(|e| {
            DocPipeError::Unretryable(format!("Invalid document id '{document_id}': {e}"))
        })?;

        let Some(processor) = self.registry.get(&request.processor_id) else {
            let result = ProcessorResult {
                processor_id: request.processor_id.clone(),
                document_id: document_uuid,
                status: ProcessorResultStatus::Unprocessable,
                result: json!({ "error": "processor not found" }),
                timestamp: Utc::now(),
            };
            self.results.save(result).await?;
            error!(
                processor_id = %request.processor_id,
                document_id,
                "Processor not found"
            );
            return Err(DocPipeError::Unretryable("Processor not found".to_string()));
        };

        let mut result = processor.process(document_id).await;

        match result.status {
            ProcessorResultStatus::MissingDependency => {
                // Cheap retry signal: the scan has not finished yet, so the
                // backend was never called and nothing is persisted.
                warn!(
                    document_id,
                    "Dependency missing for processing document. This operation will be retried"
                );
                Err(DocPipeError::Retryable("Missing dependency".to_string()))
            }
            ProcessorResultStatus::Unprocessable => {
                let message = result
                    .error_message()
                    .unwrap_or("An unretryable error occurred")
                    .to_string();
                error!(document_id, error = %message, "An unretryable error occurred");
                Err(DocPipeError::Unretryable(message))
            }
            ProcessorResultStatus::Complete => {
                result.processor_id = processor.processor_id().to_string();
                self.results.save(result.clone()).await?;
                self.result_publisher
                    .publish(&serde_json::to_vec(&result)?)
                    .await?;
                debug!(
                    processor_id = %result.processor_id,
                    "Document processing result was successfully published"
                );
                Ok(result)
            }
            status => Err(DocPipeError::Retryable(format!(
                "Document {document_id} request could not be completed and will be retried. \
                 Status: {status}"
            ))),
        }
    }

    /// All persisted results for a document, ordered by timestamp ascending.
    pub async fn results_for_document(&self, document_id: Uuid) -> Result<Vec<ProcessorResult>> {
        self.results.find_by_document(document_id).await
    }

    /// The antivirus pseudo-result exposed on the results read path. Derived
    /// from the scan status, never persisted: PENDING while the scan is
    /// outstanding, COMPLETE otherwise, with the status report as payload.
    pub fn synthesize_antivirus_result(document_id: Uuid, status: ScanStatus) -> ProcessorResult {
        let report = ScanStatusReport::from(status);
        let result_status = if status == ScanStatus::AwaitingScan {
            ProcessorResultStatus::Pending
        } else {
            ProcessorResultStatus::Complete
        };
        ProcessorResult {
            processor_id: ANTIVIRUS_PROCESSOR_ID.to_string(),
            document_id,
            status: result_status,
            result: serde_json::to_value(report).unwrap_or_default(),
            timestamp: Utc::now(),
        }
    }
}

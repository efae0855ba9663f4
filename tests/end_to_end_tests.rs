//! End-to-end flows over in-memory queue, storage, and repositories: the
//! same decision functions the AMQP loops drive, minus the broker.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;

use docpipe::antivirus::EicarScanner;
use docpipe::data_model::{
    DocumentMetadata, ObjectCreatedEvent, ProcessingRequest, ProcessorResult,
    ProcessorResultStatus, ScanStatus, ANTIVIRUS_PROCESSOR_ID,
};use docpipe::processing::ProcessingService;
use docpipe::processor::{DocumentProcessor, ProcessorRegistry};
use docpipe::queue::{AckDecision, InMemoryTaskQueue, TaskPublisher};
use docpipe::repository::{InMemoryProcessorResultRepository, ProcessorResultRepository};
use docpipe::scan_logic::handle_object_event;
use docpipe::storage::BlobStorage;
use docpipe::worker_logic::handle_processing_delivery;

/// Processor that, like the real backend processors, reports
/// MISSING_DEPENDENCY until the document's scan has finished.
struct ScanGatedProcessor {
    storage: Arc<BlobStorage>,
}

#[async_trait]
impl DocumentProcessor for ScanGatedProcessor {
    fn processor_id(&self) -> &str {
        "test-extractor"
    }

    async fn process(&self, document_id: &str) -> ProcessorResult {
        let document_uuid = Uuid::parse_str(document_id).expect("test document id");
        match self.storage.status(document_id).await {
            Ok(ScanStatus::AwaitingScan) => ProcessorResult::missing_dependency(document_uuid),
            Ok(_) => ProcessorResult::complete(document_uuid, json!({ "extracted": "fields" })),
            Err(e) => ProcessorResult::unprocessable(document_uuid, e.to_string()),
        }
    }
}

struct Pipeline {
    storage: Arc<BlobStorage>,
    scan_queue: InMemoryTaskQueue,
    task_queue: InMemoryTaskQueue,
    result_queue: InMemoryTaskQueue,
    results: Arc<InMemoryProcessorResultRepository>,
    service: Arc<ProcessingService>,
}

fn pipeline() -> Pipeline {
    let storage = Arc::new(BlobStorage::in_memory());
    let scan_queue = InMemoryTaskQueue::new();
    let task_queue = InMemoryTaskQueue::new();
    let result_queue = InMemoryTaskQueue::new();
    let results = Arc::new(InMemoryProcessorResultRepository::new());
    let registry = Arc::new(ProcessorRegistry::new(vec![Arc::new(ScanGatedProcessor {
        storage: storage.clone(),
    })]));
    let service = Arc::new(ProcessingService::new(
        Arc::new(task_queue.clone()),
        Arc::new(result_queue.clone()),
        registry,
        results.clone(),
        storage.clone(),
    ));
    Pipeline {
        storage,
        scan_queue,
        task_queue,
        result_queue,
        results,
        service,
    }
}

impl Pipeline {
    /// What the upload endpoint does: blob + metadata into the unscanned
    /// area, then an object-created event for the scan worker.
    async fn upload(&self, content: &[u8]) -> Uuid {
        let document_id = Uuid::new_v4();
        self.storage
            .upload(
                &document_id.to_string(),
                Bytes::copy_from_slice(content),
                &DocumentMetadata {
                    original_filename: "statement.pdf".to_string(),
                    uploaded_by: "tester".to_string(),
                    content_type: "application/pdf".to_string(),
                },
            )
            .await
            .unwrap();
        let event = ObjectCreatedEvent {
            bucket: self.storage.unscanned_area().to_string(),
            name: document_id.to_string(),
        };
        self.scan_queue
            .publish(&serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();
        document_id
    }

    async fn run_scan_worker_once(&self) -> AckDecision {
        let payload = self.scan_queue.pop().expect("a scan event should be queued");
        handle_object_event(&payload, &self.storage, &EicarScanner).await
    }
}

#[tokio::test]
async fn test_upload_scan_process_results_flow() {
    let p = pipeline();

    // Upload, then the scan worker picks up the event and passes the file.
    let document_id = p.upload(b"perfectly ordinary pdf").await;
    assert_eq!(
        p.storage.status(&document_id.to_string()).await.unwrap(),
        ScanStatus::AwaitingScan
    );
    assert_eq!(p.run_scan_worker_once().await, AckDecision::Ack);
    assert_eq!(
        p.storage.status(&document_id.to_string()).await.unwrap(),
        ScanStatus::Ready
    );

    // Enqueue processing and let the worker consume the request.
    p.service
        .enqueue_processing(
            document_id,
            vec![ProcessingRequest {
                processor_id: "test-extractor".to_string(),
            }],
            false,
        )
        .await
        .unwrap();
    let payload = p.task_queue.pop().expect("a task should be queued");
    let decision = handle_processing_delivery(&payload, &p.service).await;
    assert_eq!(decision, AckDecision::Ack);

    // One COMPLETE row, one published result event.
    let rows = p.service.results_for_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].processor_id, "test-extractor");
    assert_eq!(rows[0].status, ProcessorResultStatus::Complete);
    assert_eq!(p.result_queue.len(), 1);

    // The results read path adds the antivirus pseudo-result.
    let synthesized = ProcessingService::synthesize_antivirus_result(
        document_id,
        p.storage.status(&document_id.to_string()).await.unwrap(),
    );
    assert_eq!(synthesized.processor_id, ANTIVIRUS_PROCESSOR_ID);
    assert_eq!(synthesized.status, ProcessorResultStatus::Complete);
    assert_eq!(synthesized.result["scan_status"], "READY");
    assert_eq!(synthesized.result["http_status"], 200);
}

#[tokio::test]
async fn test_processing_retries_until_scan_completes() {
    let p = pipeline();
    let document_id = p.upload(b"slow lane").await;

    // Enqueue before the scan has run: the processor reports a missing
    // dependency and the message is nacked for redelivery.
    p.service
        .enqueue_processing(
            document_id,
            vec![ProcessingRequest {
                processor_id: "test-extractor".to_string(),
            }],
            false,
        )
        .await
        .unwrap();
    let payload = p.task_queue.pop().unwrap();
    assert_eq!(
        handle_processing_delivery(&payload, &p.service).await,
        AckDecision::Nack
    );
    let rows = p.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows[0].status, ProcessorResultStatus::Pending);

    // The scan finishes; the redelivered message now succeeds and the row
    // transitions PENDING -> COMPLETE.
    assert_eq!(p.run_scan_worker_once().await, AckDecision::Ack);
    assert_eq!(
        handle_processing_delivery(&payload, &p.service).await,
        AckDecision::Ack
    );
    let rows = p.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ProcessorResultStatus::Complete);
}

#[tokio::test]
async fn test_infected_upload_is_quarantined_and_blocked_from_processing() {
    let p = pipeline();
    let document_id = p
        .upload(docpipe::antivirus::EICAR_TEST_STRING.as_bytes())
        .await;

    assert_eq!(p.run_scan_worker_once().await, AckDecision::Ack);
    assert_eq!(
        p.storage.status(&document_id.to_string()).await.unwrap(),
        ScanStatus::FailedScan
    );

    // The quarantine gate refuses the whole batch.
    let result = p
        .service
        .enqueue_processing(
            document_id,
            vec![ProcessingRequest {
                processor_id: "test-extractor".to_string(),
            }],
            false,
        )
        .await;
    assert!(result.is_err());
    assert!(p.task_queue.is_empty());
}

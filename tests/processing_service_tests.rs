use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use uuid::Uuid;

use docpipe::data_model::{
    DocumentMetadata, ProcessingRequest, ProcessorResult, ProcessorResultStatus, ScanStatus,
    ANTIVIRUS_PROCESSOR_ID,
};
use docpipe::error::DocPipeError;
use docpipe::processing::ProcessingService;
use docpipe::processor::{DocumentProcessor, ProcessorRegistry};
use docpipe::queue::InMemoryTaskQueue;
use docpipe::repository::{InMemoryProcessorResultRepository, ProcessorResultRepository};
use docpipe::storage::BlobStorage;

/// Stub processor returning a fixed outcome.
struct StubProcessor {
    id: &'static str,
    outcome: ProcessorResultStatus,
}

#[async_trait]
impl DocumentProcessor for StubProcessor {
    fn processor_id(&self) -> &str {
        self.id
    }

    async fn process(&self, document_id: &str) -> ProcessorResult {
        let document_id = Uuid::parse_str(document_id).expect("test document id");
        match self.outcome {
            ProcessorResultStatus::Complete => {
                ProcessorResult::complete(document_id, json!({ "score": 0.95 }))
            }
            ProcessorResultStatus::MissingDependency => {
                ProcessorResult::missing_dependency(document_id)
            }
            ProcessorResultStatus::RetryableError => {
                ProcessorResult::retryable_error(document_id, "backend rate limited")
            }
            ProcessorResultStatus::Unprocessable => {
                ProcessorResult::unprocessable(document_id, "backend rejected document")
            }
            ProcessorResultStatus::Pending => ProcessorResult::pending(
                self.id.to_string(),
                document_id,
            ),
        }
    }
}

struct Harness {
    service: ProcessingService,
    task_queue: InMemoryTaskQueue,
    result_queue: InMemoryTaskQueue,
    results: Arc<InMemoryProcessorResultRepository>,
    storage: Arc<BlobStorage>,
}

fn harness(processors: Vec<Arc<dyn DocumentProcessor>>) -> Harness {
    let task_queue = InMemoryTaskQueue::new();
    let result_queue = InMemoryTaskQueue::new();
    let results = Arc::new(InMemoryProcessorResultRepository::new());
    let storage = Arc::new(BlobStorage::in_memory());
    let service = ProcessingService::new(
        Arc::new(task_queue.clone()),
        Arc::new(result_queue.clone()),
        Arc::new(ProcessorRegistry::new(processors)),
        results.clone(),
        storage.clone(),
    );
    Harness {
        service,
        task_queue,
        result_queue,
        results,
        storage,
    }
}

async fn upload_ready_document(storage: &BlobStorage) -> Uuid {
    let document_id = Uuid::new_v4();
    storage
        .upload(
            &document_id.to_string(),
            Bytes::from_static(b"content"),
            &DocumentMetadata {
                original_filename: "f.pdf".to_string(),
                uploaded_by: "tester".to_string(),
                content_type: "application/pdf".to_string(),
            },
        )
        .await
        .unwrap();
    storage
        .confirm_clean_file(&document_id.to_string())
        .await
        .unwrap();
    document_id
}

fn request(processor_id: &str) -> ProcessingRequest {
    ProcessingRequest {
        processor_id: processor_id.to_string(),
    }
}

#[tokio::test]
async fn test_enqueue_empty_batch_is_a_client_error() {
    let h = harness(vec![]);
    let document_id = Uuid::new_v4();

    let result = h
        .service
        .enqueue_processing(document_id, vec![], false)
        .await;

    assert!(matches!(result, Err(DocPipeError::Validation(_))));
    assert!(h.task_queue.is_empty());
}

#[tokio::test]
async fn test_enqueue_publishes_and_persists_pending_rows() {
    let h = harness(vec![]);
    let document_id = upload_ready_document(&h.storage).await;

    let outcome = h
        .service
        .enqueue_processing(document_id, vec![request("p1"), request("p2")], false)
        .await
        .unwrap();

    assert_eq!(outcome.enqueued, vec!["p1", "p2"]);
    assert!(outcome.skipped.is_empty());
    assert_eq!(h.task_queue.len(), 2);

    let rows = h.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|row| row.status == ProcessorResultStatus::Pending));
}

#[tokio::test]
async fn test_enqueue_twice_dedups_to_one_pending_row_per_processor() {
    let h = harness(vec![]);
    let document_id = upload_ready_document(&h.storage).await;

    h.service
        .enqueue_processing(document_id, vec![request("p1"), request("p2")], false)
        .await
        .unwrap();
    let second = h
        .service
        .enqueue_processing(document_id, vec![request("p1"), request("p2")], false)
        .await
        .unwrap();

    assert!(second.enqueued.is_empty());
    assert_eq!(second.skipped.len(), 2);
    // At most one publish per processor across both calls.
    assert_eq!(h.task_queue.len(), 2);
    let rows = h.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_enqueue_partial_dedup_keeps_new_processors() {
    let h = harness(vec![]);
    let document_id = upload_ready_document(&h.storage).await;

    h.service
        .enqueue_processing(document_id, vec![request("p1")], false)
        .await
        .unwrap();
    let outcome = h
        .service
        .enqueue_processing(document_id, vec![request("p1"), request("p2")], false)
        .await
        .unwrap();

    assert_eq!(outcome.enqueued, vec!["p2"]);
    assert_eq!(outcome.skipped, vec!["p1"]);
    assert_eq!(h.task_queue.len(), 2);
}

#[tokio::test]
async fn test_reprocess_overrides_dedup() {
    let h = harness(vec![]);
    let document_id = upload_ready_document(&h.storage).await;

    // P1 already ran to completion.
    let mut complete = ProcessorResult::complete(document_id, json!({ "score": 1.0 }));
    complete.processor_id = "p1".to_string();
    h.results.save(complete).await.unwrap();

    let outcome = h
        .service
        .enqueue_processing(document_id, vec![request("p1")], true)
        .await
        .unwrap();

    assert_eq!(outcome.enqueued, vec!["p1"]);
    assert_eq!(h.task_queue.len(), 1);
}

#[tokio::test]
async fn test_enqueue_refuses_quarantined_document() {
    let h = harness(vec![]);
    let document_id = Uuid::new_v4();
    h.storage
        .upload(
            &document_id.to_string(),
            Bytes::from_static(b"bad"),
            &DocumentMetadata {
                original_filename: "virus.bin".to_string(),
                uploaded_by: "tester".to_string(),
                content_type: "application/pdf".to_string(),
            },
        )
        .await
        .unwrap();
    h.storage
        .quarantine_file(&document_id.to_string())
        .await
        .unwrap();

    let result = h
        .service
        .enqueue_processing(document_id, vec![request("p1"), request("p2")], false)
        .await;

    assert!(matches!(
        result,
        Err(DocPipeError::DocumentQuarantined(_))
    ));
    assert!(h.task_queue.is_empty());
    let rows = h.results.find_by_document(document_id).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn test_enqueue_unknown_document_is_not_found() {
    let h = harness(vec![]);
    let result = h
        .service
        .enqueue_processing(Uuid::new_v4(), vec![request("p1")], false)
        .await;
    assert!(matches!(result, Err(DocPipeError::NotFound(_))));
}

#[tokio::test]
async fn test_process_request_unknown_processor_is_unretryable_and_persisted() {
    let h = harness(vec![]);
    let document_id = upload_ready_document(&h.storage).await;

    let result = h
        .service
        .process_request(&document_id.to_string(), &request("nope"))
        .await;

    assert!(matches!(result, Err(DocPipeError::Unretryable(_))));
    let rows = h.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].processor_id, "nope");
    assert_eq!(rows[0].status, ProcessorResultStatus::Unprocessable);
    assert_eq!(rows[0].error_message(), Some("processor not found"));
}

#[tokio::test]
async fn test_process_request_missing_dependency_is_retryable_and_keeps_pending_row() {
    let h = harness(vec![Arc::new(StubProcessor {
        id: "p1",
        outcome: ProcessorResultStatus::MissingDependency,
    })]);
    let document_id = upload_ready_document(&h.storage).await;

    h.service
        .enqueue_processing(document_id, vec![request("p1")], false)
        .await
        .unwrap();

    let result = h
        .service
        .process_request(&document_id.to_string(), &request("p1"))
        .await;

    assert!(matches!(result, Err(DocPipeError::Retryable(_))));
    // The PENDING row is untouched so a later pass still dedups correctly.
    let rows = h.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ProcessorResultStatus::Pending);
}

#[tokio::test]
async fn test_process_request_unprocessable_carries_processor_error_message() {
    let h = harness(vec![Arc::new(StubProcessor {
        id: "p1",
        outcome: ProcessorResultStatus::Unprocessable,
    })]);
    let document_id = upload_ready_document(&h.storage).await;

    let result = h
        .service
        .process_request(&document_id.to_string(), &request("p1"))
        .await;

    match result {
        Err(DocPipeError::Unretryable(message)) => {
            assert_eq!(message, "backend rejected document")
        }
        other => panic!("Expected Unretryable, got {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn test_process_request_retryable_error_status_is_retryable() {
    let h = harness(vec![Arc::new(StubProcessor {
        id: "p1",
        outcome: ProcessorResultStatus::RetryableError,
    })]);
    let document_id = upload_ready_document(&h.storage).await;

    let result = h
        .service
        .process_request(&document_id.to_string(), &request("p1"))
        .await;

    assert!(matches!(result, Err(DocPipeError::Retryable(_))));
}

#[tokio::test]
async fn test_process_request_complete_persists_and_publishes() {
    let h = harness(vec![Arc::new(StubProcessor {
        id: "p1",
        outcome: ProcessorResultStatus::Complete,
    })]);
    let document_id = upload_ready_document(&h.storage).await;

    h.service
        .enqueue_processing(document_id, vec![request("p1")], false)
        .await
        .unwrap();

    let result = h
        .service
        .process_request(&document_id.to_string(), &request("p1"))
        .await
        .unwrap();

    // The result is stamped with the resolved processor id.
    assert_eq!(result.processor_id, "p1");
    assert_eq!(result.status, ProcessorResultStatus::Complete);

    // The PENDING row was overwritten in place (same composite key).
    let rows = h.results.find_by_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, ProcessorResultStatus::Complete);
    assert_eq!(rows[0].result, json!({ "score": 0.95 }));

    // One result event was published.
    assert_eq!(h.result_queue.len(), 1);
    let event: ProcessorResult =
        serde_json::from_slice(&h.result_queue.pop().unwrap()).unwrap();
    assert_eq!(event.processor_id, "p1");
}

#[tokio::test]
async fn test_results_are_ordered_by_timestamp() {
    let h = harness(vec![]);
    let document_id = Uuid::new_v4();

    // Saved out of order; timestamps decide.
    let mut first = ProcessorResult::complete(document_id, json!({}));
    first.processor_id = "a".to_string();
    let mut second = ProcessorResult::complete(document_id, json!({}));
    second.processor_id = "b".to_string();
    second.timestamp = first.timestamp + chrono::Duration::seconds(5);

    h.results.save(second.clone()).await.unwrap();
    h.results.save(first.clone()).await.unwrap();

    let rows = h.service.results_for_document(document_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].processor_id, "a");
    assert_eq!(rows[1].processor_id, "b");
}

#[test]
fn test_synthesized_antivirus_result_mirrors_scan_status() {
    let document_id = Uuid::new_v4();

    let ready = ProcessingService::synthesize_antivirus_result(document_id, ScanStatus::Ready);
    assert_eq!(ready.processor_id, ANTIVIRUS_PROCESSOR_ID);
    assert_eq!(ready.status, ProcessorResultStatus::Complete);
    assert_eq!(ready.result["http_status"], 200);
    assert_eq!(ready.result["scan_status"], "READY");

    let waiting =
        ProcessingService::synthesize_antivirus_result(document_id, ScanStatus::AwaitingScan);
    assert_eq!(waiting.status, ProcessorResultStatus::Pending);
    assert_eq!(waiting.result["http_status"], 202);

    let failed =
        ProcessingService::synthesize_antivirus_result(document_id, ScanStatus::FailedScan);
    assert_eq!(failed.status, ProcessorResultStatus::Complete);
    assert_eq!(failed.result["http_status"], 410);
}

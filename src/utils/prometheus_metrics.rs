use once_cell::sync::Lazy;
use prometheus::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};

// Metrics from the server (upload + enqueue paths)
pub static DOCUMENTS_UPLOADED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "server_documents_uploaded_total",
        "Total number of documents uploaded."
    )
    .expect("Failed to register DOCUMENTS_UPLOADED_TOTAL counter")
});

pub static REQUESTS_ENQUEUED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "server_processing_requests_enqueued_total",
        "Total number of processing requests published to the task queue."
    )
    .expect("Failed to register REQUESTS_ENQUEUED_TOTAL counter")
});

pub static REQUESTS_SKIPPED_DEDUP_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "server_processing_requests_skipped_dedup_total",
        "Total number of processing requests dropped because a result already existed."
    )
    .expect("Failed to register REQUESTS_SKIPPED_DEDUP_TOTAL counter")
});

// Metrics from the antivirus scan worker
pub static SCAN_EVENTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "scan_worker_events_total",
        "Total number of object-created events received."
    )
    .expect("Failed to register SCAN_EVENTS_TOTAL counter")
});

pub static SCAN_EVENTS_IGNORED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "scan_worker_events_ignored_total",
        "Total number of events ignored because they named a foreign bucket."
    )
    .expect("Failed to register SCAN_EVENTS_IGNORED_TOTAL counter")
});

pub static SCANS_CLEAN_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "scan_worker_clean_total",
        "Total number of documents that passed the malware scan."
    )
    .expect("Failed to register SCANS_CLEAN_TOTAL counter")
});

pub static SCANS_INFECTED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "scan_worker_infected_total",
        "Total number of documents quarantined by the malware scan."
    )
    .expect("Failed to register SCANS_INFECTED_TOTAL counter")
});

pub static SCAN_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "scan_worker_failures_total",
        "Total number of scan attempts that failed (engine or storage) and were redelivered."
    )
    .expect("Failed to register SCAN_FAILURES_TOTAL counter")
});

pub static SCAN_EVENT_DESERIALIZATION_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "scan_worker_event_deserialization_errors_total",
        "Total number of errors deserializing object-created events."
    )
    .expect("Failed to register SCAN_EVENT_DESERIALIZATION_ERRORS_TOTAL counter")
});

pub static SCAN_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "scan_worker_scan_duration_seconds",
        "Histogram of end-to-end scan handling durations (fetch, scan, move)."
    )
    .expect("Failed to register SCAN_DURATION_SECONDS histogram")
});

// Metrics from the processing worker
pub static TASKS_PROCESSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "worker_tasks_processed_total",
        "Total number of processing requests completed successfully."
    )
    .expect("Failed to register TASKS_PROCESSED_TOTAL counter")
});

pub static TASKS_RETRIED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "worker_tasks_retried_total",
        "Total number of processing requests negatively acknowledged for redelivery."
    )
    .expect("Failed to register TASKS_RETRIED_TOTAL counter")
});

pub static TASKS_UNPROCESSABLE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "worker_tasks_unprocessable_total",
        "Total number of processing requests that ended in a terminal failure."
    )
    .expect("Failed to register TASKS_UNPROCESSABLE_TOTAL counter")
});

pub static TASK_DESERIALIZATION_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "worker_task_deserialization_errors_total",
        "Total number of errors deserializing incoming task messages."
    )
    .expect("Failed to register TASK_DESERIALIZATION_ERRORS_TOTAL counter")
});

pub static ACTIVE_PROCESSING_TASKS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "worker_active_processing_tasks",
        "Number of tasks currently being processed concurrently."
    )
    .expect("Failed to register ACTIVE_PROCESSING_TASKS gauge")
});

pub static TASK_PROCESSING_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "worker_task_processing_duration_seconds",
        "Histogram of task processing durations (from message receipt to ack decision)."
    )
    .expect("Failed to register TASK_PROCESSING_DURATION_SECONDS histogram")
});

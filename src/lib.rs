//! Document ingest, antivirus scan, and asynchronous processing pipeline.
//!
//! Uploaded documents land in an "unscanned" storage area and move to
//! "scanned" or "quarantined" once the antivirus worker has looked at them.
//! Clients enqueue processing requests per document; a consumer worker pulls
//! them off a queue, dispatches to the registered processor, and persists the
//! outcome. Delivery is at-least-once: retryable outcomes are negatively
//! acknowledged and eventually dead-lettered by the broker.

pub mod antivirus;
pub mod config;
pub mod data_model;
pub mod error;
pub mod processing;
pub mod processor;
pub mod queue;
pub mod repository;
pub mod scan_logic;
pub mod server;
pub mod storage;
pub mod utils;
pub mod worker_logic;

pub use error::{DocPipeError, Result};

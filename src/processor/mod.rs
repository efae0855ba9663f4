//! Document processors and their registry.
//!
//! A processor is a pluggable capability keyed by a stable processor id.
//! Every business outcome, including upstream API failures, is encoded in
//! the returned [`ProcessorResult`] status; `process` itself never fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::data_model::ProcessorResult;

pub mod docai;
mod id_proofing;
mod quality;

pub use id_proofing::{IdFraudSignal, IdProofingProcessor, IdProofingResult, ID_PROOFING_PROCESSOR_ID};
pub use quality::{
    DocumentQualityDefect, DocumentQualityPage, DocumentQualityProcessor, DocumentQualityResult,
    DOCUMENT_QUALITY_PROCESSOR_ID,
};

/// A processing capability. Implementations must tolerate concurrent
/// re-entrant invocation for the same document id: at-least-once delivery
/// means the same request can run twice.
#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    fn processor_id(&self) -> &str;

    /// Run the processor against a document. All outcomes are encoded in the
    /// result status; callers should retry later when the status is
    /// `MISSING_DEPENDENCY`.
    async fn process(&self, document_id: &str) -> ProcessorResult;
}

/// Write-once map from processor id to capability, built at startup from the
/// configured processor set. Read-only afterwards, so it is shared freely
/// across consumer tasks without locking.
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn DocumentProcessor>>,
}

impl ProcessorRegistry {
    pub fn new(processors: Vec<Arc<dyn DocumentProcessor>>) -> Self {
        info!("Registering {} processors", processors.len());
        let mut map = HashMap::new();
        for processor in processors {
            info!("Registering processor: {}", processor.processor_id());
            map.insert(processor.processor_id().to_string(), processor);
        }
        ProcessorRegistry { processors: map }
    }

    /// Absence is a first-class outcome here; the orchestrator decides how
    /// to react to an unknown id.
    pub fn get(&self, processor_id: &str) -> Option<Arc<dyn DocumentProcessor>> {
        self.processors.get(processor_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

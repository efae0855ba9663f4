use serde::{Deserialize, Serialize};

use crate::error::{DocPipeError, Result};
use crate::processor::{DOCUMENT_QUALITY_PROCESSOR_ID, ID_PROOFING_PROCESSOR_ID};

/// The set of processors a worker registers at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub processors: Vec<ProcessorConfig>,
}

/// One processor entry. The `type` field in YAML determines which variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProcessorConfig {
    DocumentQuality(DocumentQualityParams),
    IdProofing(IdProofingParams),
}

impl ProcessorConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessorConfig::DocumentQuality(_) => "DocumentQuality",
            ProcessorConfig::IdProofing(_) => "IdProofing",
        }
    }

    /// The registry id the configured processor will answer to.
    pub fn processor_id(&self) -> &'static str {
        match self {
            ProcessorConfig::DocumentQuality(_) => DOCUMENT_QUALITY_PROCESSOR_ID,
            ProcessorConfig::IdProofing(_) => ID_PROOFING_PROCESSOR_ID,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQualityParams {
    /// Processor resource id on the document-AI backend.
    pub backend_processor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdProofingParams {
    /// Processor resource id on the document-AI backend.
    pub backend_processor_id: String,
}

impl ProcessingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.processors.is_empty() {
            return Err(DocPipeError::ConfigError(
                "Processing config declares no processors".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for processor in &self.processors {
            if !seen.insert(processor.processor_id()) {
                return Err(DocPipeError::ConfigError(format!(
                    "Duplicate processor entry: {}",
                    processor.processor_id()
                )));
            }
            match processor {
                ProcessorConfig::DocumentQuality(params) => {
                    if params.backend_processor_id.trim().is_empty() {
                        return Err(DocPipeError::ConfigError(
                            "DocumentQuality requires a backend_processor_id".to_string(),
                        ));
                    }
                }
                ProcessorConfig::IdProofing(params) => {
                    if params.backend_processor_id.trim().is_empty() {
                        return Err(DocPipeError::ConfigError(
                            "IdProofing requires a backend_processor_id".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

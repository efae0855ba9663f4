//! Identity-proofing processor: reads fraud-signal entities from the
//! backend and reports whether every signal passed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::data_model::ProcessorResult;
use crate::storage::BlobStorage;

use super::docai::{run_backend_processor, DocAiClient, ProcessResponse};
use super::DocumentProcessor;

pub const ID_PROOFING_PROCESSOR_ID: &str = "docai-id-proofing";

const PASS: &str = "PASS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdProofingResult {
    pub all_pass: bool,
    pub signals: Vec<IdFraudSignal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdFraudSignal {
    pub name: String,
    pub pass: bool,
    pub mention_text: String,
}

pub struct IdProofingProcessor {
    storage: Arc<BlobStorage>,
    client: Arc<DocAiClient>,
    backend_processor_id: String,
}

impl IdProofingProcessor {
    pub fn new(
        storage: Arc<BlobStorage>,
        client: Arc<DocAiClient>,
        backend_processor_id: impl Into<String>,
    ) -> Self {
        IdProofingProcessor {
            storage,
            client,
            backend_processor_id: backend_processor_id.into(),
        }
    }
}

#[async_trait]
impl DocumentProcessor for IdProofingProcessor {
    fn processor_id(&self) -> &str {
        ID_PROOFING_PROCESSOR_ID
    }

    async fn process(&self, document_id: &str) -> ProcessorResult {
        run_backend_processor(
            &self.storage,
            &self.client,
            &self.backend_processor_id,
            json!({}),
            document_id,
            parse_results,
        )
        .await
    }
}

fn parse_results(response: ProcessResponse) -> Option<IdProofingResult> {
    let document = response.document?;

    let mut all_pass = true;
    let mut signals = Vec::new();
    for entity in document.entities {
        let pass = entity.mention_text == PASS;
        if !pass {
            all_pass = false;
        }
        signals.push(IdFraudSignal {
            name: entity.entity_type,
            pass,
            mention_text: entity.mention_text,
        });
    }

    Some(IdProofingResult { all_pass, signals })
}

//! Document quality processor: asks the backend for OCR image-quality
//! scores and reports the worst page score plus per-page defects.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::data_model::ProcessorResult;
use crate::storage::BlobStorage;

use super::docai::{run_backend_processor, DocAiClient, ProcessResponse};
use super::DocumentProcessor;

pub const DOCUMENT_QUALITY_PROCESSOR_ID: &str = "docai-document-quality";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQualityResult {
    pub quality_score: f32,
    pub pages: Vec<DocumentQualityPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQualityPage {
    pub page_number: i32,
    pub quality_score: f32,
    pub defects: Vec<DocumentQualityDefect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQualityDefect {
    pub defect_type: String,
    pub confidence: f32,
    pub page_number: i32,
}

pub struct DocumentQualityProcessor {
    storage: Arc<BlobStorage>,
    client: Arc<DocAiClient>,
    backend_processor_id: String,
}

impl DocumentQualityProcessor {
    pub fn new(
        storage: Arc<BlobStorage>,
        client: Arc<DocAiClient>,
        backend_processor_id: impl Into<String>,
    ) -> Self {
        DocumentQualityProcessor {
            storage,
            client,
            backend_processor_id: backend_processor_id.into(),
        }
    }
}

#[async_trait]
impl DocumentProcessor for DocumentQualityProcessor {
    fn processor_id(&self) -> &str {
        DOCUMENT_QUALITY_PROCESSOR_ID
    }

    async fn process(&self, document_id: &str) -> ProcessorResult {
        let options = json!({
            "ocr_config": { "enable_image_quality_scores": true }
        });
        run_backend_processor(
            &self.storage,
            &self.client,
            &self.backend_processor_id,
            options,
            document_id,
            parse_results,
        )
        .await
    }
}

fn parse_results(response: ProcessResponse) -> Option<DocumentQualityResult> {
    let document = response.document?;

    // The document-level score is the worst page score.
    let mut quality_score = 1.0f32;
    let mut pages = Vec::new();
    for page in document.pages {
        let scores = match page.image_quality_scores {
            Some(scores) => scores,
            None => continue,
        };
        if quality_score > scores.quality_score {
            quality_score = scores.quality_score;
        }
        let defects = scores
            .detected_defects
            .into_iter()
            .map(|defect| DocumentQualityDefect {
                defect_type: defect.defect_type,
                confidence: defect.confidence,
                page_number: page.page_number,
            })
            .collect();
        pages.push(DocumentQualityPage {
            page_number: page.page_number,
            quality_score: scores.quality_score,
            defects,
        });
    }

    Some(DocumentQualityResult {
        quality_score,
        pages,
    })
}

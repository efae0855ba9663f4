//! Persistence seams for documents and processor results.
//!
//! The orchestrator owns request creation and dedup; the consumer worker
//! owns terminal-state writes. Both go through these traits, so the storage
//! technology behind them is swappable (in-memory for tests and single-node
//! runs, Postgres for deployments).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::data_model::{Document, ProcessorResult};
use crate::error::Result;

pub mod postgres;

/// Store of processor results, keyed by (processor_id, document_id).
/// `save` upserts: the terminal write for a pair overwrites its PENDING row.
#[async_trait]
pub trait ProcessorResultRepository: Send + Sync {
    async fn save(&self, result: ProcessorResult) -> Result<()>;

    /// All rows for a document, ordered by timestamp ascending.
    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<ProcessorResult>>;

    async fn find_by_document_and_processor_ids(
        &self,
        document_id: Uuid,
        processor_ids: &[String],
    ) -> Result<Vec<ProcessorResult>>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn save(&self, document: Document) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>>;
}

#[derive(Default)]
pub struct InMemoryProcessorResultRepository {
    rows: RwLock<HashMap<(String, Uuid), ProcessorResult>>,
}

impl InMemoryProcessorResultRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl ProcessorResultRepository for InMemoryProcessorResultRepository {
    async fn save(&self, result: ProcessorResult) -> Result<()> {
        let key = (result.processor_id.clone(), result.document_id);
        self.rows.write().await.insert(key, result);
        Ok(())
    }

    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<ProcessorResult>> {
        let rows = self.rows.read().await;
        let mut results: Vec<ProcessorResult> = rows
            .values()
            .filter(|row| row.document_id == document_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.processor_id.cmp(&b.processor_id))
        });
        Ok(results)
    }

    async fn find_by_document_and_processor_ids(
        &self,
        document_id: Uuid,
        processor_ids: &[String],
    ) -> Result<Vec<ProcessorResult>> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|row| {
                row.document_id == document_id && processor_ids.contains(&row.processor_id)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryDocumentRepository {
    rows: RwLock<HashMap<Uuid, Document>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn save(&self, document: Document) -> Result<()> {
        self.rows.write().await.insert(document.id, document);
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.rows.read().await.get(&id).cloned())
    }
}

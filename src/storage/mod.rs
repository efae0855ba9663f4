//! Three-area blob storage for the document lifecycle.
//!
//! A document blob lives in exactly one of the unscanned, quarantine, or
//! scanned areas; the scan status is derived from which area holds it, never
//! stored. Custom metadata travels as a JSON sidecar object next to the blob
//! so the unscanned and scanned areas keep independent metadata stores.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use object_store::{
    local::LocalFileSystem, memory::InMemory, path::Path as ObjectPath,
    Error as ObjectStoreError, ObjectStore, ObjectStoreExt, PutPayload,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_model::{DocumentMetadata, ScanStatus};
use crate::error::{DocPipeError, Result};

const METADATA_SUFFIX: &str = ".meta";

/// The three logical storage areas of the scan lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanArea {
    Unscanned,
    Quarantine,
    Scanned,
}

/// Names of the three areas. These double as the `bucket` value carried by
/// object-created events, so the scan worker can filter stray subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AreaNames {
    pub unscanned: String,
    pub quarantine: String,
    pub scanned: String,
}

impl Default for AreaNames {
    fn default() -> Self {
        AreaNames {
            unscanned: "unscanned-files".to_string(),
            quarantine: "quarantined-files".to_string(),
            scanned: "scanned-files".to_string(),
        }
    }
}

/// Blob bytes plus the content type recorded at upload.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Storage facade over an [`ObjectStore`], with the three lifecycle areas
/// mapped to path prefixes within the store.
#[derive(Clone)]
pub struct BlobStorage {
    store: Arc<dyn ObjectStore>,
    areas: AreaNames,
}

impl BlobStorage {
    pub fn new(store: Arc<dyn ObjectStore>, areas: AreaNames) -> Self {
        BlobStorage { store, areas }
    }

    /// In-memory storage, used by tests and single-process demos.
    pub fn in_memory() -> Self {
        BlobStorage::new(Arc::new(InMemory::new()), AreaNames::default())
    }

    /// Filesystem-backed storage rooted at `root`; each area becomes a
    /// subdirectory.
    pub fn local(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| DocPipeError::Storage(e.to_string()))?;
        Ok(BlobStorage::new(Arc::new(store), AreaNames::default()))
    }

    pub fn unscanned_area(&self) -> &str {
        &self.areas.unscanned
    }

    fn area_name(&self, area: ScanArea) -> &str {
        match area {
            ScanArea::Unscanned => &self.areas.unscanned,
            ScanArea::Quarantine => &self.areas.quarantine,
            ScanArea::Scanned => &self.areas.scanned,
        }
    }

    fn blob_path(&self, area: ScanArea, document_id: &str) -> ObjectPath {
        ObjectPath::from(format!("{}/{}", self.area_name(area), document_id))
    }

    fn meta_path(&self, area: ScanArea, document_id: &str) -> ObjectPath {
        ObjectPath::from(format!(
            "{}/{}{}",
            self.area_name(area),
            document_id,
            METADATA_SUFFIX
        ))
    }

    /// Write a new document blob and its metadata sidecar to the unscanned
    /// area to await scanning.
    pub async fn upload(
        &self,
        document_id: &str,
        data: Bytes,
        metadata: &DocumentMetadata,
    ) -> Result<()> {
        let meta_bytes = serde_json::to_vec(metadata)?;
        self.store
            .put(
                &self.blob_path(ScanArea::Unscanned, document_id),
                PutPayload::from(data),
            )
            .await?;
        self.store
            .put(
                &self.meta_path(ScanArea::Unscanned, document_id),
                PutPayload::from(meta_bytes),
            )
            .await?;
        Ok(())
    }

    /// Derive the scan status of a document from the area holding its blob.
    /// Probes scanned, then quarantine, then unscanned; absent everywhere is
    /// NotFound.
    pub async fn status(&self, document_id: &str) -> Result<ScanStatus> {
        if self.exists(ScanArea::Scanned, document_id).await? {
            return Ok(ScanStatus::Ready);
        }
        if self.exists(ScanArea::Quarantine, document_id).await? {
            return Ok(ScanStatus::FailedScan);
        }
        if self.exists(ScanArea::Unscanned, document_id).await? {
            return Ok(ScanStatus::AwaitingScan);
        }
        Err(DocPipeError::NotFound(document_id.to_string()))
    }

    async fn exists(&self, area: ScanArea, document_id: &str) -> Result<bool> {
        match self.store.head(&self.blob_path(area, document_id)).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(DocPipeError::Storage(e.to_string())),
        }
    }

    /// Metadata for a READY document (scanned area).
    pub async fn metadata(&self, document_id: &str) -> Result<DocumentMetadata> {
        self.read_metadata(ScanArea::Scanned, document_id).await
    }

    /// Metadata for a document still awaiting scan. The unscanned area keeps
    /// its own metadata store; the two accessors must not be conflated.
    pub async fn unscanned_metadata(&self, document_id: &str) -> Result<DocumentMetadata> {
        self.read_metadata(ScanArea::Unscanned, document_id).await
    }

    async fn read_metadata(&self, area: ScanArea, document_id: &str) -> Result<DocumentMetadata> {
        let bytes = self
            .store
            .get(&self.meta_path(area, document_id))
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => {
                    DocPipeError::NotFound(document_id.to_string())
                }
                other => DocPipeError::Storage(other.to_string()),
            })?
            .bytes()
            .await
            .map_err(|e| DocPipeError::Storage(e.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Content of a READY document.
    pub async fn file_data(&self, document_id: &str) -> Result<FileContent> {
        self.read_file(ScanArea::Scanned, document_id).await
    }

    /// Content of a document awaiting scan. Only the scanning flow should
    /// read from the unscanned area.
    pub async fn unscanned_file_data(&self, document_id: &str) -> Result<FileContent> {
        self.read_file(ScanArea::Unscanned, document_id).await
    }

    async fn read_file(&self, area: ScanArea, document_id: &str) -> Result<FileContent> {
        let bytes = self
            .store
            .get(&self.blob_path(area, document_id))
            .await
            .map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => {
                    DocPipeError::NotFound(document_id.to_string())
                }
                other => DocPipeError::Storage(other.to_string()),
            })?
            .bytes()
            .await
            .map_err(|e| DocPipeError::Storage(e.to_string()))?;
        let metadata = self.read_metadata(area, document_id).await?;
        Ok(FileContent {
            bytes,
            content_type: metadata.content_type,
        })
    }

    /// Move a clean document from the unscanned area to the scanned area.
    pub async fn confirm_clean_file(&self, document_id: &str) -> Result<()> {
        self.move_file(document_id, ScanArea::Unscanned, ScanArea::Scanned)
            .await
    }

    /// Move an infected document from the unscanned area to quarantine.
    pub async fn quarantine_file(&self, document_id: &str) -> Result<()> {
        self.move_file(document_id, ScanArea::Unscanned, ScanArea::Quarantine)
            .await
    }

    /// Copy-verify-delete move between areas. Not atomic: a duplicate
    /// delivery racing this move either finds the source already gone
    /// (treated as success, provided the destination holds the blob) or
    /// re-runs the copy+delete to the same end state. The existence check
    /// before delete is what makes the retried move converge.
    async fn move_file(&self, document_id: &str, src: ScanArea, dst: ScanArea) -> Result<()> {
        let src_blob = self.blob_path(src, document_id);
        let dst_blob = self.blob_path(dst, document_id);

        match self.store.copy(&src_blob, &dst_blob).await {
            Ok(()) => {}
            Err(ObjectStoreError::NotFound { .. }) => {
                // Source already moved by a previous delivery of the same
                // event. Success only if the destination actually has it.
                if self.exists(dst, document_id).await? {
                    debug!(document_id, "Source blob already moved; nothing to do");
                    return Ok(());
                }
                return Err(DocPipeError::NotFound(document_id.to_string()));
            }
            Err(e) => return Err(DocPipeError::Storage(e.to_string())),
        }

        // Sidecar moves with the blob. A missing sidecar at this point means
        // a concurrent move already relocated it.
        let src_meta = self.meta_path(src, document_id);
        let dst_meta = self.meta_path(dst, document_id);
        match self.store.copy(&src_meta, &dst_meta).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => return Err(DocPipeError::Storage(e.to_string())),
        }

        if !self.exists(dst, document_id).await? {
            return Err(DocPipeError::Storage(format!(
                "Failed to copy {} to {} area",
                document_id,
                self.area_name(dst)
            )));
        }

        match self.store.delete(&src_blob).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => {}
            Err(e) => {
                return Err(DocPipeError::Storage(format!(
                    "Failed to delete {} from {} area: {}",
                    document_id,
                    self.area_name(src),
                    e
                )))
            }
        }
        match self.store.delete(&src_meta).await {
            Ok(()) | Err(ObjectStoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(DocPipeError::Storage(format!(
                "Failed to delete metadata for {} from {} area: {}",
                document_id,
                self.area_name(src),
                e
            ))),
        }
    }
}

//! Postgres-backed repositories. Queries are runtime-checked (no macros) so
//! the crate builds without a live database.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

use crate::data_model::{Document, ProcessorResult, ProcessorResultStatus};
use crate::error::{DocPipeError, Result};

use super::{DocumentRepository, ProcessorResultRepository};

/// Connect a pool and run pending migrations from `./migrations`.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new("./migrations"))
        .await
        .map_err(|e| DocPipeError::Storage(format!("Failed to load migrations: {e}")))?;
    migrator
        .run(&pool)
        .await
        .map_err(|e| DocPipeError::Storage(format!("Migration failed: {e}")))?;
    Ok(pool)
}

#[derive(Clone)]
pub struct PgProcessorResultRepository {
    pool: PgPool,
}

impl PgProcessorResultRepository {
    pub fn new(pool: PgPool) -> Self {
        PgProcessorResultRepository { pool }
    }
}

fn result_from_row(row: &PgRow) -> Result<ProcessorResult> {
    let status_text: String = row.try_get("status")?;
    let status = ProcessorResultStatus::from_str(&status_text).ok_or_else(|| {
        DocPipeError::Storage(format!("Unknown processor result status '{status_text}'"))
    })?;
    Ok(ProcessorResult {
        processor_id: row.try_get("processor_id")?,
        document_id: row.try_get("document_id")?,
        status,
        result: row.try_get("result")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl ProcessorResultRepository for PgProcessorResultRepository {
    async fn save(&self, result: ProcessorResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document_processor_result
                (processor_id, document_id, status, result, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (processor_id, document_id) DO UPDATE
                SET status = EXCLUDED.status,
                    result = EXCLUDED.result,
                    timestamp = EXCLUDED.timestamp
            "#,
        )
        .bind(&result.processor_id)
        .bind(result.document_id)
        .bind(result.status.as_str())
        .bind(&result.result)
        .bind(result.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_document(&self, document_id: Uuid) -> Result<Vec<ProcessorResult>> {
        let rows = sqlx::query(
            r#"
            SELECT processor_id, document_id, status, result, timestamp
            FROM document_processor_result
            WHERE document_id = $1
            ORDER BY timestamp ASC, processor_id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(result_from_row).collect()
    }

    async fn find_by_document_and_processor_ids(
        &self,
        document_id: Uuid,
        processor_ids: &[String],
    ) -> Result<Vec<ProcessorResult>> {
        let rows = sqlx::query(
            r#"
            SELECT processor_id, document_id, status, result, timestamp
            FROM document_processor_result
            WHERE document_id = $1 AND processor_id = ANY($2)
            "#,
        )
        .bind(document_id)
        .bind(processor_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(result_from_row).collect()
    }
}

#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        PgDocumentRepository { pool }
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn save(&self, document: Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document (id, filename, uploaded_by)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(document.id)
        .bind(&document.filename)
        .bind(&document.uploaded_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, uploaded_by
            FROM document
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(Document {
                id: row.try_get("id")?,
                filename: row.try_get("filename")?,
                uploaded_by: row.try_get("uploaded_by")?,
            })),
            None => Ok(None),
        }
    }
}

//! Metadata storage using SQLite
//!
//! This module handles all local metadata storage including:
//! - Collections (user-defined named groupings of documents)
//! - Documents (uploaded files and their processing status)
//! - Jobs (asynchronous ingestion attempts, one per document)
//!
//! The database is the single source of truth for job state; there is no
//! in-memory job registry that could drift from it across restarts.

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared lifecycle status for jobs and documents.
///
/// `Queued` is the only initial state; `Completed` and `Failed` are terminal
/// and never left again. There is no automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl IngestStatus {
    /// Whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestStatus::Completed | IngestStatus::Failed)
    }
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestStatus::Queued => write!(f, "queued"),
            IngestStatus::Processing => write!(f, "processing"),
            IngestStatus::Completed => write!(f, "completed"),
            IngestStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for IngestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(IngestStatus::Queued),
            "processing" => Ok(IngestStatus::Processing),
            "completed" => Ok(IngestStatus::Completed),
            "failed" => Ok(IngestStatus::Failed),
            _ => Err(Error::Config(format!("Unknown ingest status: {}", s))),
        }
    }
}

/// Pipeline stage at which a job failed.
///
/// Stored next to the failure message so callers can tell a chunking
/// problem from an embedding or storage problem without parsing strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Read,
    Chunk,
    Embed,
    Store,
    Metadata,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Read => write!(f, "read"),
            PipelineStage::Chunk => write!(f, "chunk"),
            PipelineStage::Embed => write!(f, "embed"),
            PipelineStage::Store => write!(f, "store"),
            PipelineStage::Metadata => write!(f, "metadata"),
        }
    }
}

impl FromStr for PipelineStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "read" => Ok(PipelineStage::Read),
            "chunk" => Ok(PipelineStage::Chunk),
            "embed" => Ok(PipelineStage::Embed),
            "store" => Ok(PipelineStage::Store),
            "metadata" => Ok(PipelineStage::Metadata),
            _ => Err(Error::Config(format!("Unknown pipeline stage: {}", s))),
        }
    }
}

/// A user-defined collection of documents
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// An uploaded document and its processing status
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub filename: String,
    pub status: String,
    pub upload_path: String,
    pub collection_id: i64,
    pub created_at: String,
}

impl Document {
    pub fn get_status(&self) -> Result<IngestStatus> {
        self.status.parse()
    }
}

/// One asynchronous ingestion attempt for a document
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub filename: String,
    pub status: String,
    pub result: Option<String>,
    pub failure_stage: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Job {
    /// Create a fresh queued job for a filename
    pub fn new(filename: String) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            filename,
            status: IngestStatus::Queued.to_string(),
            result: None,
            failure_stage: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn get_status(&self) -> Result<IngestStatus> {
        self.status.parse()
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Open the metadata database at a path, creating and initializing it
    /// if needed
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };

        if !db.is_initialized().await? {
            db.init_schema().await?;
        }

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM sqlite_master WHERE type='table' AND name='collections'")
                .fetch_optional(&self.pool)
                .await?;
        Ok(result.is_some())
    }

    // ===== Collection Operations =====

    /// Create a collection; duplicate names surface a conflict error and
    /// leave no row behind
    pub async fn create_collection(&self, name: &str) -> Result<Collection> {
        let created_at = Utc::now().to_rfc3339();
        let result = sqlx::query("INSERT INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(&created_at)
            .execute(&self.pool)
            .await;

        let result = result.map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::CollectionExists(name.to_string())
            }
            other => Error::Database(other),
        })?;

        Ok(Collection {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            created_at,
        })
    }

    /// Get collection by ID
    pub async fn get_collection(&self, id: i64) -> Result<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(collection)
    }

    /// Get collection by name
    pub async fn get_collection_by_name(&self, name: &str) -> Result<Option<Collection>> {
        let collection =
            sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(collection)
    }

    /// List all collections
    pub async fn list_collections(&self) -> Result<Vec<Collection>> {
        let collections =
            sqlx::query_as::<_, Collection>("SELECT * FROM collections ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(collections)
    }

    // ===== Document Operations =====

    /// Insert a new document row and return its id; filenames are unique
    /// across the system
    pub async fn create_document(
        &self,
        filename: &str,
        status: IngestStatus,
        upload_path: &str,
        collection_id: i64,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (filename, status, upload_path, collection_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(filename)
        .bind(status.to_string())
        .bind(upload_path)
        .bind(collection_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::DocumentExists(filename.to_string())
            }
            other => Error::Database(other),
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Update a document's status
    pub async fn update_document_status(&self, id: i64, status: IngestStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Get document by ID
    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// Get document by filename
    pub async fn get_document_by_filename(&self, filename: &str) -> Result<Option<Document>> {
        let doc = sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&self.pool)
            .await?;
        Ok(doc)
    }

    /// List documents in a collection
    pub async fn list_documents(&self, collection_id: i64) -> Result<Vec<Document>> {
        let docs = sqlx::query_as::<_, Document>(
            "SELECT * FROM documents WHERE collection_id = ? ORDER BY filename",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    /// Count documents in a collection
    pub async fn count_documents(&self, collection_id: i64) -> Result<usize> {
        let count: i32 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection_id = ?")
                .bind(collection_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    // ===== Job Operations =====

    /// Insert a new job
    pub async fn create_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, filename, status, result, failure_stage, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.filename)
        .bind(&job.status)
        .bind(&job.result)
        .bind(&job.failure_stage)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get job by ID
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Update a job's status, and optionally its result and failure stage.
    /// Passing `None` leaves the existing value in place.
    pub async fn update_job(
        &self,
        id: &str,
        status: IngestStatus,
        result: Option<&str>,
        failure_stage: Option<PipelineStage>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                result = COALESCE(?, result),
                failure_stage = COALESCE(?, failure_stage),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(result)
        .bind(failure_stage.map(|s| s.to_string()))
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List all jobs, newest first
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    // ===== Statistics =====

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let collection_count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM collections")
            .fetch_one(&self.pool)
            .await?;

        let document_count: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<(String, i32)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = GlobalStats {
            collection_count: collection_count as usize,
            document_count: document_count as usize,
            ..Default::default()
        };
        for (status, count) in rows {
            let count = count as usize;
            match status.parse::<IngestStatus>() {
                Ok(IngestStatus::Queued) => stats.jobs_queued = count,
                Ok(IngestStatus::Processing) => stats.jobs_processing = count,
                Ok(IngestStatus::Completed) => stats.jobs_completed = count,
                Ok(IngestStatus::Failed) => stats.jobs_failed = count,
                Err(_) => debug!("Ignoring unknown job status '{}' in stats", status),
            }
        }

        Ok(stats)
    }
}

/// Global statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub collection_count: usize,
    pub document_count: usize,
    pub jobs_queued: usize,
    pub jobs_processing: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        (db, tmp)
    }

    #[tokio::test]
    async fn test_collection_crud() {
        let (db, _tmp) = setup_test_db().await;

        let collection = db.create_collection("demo").await.unwrap();
        assert_eq!(collection.name, "demo");
        assert!(collection.id > 0);

        let loaded = db.get_collection(collection.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "demo");

        let by_name = db.get_collection_by_name("demo").await.unwrap().unwrap();
        assert_eq!(by_name.id, collection.id);

        let collections = db.list_collections().await.unwrap();
        assert_eq!(collections.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_collection_name_conflicts() {
        let (db, _tmp) = setup_test_db().await;

        db.create_collection("demo").await.unwrap();
        let err = db.create_collection("demo").await.unwrap_err();
        assert!(matches!(err, Error::CollectionExists(ref name) if name == "demo"));

        // No second row was created
        let collections = db.list_collections().await.unwrap();
        assert_eq!(collections.len(), 1);
    }

    #[tokio::test]
    async fn test_document_create_and_status_update() {
        let (db, _tmp) = setup_test_db().await;

        let collection = db.create_collection("docs").await.unwrap();
        let doc_id = db
            .create_document(
                "notes.txt",
                IngestStatus::Queued,
                "/tmp/uploads/notes.txt",
                collection.id,
            )
            .await
            .unwrap();

        let doc = db.get_document(doc_id).await.unwrap().unwrap();
        assert_eq!(doc.get_status().unwrap(), IngestStatus::Queued);
        assert_eq!(doc.collection_id, collection.id);

        db.update_document_status(doc_id, IngestStatus::Processing)
            .await
            .unwrap();
        let doc = db.get_document(doc_id).await.unwrap().unwrap();
        assert_eq!(doc.get_status().unwrap(), IngestStatus::Processing);

        // Duplicate filename is rejected
        let err = db
            .create_document("notes.txt", IngestStatus::Queued, "/tmp/other", collection.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DocumentExists(_)));

        let listed = db.list_documents(collection.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, doc_id);

        let by_filename = db
            .get_document_by_filename("notes.txt")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_filename.id, doc_id);
    }

    #[tokio::test]
    async fn test_job_lifecycle_updates() {
        let (db, _tmp) = setup_test_db().await;

        let job = Job::new("report.md".to_string());
        db.create_job(&job).await.unwrap();

        let loaded = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.get_status().unwrap(), IngestStatus::Queued);
        assert!(loaded.result.is_none());

        db.update_job(&job.id, IngestStatus::Processing, None, None)
            .await
            .unwrap();
        let loaded = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.get_status().unwrap(), IngestStatus::Processing);
        assert!(loaded.result.is_none());

        db.update_job(
            &job.id,
            IngestStatus::Failed,
            Some("model exploded"),
            Some(PipelineStage::Embed),
        )
        .await
        .unwrap();
        let loaded = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.get_status().unwrap(), IngestStatus::Failed);
        assert_eq!(loaded.result.as_deref(), Some("model exploded"));
        assert_eq!(loaded.failure_stage.as_deref(), Some("embed"));
    }

    #[tokio::test]
    async fn test_global_stats() {
        let (db, _tmp) = setup_test_db().await;

        let collection = db.create_collection("stats").await.unwrap();
        db.create_document("a.txt", IngestStatus::Queued, "/tmp/a", collection.id)
            .await
            .unwrap();

        let job = Job::new("a.txt".to_string());
        db.create_job(&job).await.unwrap();
        db.update_job(&job.id, IngestStatus::Completed, Some("done"), None)
            .await
            .unwrap();

        let stats = db.get_global_stats().await.unwrap();
        assert_eq!(stats.collection_count, 1);
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.jobs_completed, 1);
        assert_eq!(stats.jobs_failed, 0);
    }

    #[test]
    fn test_pipeline_stage_round_trip() {
        for stage in [
            PipelineStage::Read,
            PipelineStage::Chunk,
            PipelineStage::Embed,
            PipelineStage::Store,
            PipelineStage::Metadata,
        ] {
            assert_eq!(
                stage.to_string().parse::<PipelineStage>().unwrap(),
                stage
            );
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            IngestStatus::Queued,
            IngestStatus::Processing,
            IngestStatus::Completed,
            IngestStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<IngestStatus>().unwrap(), status);
        }
        assert!(IngestStatus::Completed.is_terminal());
        assert!(!IngestStatus::Processing.is_terminal());
    }
}

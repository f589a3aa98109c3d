//! Asynchronous ingestion pipeline
//!
//! The [`IngestCoordinator`] drives a document through its lifecycle:
//!
//! ```text
//! queued --(slot acquired)--> processing --(pipeline ok)--> completed
//! queued --(slot acquired)--> processing --(pipeline err)--> failed
//! ```
//!
//! `submit` returns as soon as the job is scheduled; callers poll the job
//! record by id to observe the outcome. A semaphore bounds how many
//! pipeline bodies run at once, independent of how many jobs have been
//! submitted. Job records are created queued immediately at submission
//! time; only the pipeline body waits on a permit.
//!
//! Within one job the steps are strictly sequential: read the upload,
//! chunk, embed, append to the vector store, then mark both the job and
//! its document with the terminal status. Pipeline failures are captured
//! into the job record (stage + message) and never propagate out of the
//! background task. The upload artifact is removed whether the job
//! succeeds or fails.

use crate::chunk::chunk_text;
use crate::config::{ChunkConfig, Config};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::meta::{IngestStatus, MetaDb, PipelineStage};
use crate::store::{EmbeddingRecord, VectorStore};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Everything the coordinator needs to locate one submitted document.
///
/// The document row and the job row must already be durably stored
/// (status queued) before the request is submitted.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Id of the already-persisted job record
    pub job_id: String,

    /// Id of the already-persisted document record
    pub document_id: i64,

    /// Readable file holding the uploaded bytes; owned by this job and
    /// deleted when processing ends
    pub upload_path: PathBuf,
}

/// A structured pipeline failure: which stage broke, and how.
#[derive(Debug, Clone)]
struct PipelineFailure {
    stage: Option<PipelineStage>,
    message: String,
}

impl PipelineFailure {
    fn at(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            stage: Some(stage),
            message: message.into(),
        }
    }
}

/// Schedules and drives ingestion jobs.
///
/// Cloneable handles to the metadata store and trait objects for the
/// embedder and vector store are shared across all running jobs.
pub struct IngestCoordinator {
    meta: MetaDb,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkConfig,
    embed_batch_size: usize,
    embed_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl IngestCoordinator {
    /// Create a coordinator from configuration
    pub fn new(
        meta: MetaDb,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: &Config,
    ) -> Self {
        Self {
            meta,
            embedder,
            store,
            chunking: config.chunk.clone(),
            embed_batch_size: config.embedding.batch_size,
            embed_timeout: Duration::from_secs(config.ingest.embed_timeout_secs),
            permits: Arc::new(Semaphore::new(config.ingest.max_concurrent_jobs)),
        }
    }

    /// Schedule a submitted document for background processing.
    ///
    /// Returns immediately after spawning the job task. Errors returned
    /// here concern scheduling only; execution failures are visible
    /// through subsequent job status reads.
    pub fn submit(&self, request: IngestRequest) -> Result<()> {
        if self.permits.is_closed() {
            return Err(Error::Scheduling("coordinator is shut down".to_string()));
        }

        debug!(job_id = %request.job_id, "Scheduling ingestion job");

        let worker = JobWorker {
            meta: self.meta.clone(),
            embedder: Arc::clone(&self.embedder),
            store: Arc::clone(&self.store),
            chunking: self.chunking.clone(),
            embed_batch_size: self.embed_batch_size,
            embed_timeout: self.embed_timeout,
        };
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    // Shut down while waiting for a slot; leave a terminal,
                    // inspectable record rather than a job stuck in queued
                    warn!(job_id = %request.job_id, "Coordinator shut down before job started");
                    worker
                        .finish(
                            &request,
                            Err(PipelineFailure {
                                stage: None,
                                message: "shut down before processing started".to_string(),
                            }),
                        )
                        .await;
                    worker.cleanup(&request).await;
                    return;
                }
            };

            worker.run(request).await;
        });

        Ok(())
    }

    /// Stop accepting new submissions and wake queued tasks.
    ///
    /// Jobs that already hold a permit run to completion; jobs still
    /// waiting for a slot are marked failed.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}

/// Per-job view of the coordinator's shared state
struct JobWorker {
    meta: MetaDb,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunking: ChunkConfig,
    embed_batch_size: usize,
    embed_timeout: Duration,
}

impl JobWorker {
    async fn run(self, request: IngestRequest) {
        let outcome = self.execute(&request).await;
        self.finish(&request, outcome).await;
        self.cleanup(&request).await;
    }

    /// The pipeline body: mark processing, read, chunk, embed, store.
    /// Returns the success summary for the job record.
    async fn execute(
        &self,
        request: &IngestRequest,
    ) -> std::result::Result<String, PipelineFailure> {
        // The in-memory handle may be stale; the database is authoritative
        let job = self
            .meta
            .get_job(&request.job_id)
            .await
            .map_err(|e| PipelineFailure::at(PipelineStage::Metadata, e.to_string()))?
            .ok_or_else(|| {
                PipelineFailure::at(
                    PipelineStage::Metadata,
                    format!("job {} not found", request.job_id),
                )
            })?;

        let document = self
            .meta
            .get_document(request.document_id)
            .await
            .map_err(|e| PipelineFailure::at(PipelineStage::Metadata, e.to_string()))?
            .ok_or_else(|| {
                PipelineFailure::at(
                    PipelineStage::Metadata,
                    format!("document {} not found", request.document_id),
                )
            })?;

        // Persist the processing transition on both records before any
        // pipeline work
        self.meta
            .update_job(&request.job_id, IngestStatus::Processing, None, None)
            .await
            .map_err(|e| PipelineFailure::at(PipelineStage::Metadata, e.to_string()))?;
        self.meta
            .update_document_status(request.document_id, IngestStatus::Processing)
            .await
            .map_err(|e| PipelineFailure::at(PipelineStage::Metadata, e.to_string()))?;

        info!(job_id = %job.id, filename = %job.filename, "Starting ingestion");

        let text = tokio::fs::read_to_string(&request.upload_path)
            .await
            .map_err(|e| {
                PipelineFailure::at(
                    PipelineStage::Read,
                    format!("reading {}: {}", request.upload_path.display(), e),
                )
            })?;

        let chunks = chunk_text(&text, &self.chunking);
        if chunks.is_empty() {
            return Ok(format!("no chunks produced from {}", job.filename));
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedded = timeout(
            self.embed_timeout,
            embed_in_batches(self.embedder.as_ref(), texts, self.embed_batch_size),
        )
        .await;

        let vectors = match embedded {
            Err(_) => {
                return Err(PipelineFailure::at(
                    PipelineStage::Embed,
                    format!(
                        "embedding timed out after {}s",
                        self.embed_timeout.as_secs()
                    ),
                ))
            }
            Ok(Err(e)) => return Err(PipelineFailure::at(PipelineStage::Embed, e.to_string())),
            Ok(Ok(vectors)) => vectors,
        };

        if vectors.len() != chunks.len() {
            return Err(PipelineFailure::at(
                PipelineStage::Embed,
                format!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    chunks.len()
                ),
            ));
        }

        let timestamp = Utc::now().timestamp_millis() as f64 / 1000.0;
        let records: Vec<EmbeddingRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord {
                vector,
                text: chunk.text.clone(),
                filename: job.filename.clone(),
                chunk_id: chunk.index as i32,
                collection_id: document.collection_id.to_string(),
                timestamp,
            })
            .collect();

        let count = records.len();
        self.store
            .add(records)
            .await
            .map_err(|e| PipelineFailure::at(PipelineStage::Store, e.to_string()))?;

        Ok(format!("embedded {} chunks from {}", count, job.filename))
    }

    /// Persist the terminal status on both the job and its document.
    /// Failures here are logged and swallowed: there is no lower layer
    /// left to report them to.
    async fn finish(
        &self,
        request: &IngestRequest,
        outcome: std::result::Result<String, PipelineFailure>,
    ) {
        let (status, result, stage) = match outcome {
            Ok(summary) => {
                info!(job_id = %request.job_id, "Ingestion finished: {}", summary);
                (IngestStatus::Completed, summary, None)
            }
            Err(failure) => {
                warn!(
                    job_id = %request.job_id,
                    stage = ?failure.stage,
                    "Ingestion failed: {}", failure.message
                );
                (IngestStatus::Failed, failure.message, failure.stage)
            }
        };

        if let Err(e) = self
            .meta
            .update_job(&request.job_id, status, Some(&result), stage)
            .await
        {
            error!(job_id = %request.job_id, "Failed to persist job status: {}", e);
        }
        if let Err(e) = self
            .meta
            .update_document_status(request.document_id, status)
            .await
        {
            error!(
                job_id = %request.job_id,
                document_id = request.document_id,
                "Failed to persist document status: {}", e
            );
        }
    }

    /// Remove the upload artifact, success or failure
    async fn cleanup(&self, request: &IngestRequest) {
        match tokio::fs::remove_file(&request.upload_path).await {
            Ok(()) => debug!(path = %request.upload_path.display(), "Removed upload artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %request.upload_path.display(),
                "Failed to remove upload artifact: {}", e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Job;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    struct StubEmbedder {
        dimension: usize,
        delay: Duration,
        fail: bool,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl StubEmbedder {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                delay: Duration::from_millis(0),
                fail: false,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn observed_max_concurrency(&self) -> usize {
            self.max_active.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            let result = if self.fail {
                Err(Error::Embedding("model exploded".to_string()))
            } else {
                Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        records: Mutex<Vec<EmbeddingRecord>>,
        fail: bool,
    }

    impl RecordingStore {
        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn add(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
            if self.fail {
                return Err(Error::Qdrant("vector store unavailable".to_string()));
            }
            self.records.lock().await.extend(records);
            Ok(())
        }
    }

    fn test_config(max_concurrent_jobs: usize) -> Config {
        let mut config = Config::default();
        config.ingest.max_concurrent_jobs = max_concurrent_jobs;
        config.chunk = ChunkConfig {
            chunk_size: 512,
            overlap: 50,
        };
        config
    }

    async fn setup_db(tmp: &TempDir) -> (MetaDb, i64) {
        let meta = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();
        let collection = meta.create_collection("demo").await.unwrap();
        (meta, collection.id)
    }

    /// Persist document + job rows, then submit to the coordinator;
    /// mirrors what the submission boundary does.
    async fn submit_document(
        meta: &MetaDb,
        coordinator: &IngestCoordinator,
        dir: &Path,
        collection_id: i64,
        filename: &str,
        content: &str,
    ) -> (String, i64, PathBuf) {
        let upload_path = dir.join(filename);
        tokio::fs::write(&upload_path, content).await.unwrap();

        let document_id = meta
            .create_document(
                filename,
                IngestStatus::Queued,
                upload_path.to_str().unwrap(),
                collection_id,
            )
            .await
            .unwrap();

        let job = Job::new(filename.to_string());
        meta.create_job(&job).await.unwrap();

        coordinator
            .submit(IngestRequest {
                job_id: job.id.clone(),
                document_id,
                upload_path: upload_path.clone(),
            })
            .unwrap();

        (job.id, document_id, upload_path)
    }

    async fn wait_terminal(meta: &MetaDb, job_id: &str) -> Job {
        for _ in 0..500 {
            let job = meta.get_job(job_id).await.unwrap().unwrap();
            if job.get_status().unwrap().is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not reach a terminal state", job_id);
    }

    #[tokio::test]
    async fn test_successful_ingestion_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let (meta, collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(8));
        let store = Arc::new(RecordingStore::default());
        let config = test_config(2);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder.clone() as Arc<dyn Embedder>,
            store.clone() as Arc<dyn VectorStore>,
            &config,
        );

        let content = "The quick brown fox jumps over the lazy dog. ".repeat(45);
        assert!(content.len() >= 2000);
        let expected_chunks = chunk_text(&content, &config.chunk).len();
        assert!(expected_chunks >= 1);

        let (job_id, document_id, upload_path) = submit_document(
            &meta,
            &coordinator,
            tmp.path(),
            collection_id,
            "fox.txt",
            &content,
        )
        .await;

        let job = wait_terminal(&meta, &job_id).await;
        assert_eq!(job.get_status().unwrap(), IngestStatus::Completed);
        let result = job.result.expect("completed job has a result summary");
        assert!(!result.is_empty());
        assert!(job.failure_stage.is_none());

        // Document status moved in lockstep
        let document = meta.get_document(document_id).await.unwrap().unwrap();
        assert_eq!(document.get_status().unwrap(), IngestStatus::Completed);

        // Upload artifact is gone
        assert!(!upload_path.exists());

        // One record per chunk, chunk ids 0..k, vectors of the embedder's
        // dimension
        let records = store.records.lock().await;
        assert_eq!(records.len(), expected_chunks);
        let mut chunk_ids: Vec<i32> = records.iter().map(|r| r.chunk_id).collect();
        chunk_ids.sort_unstable();
        assert_eq!(chunk_ids, (0..expected_chunks as i32).collect::<Vec<_>>());
        for record in records.iter() {
            assert_eq!(record.vector.len(), 8);
            assert_eq!(record.filename, "fox.txt");
            assert_eq!(record.collection_id, collection_id.to_string());
        }
    }

    #[tokio::test]
    async fn test_embedder_failure_marks_both_failed() {
        let tmp = TempDir::new().unwrap();
        let (meta, collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(8).failing());
        let store = Arc::new(RecordingStore::default());
        let config = test_config(2);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder as Arc<dyn Embedder>,
            store.clone() as Arc<dyn VectorStore>,
            &config,
        );

        let (job_id, document_id, upload_path) = submit_document(
            &meta,
            &coordinator,
            tmp.path(),
            collection_id,
            "broken.txt",
            "Some content that will fail to embed.",
        )
        .await;

        let job = wait_terminal(&meta, &job_id).await;
        assert_eq!(job.get_status().unwrap(), IngestStatus::Failed);
        assert!(job.result.unwrap().contains("model exploded"));
        assert_eq!(job.failure_stage.as_deref(), Some("embed"));

        let document = meta.get_document(document_id).await.unwrap().unwrap();
        assert_eq!(document.get_status().unwrap(), IngestStatus::Failed);

        // Cleanup still happened and nothing reached the store
        assert!(!upload_path.exists());
        assert!(store.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_marks_both_failed() {
        let tmp = TempDir::new().unwrap();
        let (meta, collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(8));
        let store = Arc::new(RecordingStore::failing());
        let config = test_config(2);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder as Arc<dyn Embedder>,
            store as Arc<dyn VectorStore>,
            &config,
        );

        let (job_id, document_id, upload_path) = submit_document(
            &meta,
            &coordinator,
            tmp.path(),
            collection_id,
            "unstored.txt",
            "Content that embeds fine but cannot be stored.",
        )
        .await;

        let job = wait_terminal(&meta, &job_id).await;
        assert_eq!(job.get_status().unwrap(), IngestStatus::Failed);
        assert!(job.result.unwrap().contains("vector store unavailable"));
        assert_eq!(job.failure_stage.as_deref(), Some("store"));

        let document = meta.get_document(document_id).await.unwrap().unwrap();
        assert_eq!(document.get_status().unwrap(), IngestStatus::Failed);
        assert!(!upload_path.exists());
    }

    #[tokio::test]
    async fn test_concurrency_bound_respected() {
        let tmp = TempDir::new().unwrap();
        let (meta, collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(4).with_delay(Duration::from_millis(50)));
        let store = Arc::new(RecordingStore::default());
        let config = test_config(1);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder.clone() as Arc<dyn Embedder>,
            store as Arc<dyn VectorStore>,
            &config,
        );

        let (first_job, ..) = submit_document(
            &meta,
            &coordinator,
            tmp.path(),
            collection_id,
            "first.txt",
            "First document body.",
        )
        .await;
        let (second_job, ..) = submit_document(
            &meta,
            &coordinator,
            tmp.path(),
            collection_id,
            "second.txt",
            "Second document body.",
        )
        .await;

        let first = wait_terminal(&meta, &first_job).await;
        let second = wait_terminal(&meta, &second_job).await;
        assert_eq!(first.get_status().unwrap(), IngestStatus::Completed);
        assert_eq!(second.get_status().unwrap(), IngestStatus::Completed);

        // With one permit the pipeline bodies never overlapped
        assert_eq!(embedder.observed_max_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_zero_chunk_document_completes() {
        let tmp = TempDir::new().unwrap();
        let (meta, collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(4));
        let store = Arc::new(RecordingStore::default());
        let config = test_config(2);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder as Arc<dyn Embedder>,
            store.clone() as Arc<dyn VectorStore>,
            &config,
        );

        let (job_id, _document_id, upload_path) = submit_document(
            &meta,
            &coordinator,
            tmp.path(),
            collection_id,
            "blank.txt",
            "   \n\n  ",
        )
        .await;

        let job = wait_terminal(&meta, &job_id).await;
        assert_eq!(job.get_status().unwrap(), IngestStatus::Completed);
        assert!(job.result.unwrap().contains("no chunks"));
        assert!(store.records.lock().await.is_empty());
        assert!(!upload_path.exists());
    }

    #[tokio::test]
    async fn test_missing_upload_fails_at_read_stage() {
        let tmp = TempDir::new().unwrap();
        let (meta, collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(4));
        let store = Arc::new(RecordingStore::default());
        let config = test_config(2);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder as Arc<dyn Embedder>,
            store as Arc<dyn VectorStore>,
            &config,
        );

        let upload_path = tmp.path().join("vanished.txt");
        let document_id = meta
            .create_document(
                "vanished.txt",
                IngestStatus::Queued,
                upload_path.to_str().unwrap(),
                collection_id,
            )
            .await
            .unwrap();
        let job = Job::new("vanished.txt".to_string());
        meta.create_job(&job).await.unwrap();

        coordinator
            .submit(IngestRequest {
                job_id: job.id.clone(),
                document_id,
                upload_path,
            })
            .unwrap();

        let job = wait_terminal(&meta, &job.id).await;
        assert_eq!(job.get_status().unwrap(), IngestStatus::Failed);
        assert_eq!(job.failure_stage.as_deref(), Some("read"));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_errors() {
        let tmp = TempDir::new().unwrap();
        let (meta, _collection_id) = setup_db(&tmp).await;
        let embedder = Arc::new(StubEmbedder::new(4));
        let store = Arc::new(RecordingStore::default());
        let config = test_config(2);
        let coordinator = IngestCoordinator::new(
            meta.clone(),
            embedder as Arc<dyn Embedder>,
            store as Arc<dyn VectorStore>,
            &config,
        );

        coordinator.shutdown();

        let err = coordinator
            .submit(IngestRequest {
                job_id: "ignored".to_string(),
                document_id: 1,
                upload_path: tmp.path().join("ignored.txt"),
            })
            .unwrap_err();
        assert!(matches!(err, Error::Scheduling(_)));
    }
}

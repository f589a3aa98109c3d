//! Ingest command implementation
//!
//! This is the submission boundary in front of the coordinator: it
//! persists the document row and the initial job row, hands the upload
//! artifact over, and then polls the job record until it reaches a
//! terminal state.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::{IngestCoordinator, IngestRequest};
use crate::meta::{IngestStatus, Job, MetaDb};
use crate::progress::job_spinner;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Accept an uploaded file into a collection and schedule it for
/// background ingestion. Returns the job id for later polling.
pub async fn cmd_ingest(
    config: &Config,
    db: &MetaDb,
    coordinator: &IngestCoordinator,
    source: &Path,
    collection_name: &str,
) -> Result<String> {
    if !source.is_file() {
        return Err(Error::InvalidPath(source.display().to_string()));
    }

    let mime = mime_guess::from_path(source).first_or_text_plain();
    if mime.type_() != mime_guess::mime::TEXT && mime != mime_guess::mime::APPLICATION_JSON {
        return Err(Error::UnsupportedContentType(mime.to_string()));
    }

    let collection = db
        .get_collection_by_name(collection_name)
        .await?
        .ok_or_else(|| Error::CollectionNotFound(collection_name.to_string()))?;

    let filename = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(source.display().to_string()))?
        .to_string();

    // Materialize the upload under our own directory; the job owns and
    // deletes this copy
    std::fs::create_dir_all(&config.paths.uploads_dir)?;
    let upload_path = config
        .paths
        .uploads_dir
        .join(format!("{}-{}", Uuid::new_v4(), filename));
    tokio::fs::copy(source, &upload_path).await?;

    let upload_path_str = upload_path
        .to_str()
        .ok_or_else(|| Error::InvalidPath(upload_path.display().to_string()))?
        .to_string();

    // Both rows must be durable before the coordinator sees the request
    let document_id = match db
        .create_document(
            &filename,
            IngestStatus::Queued,
            &upload_path_str,
            collection.id,
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            let _ = tokio::fs::remove_file(&upload_path).await;
            return Err(e);
        }
    };

    let job = Job::new(filename.clone());
    if let Err(e) = db.create_job(&job).await {
        let _ = tokio::fs::remove_file(&upload_path).await;
        return Err(e);
    }

    let request = IngestRequest {
        job_id: job.id.clone(),
        document_id,
        upload_path: upload_path.clone(),
    };
    if let Err(e) = coordinator.submit(request) {
        let _ = tokio::fs::remove_file(&upload_path).await;
        return Err(e);
    }

    info!(
        job_id = %job.id,
        filename = %filename,
        "Accepted upload into collection '{}'", collection_name
    );
    Ok(job.id)
}

/// Poll a job until it reaches a terminal state
pub async fn wait_for_job(db: &MetaDb, job_id: &str) -> Result<Job> {
    let spinner = job_spinner(format!("Processing job {}", job_id));

    loop {
        let job = db
            .get_job(job_id)
            .await?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

        if job.get_status()?.is_terminal() {
            spinner.finish_and_clear();
            return Ok(job);
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Print a finished job's outcome
pub fn print_job_outcome(job: &Job) {
    match job.get_status() {
        Ok(IngestStatus::Completed) => {
            println!("✓ Job {} completed", job.id);
            if let Some(ref result) = job.result {
                println!("  {}", result);
            }
        }
        Ok(IngestStatus::Failed) => {
            println!("✗ Job {} failed", job.id);
            if let Some(ref stage) = job.failure_stage {
                println!("  stage: {}", stage);
            }
            if let Some(ref result) = job.result {
                println!("  {}", result);
            }
        }
        _ => println!("Job {} is {}", job.id, job.status),
    }
}

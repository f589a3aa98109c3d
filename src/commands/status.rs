//! Status command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::{GlobalStats, Job, MetaDb};
use crate::store::QdrantStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub qdrant_url: String,
    pub qdrant_collection: String,
    pub embedding_model: String,
    pub qdrant_connected: bool,
    pub collection_exists: bool,
    pub qdrant_points: usize,
    pub db_stats: GlobalStats,
}

/// Get one job by id
pub async fn cmd_job_status(db: &MetaDb, job_id: &str) -> Result<Job> {
    db.get_job(job_id)
        .await?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
}

/// List all jobs, newest first
pub async fn cmd_list_jobs(db: &MetaDb) -> Result<Vec<Job>> {
    db.list_jobs().await
}

/// Print a job listing to console
pub fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("No jobs yet.");
        return;
    }

    println!("\nJobs:\n");
    for job in jobs {
        println!("  {} [{}] {}", job.id, job.status, job.filename);
    }
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb, store: &QdrantStore) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    // Check if we can connect to Qdrant and if the collection exists
    let (qdrant_connected, collection_exists, qdrant_points) = match store.collection_exists().await
    {
        Ok(true) => match store.get_stats().await {
            Ok(stats) => (true, true, stats.points_count),
            Err(e) => {
                tracing::debug!("Qdrant stats error: {:?}", e);
                (true, true, 0)
            }
        },
        Ok(false) => (true, false, 0),
        Err(e) => {
            tracing::debug!("Qdrant connection error: {:?}", e);
            (false, false, 0)
        }
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        qdrant_url: config.qdrant_url.clone(),
        qdrant_collection: config.qdrant_collection.clone(),
        embedding_model: config.embedding.model.clone(),
        qdrant_connected,
        collection_exists,
        qdrant_points,
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\nintellidoc status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {}", status.qdrant_collection);

    let connection_status = if status.qdrant_connected {
        if status.collection_exists {
            "✓ Connected"
        } else {
            "⚠ Connected (collection not created yet - run 'intellidoc ingest' to create)"
        }
    } else {
        "✗ Not connected"
    };
    println!("  Status: {}", connection_status);
    println!("  Points: {}", status.qdrant_points);
    println!("\nEmbedding Model: {}", status.embedding_model);
    println!("\nDatabase:");
    println!("  Collections: {}", status.db_stats.collection_count);
    println!("  Documents: {}", status.db_stats.document_count);
    println!(
        "  Jobs: {} queued, {} processing, {} completed, {} failed",
        status.db_stats.jobs_queued,
        status.db_stats.jobs_processing,
        status.db_stats.jobs_completed,
        status.db_stats.jobs_failed
    );
}

/// Print one job record
pub fn print_job(job: &Job) {
    println!("\nJob {}\n", job.id);
    println!("  File: {}", job.filename);
    println!("  Status: {}", job.status);
    if let Some(ref stage) = job.failure_stage {
        println!("  Failed at: {}", stage);
    }
    if let Some(ref result) = job.result {
        println!("  Result: {}", result);
    }
    println!("  Created: {}", job.created_at);
    println!("  Updated: {}", job.updated_at);
}

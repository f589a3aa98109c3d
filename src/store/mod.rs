//! Qdrant vector database integration
//!
//! This module wraps the Qdrant client behind a [`VectorStore`] trait and
//! provides collection management and batch append of embedding records.

mod payload;

pub use payload::*;

use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, ScalarQuantizationBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

/// Durable, append-only store of embedding records.
///
/// `add` appends a batch as a whole; there are no partial-batch semantics
/// and the adapter does not deduplicate, so callers must not submit the
/// same chunk set twice within one job.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Durably append a batch of embedding records
    async fn add(&self, records: Vec<EmbeddingRecord>) -> Result<()>;
}

/// Qdrant store handle
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

/// Collection statistics
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub collection: String,
    pub points_count: usize,
}

impl QdrantStore {
    /// Create a new store connection with URL and collection name
    pub async fn new(url: &str, collection: &str, dimension: usize) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            dimension,
        })
    }

    /// Ensure the collection exists with the configured dimension
    pub async fn ensure_collection(&self) -> Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;

        if exists {
            debug!("Collection {} already exists", self.collection);
            return Ok(());
        }

        info!(
            "Creating collection {} with dimension {}",
            self.collection, self.dimension
        );

        let vectors_config = VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors_config)
                    .quantization_config(ScalarQuantizationBuilder::default()),
            )
            .await?;

        info!("Collection {} created successfully", self.collection);
        Ok(())
    }

    /// Check if the collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        let exists = self.client.collection_exists(&self.collection).await?;
        Ok(exists)
    }

    /// Get collection statistics
    pub async fn get_stats(&self) -> Result<CollectionStats> {
        let info = self.client.collection_info(&self.collection).await?;

        let points_count = info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0);

        Ok(CollectionStats {
            collection: self.collection.clone(),
            points_count: points_count as usize,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add(&self, records: Vec<EmbeddingRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        if let Some(mismatch) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(Error::Qdrant(format!(
                "Vector dimension mismatch for collection '{}': expected {} (got {})",
                self.collection,
                self.dimension,
                mismatch.vector.len()
            )));
        }

        // The collection is created lazily so that a fresh install works
        // without a separate bootstrap step
        self.ensure_collection().await?;

        debug!(
            "Appending {} records to collection {}",
            records.len(),
            self.collection
        );

        let points = records
            .into_iter()
            .map(|r| r.to_point_struct())
            .collect::<Vec<_>>();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await?;

        Ok(())
    }
}

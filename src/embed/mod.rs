//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - A fastembed-based local backend (feature `local-embed`)
//! - Batch processing for efficiency

#[cfg(feature = "local-embed")]
mod fastembed_impl;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Trait for embedding providers.
///
/// Implementations must preserve order and return exactly one vector of
/// `dimension()` length per input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
#[cfg(feature = "local-embed")]
pub fn create_embedder(config: &crate::config::EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder = FastEmbedder::new(config)?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "local-embed"))]
pub fn create_embedder(_config: &crate::config::EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    Err(crate::error::Error::Embedding(
        "No embedding backend compiled in; enable the 'local-embed' feature".to_string(),
    ))
}

/// Helper to embed in batches
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let batch_texts: Vec<String> = chunk.to_vec();
        let embeddings = embedder.embed(batch_texts).await?;
        all_embeddings.extend(embeddings);
    }

    Ok(all_embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct CountingEmbedder {
        batches: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            self.batches
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if texts.is_empty() {
                return Err(Error::Embedding("empty batch".to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[tokio::test]
    async fn test_embed_in_batches_splits_and_preserves_count() {
        let embedder = CountingEmbedder {
            batches: std::sync::atomic::AtomicUsize::new(0),
        };
        let texts: Vec<String> = (0..10).map(|i| format!("text {}", i)).collect();

        let embeddings = embed_in_batches(&embedder, texts, 3).await.unwrap();

        assert_eq!(embeddings.len(), 10);
        assert_eq!(
            embedder.batches.load(std::sync::atomic::Ordering::SeqCst),
            4 // 3 + 3 + 3 + 1
        );
    }
}

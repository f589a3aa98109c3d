//! Default values for configuration

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default Qdrant collection name holding all embedding records
pub fn default_qdrant_collection() -> String {
    "documents".to_string()
}

/// Default embedding model
pub fn default_embedding_model() -> String {
    "BAAI/bge-base-en-v1.5".to_string()
}

/// Default embedding dimension (matches the default model)
pub fn default_embedding_dimension() -> usize {
    768
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default maximum characters per chunk
pub fn default_chunk_size() -> usize {
    512
}

/// Default overlap characters between chunks
pub fn default_chunk_overlap() -> usize {
    50
}

/// Default number of documents embedded concurrently
pub fn default_max_concurrent_jobs() -> usize {
    2
}

/// Default deadline for one document's embedding step, in seconds
pub fn default_embed_timeout_secs() -> u64 {
    300
}

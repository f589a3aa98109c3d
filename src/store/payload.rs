//! Payload schema for Qdrant points

use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One embedded chunk ready to be appended to the vector store.
///
/// Everything except the vector itself is stored as point payload so that
/// query results can be filtered by collection and traced back to their
/// source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// The embedding vector (fixed dimension)
    #[serde(skip)]
    pub vector: Vec<f32>,

    /// The chunk text
    pub text: String,

    /// Source document filename
    pub filename: String,

    /// Chunk position within the document (0-based)
    pub chunk_id: i32,

    /// Owning collection, stored as a string for payload filtering
    pub collection_id: String,

    /// Seconds since the Unix epoch when the record was created
    pub timestamp: f64,
}

impl EmbeddingRecord {
    /// Stable point id derived from filename and chunk position, so
    /// re-ingesting the same document overwrites rather than duplicates
    pub fn point_id(&self) -> Uuid {
        let key = format!("{}:{}", self.filename, self.chunk_id);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        let id = self.point_id().to_string();
        let mut payload = HashMap::new();

        payload.insert("text".to_string(), string_to_qdrant(&self.text));
        payload.insert("filename".to_string(), string_to_qdrant(&self.filename));
        payload.insert("chunk_id".to_string(), int_to_qdrant(self.chunk_id as i64));
        payload.insert(
            "collection_id".to_string(),
            string_to_qdrant(&self.collection_id),
        );
        payload.insert("timestamp".to_string(), double_to_qdrant(self.timestamp));

        PointStruct::new(id, self.vector, payload)
    }
}

fn string_to_qdrant(s: &str) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::StringValue(
            s.to_string(),
        )),
    }
}

fn int_to_qdrant(i: i64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::IntegerValue(i)),
    }
}

fn double_to_qdrant(d: f64) -> QdrantValue {
    QdrantValue {
        kind: Some(qdrant_client::qdrant::value::Kind::DoubleValue(d)),
    }
}

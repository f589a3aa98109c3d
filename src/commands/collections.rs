//! Collection management commands

use crate::error::Result;
use crate::meta::{Collection, MetaDb};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Collection information with document count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub document_count: usize,
}

/// Create a new collection; duplicate names surface a conflict error
pub async fn cmd_create_collection(db: &MetaDb, name: &str) -> Result<Collection> {
    info!("Creating collection '{}'", name);
    db.create_collection(name).await
}

/// List collections with their document counts
pub async fn cmd_list_collections(db: &MetaDb) -> Result<Vec<CollectionInfo>> {
    let collections = db.list_collections().await?;
    let mut result = Vec::with_capacity(collections.len());

    for collection in collections {
        let document_count = db.count_documents(collection.id).await?;
        result.push(CollectionInfo {
            id: collection.id,
            name: collection.name,
            created_at: collection.created_at,
            document_count,
        });
    }

    Ok(result)
}

/// Print collections to console
pub fn print_collections(collections: &[CollectionInfo]) {
    if collections.is_empty() {
        println!("No collections yet. Create one with 'intellidoc collections create <name>'");
        return;
    }

    println!("\nCollections:\n");
    for collection in collections {
        println!(
            "  [{}] {} ({} documents, created {})",
            collection.id, collection.name, collection.document_count, collection.created_at
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::meta::IngestStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_list_collections() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();

        let collection = cmd_create_collection(&db, "demo").await.unwrap();
        db.create_document("a.txt", IngestStatus::Queued, "/tmp/a", collection.id)
            .await
            .unwrap();

        let listed = cmd_list_collections(&db).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "demo");
        assert_eq!(listed[0].document_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_collection_is_a_conflict() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("meta.db")).await.unwrap();

        cmd_create_collection(&db, "demo").await.unwrap();
        let err = cmd_create_collection(&db, "demo").await.unwrap_err();
        assert!(matches!(err, Error::CollectionExists(_)));
    }
}

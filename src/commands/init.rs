//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::store::QdrantStore;
use std::path::PathBuf;
use tracing::{info, warn};

/// Initialize configuration, the metadata database, and the vector
/// collection
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let config = Config::with_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::AlreadyInitialized(
            config.paths.config_file.display().to_string(),
        ));
    }

    config.save()?;
    std::fs::create_dir_all(&config.paths.uploads_dir)?;

    // Opening the database applies the schema
    MetaDb::new(&config.paths.db_file).await?;
    info!("Metadata database ready at {:?}", config.paths.db_file);

    let store = QdrantStore::new(
        &config.qdrant_url,
        &config.qdrant_collection,
        config.embedding.resolved_dimension(),
    )
    .await?;
    match store.ensure_collection().await {
        Ok(()) => info!("Qdrant collection '{}' ready", config.qdrant_collection),
        Err(e) => warn!(
            "Qdrant not reachable ({}); the collection will be created on first ingest",
            e
        ),
    }

    Ok(config)
}

/// Print a summary of the initialized layout
pub fn print_init_summary(config: &Config) {
    println!("✓ Initialized intellidoc");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Database: {}", config.paths.db_file.display());
    println!("  Uploads: {}", config.paths.uploads_dir.display());
    println!(
        "  Qdrant: {} (collection '{}')",
        config.qdrant_url, config.qdrant_collection
    );
}

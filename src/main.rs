//! intellidoc CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use intellidoc::{
    commands::{
        cmd_create_collection, cmd_ingest, cmd_init, cmd_job_status, cmd_list_collections,
        cmd_list_jobs, cmd_status, print_collections, print_init_summary, print_job,
        print_job_outcome, print_jobs, print_status, wait_for_job,
    },
    config::Config,
    embed::create_embedder,
    error::{Error, Result},
    ingest::IngestCoordinator,
    meta::MetaDb,
    progress::LogWriterFactory,
    store::QdrantStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "intellidoc")]
#[command(version, about = "Ingest documents into a local vector search index", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize intellidoc configuration and databases
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Manage document collections
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },

    /// Upload a document into a collection and wait for ingestion
    Ingest {
        /// Path to the document
        file: PathBuf,

        /// Target collection name
        #[arg(short = 'C', long)]
        collection: String,
    },

    /// Show one job by id, or the system overview
    Status {
        /// Job id to inspect
        job_id: Option<String>,
    },

    /// List ingestion jobs, newest first
    Jobs,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// Create a new collection
    Create {
        /// Collection name (unique)
        name: String,
    },

    /// List collections
    List,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(LogWriterFactory::default()))
        .with(filter)
        .init();

    // Handle init command specially (doesn't need existing config)
    if let Commands::Init { force } = cli.command {
        let base_dir = cli
            .config
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);
        let config = cmd_init(base_dir, force).await?;
        print_init_summary(&config);
        return Ok(());
    }

    // Handle completions command (doesn't need config/db/store)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "intellidoc", &mut std::io::stdout());
        return Ok(());
    }

    // Load configuration
    let config = match cli.config.as_deref() {
        Some(path) => Config::load(path)?,
        None => Config::load_from(None)?,
    };

    if !config.is_initialized() {
        return Err(Error::NotInitialized);
    }

    // Initialize components
    let db = MetaDb::new(&config.paths.db_file).await?;
    let store = QdrantStore::new(
        &config.qdrant_url,
        &config.qdrant_collection,
        config.embedding.resolved_dimension(),
    )
    .await?;

    // Handle commands
    match cli.command {
        Commands::Init { .. } | Commands::Completions { .. } => unreachable!(),

        Commands::Collections { action } => match action {
            CollectionsAction::Create { name } => {
                let collection = cmd_create_collection(&db, &name).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&collection)?);
                } else {
                    println!(
                        "✓ Created collection '{}' (id {})",
                        collection.name, collection.id
                    );
                }
            }
            CollectionsAction::List => {
                let collections = cmd_list_collections(&db).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&collections)?);
                } else {
                    print_collections(&collections);
                }
            }
        },

        Commands::Ingest { file, collection } => {
            let embedder = create_embedder(&config.embedding)?;
            let coordinator =
                IngestCoordinator::new(db.clone(), embedder, Arc::new(store), &config);

            let job_id = cmd_ingest(&config, &db, &coordinator, &file, &collection).await?;
            let job = wait_for_job(&db, &job_id).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&job)?);
            } else {
                print_job_outcome(&job);
            }
        }

        Commands::Jobs => {
            let jobs = cmd_list_jobs(&db).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else {
                print_jobs(&jobs);
            }
        }

        Commands::Status { job_id } => {
            if let Some(job_id) = job_id {
                let job = cmd_job_status(&db, &job_id).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&job)?);
                } else {
                    print_job(&job);
                }
            } else {
                let status = cmd_status(&config, &db, &store).await?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&status)?);
                } else {
                    print_status(&status);
                }
            }
        }
    }

    Ok(())
}

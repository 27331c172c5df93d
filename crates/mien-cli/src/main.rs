use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mien_core::detector::{spawn_detector, FaceDetector, RemoteDetector};
use mien_engine::{Config, IngestOutcome, IngestPipeline, SearchEngine};
use mien_store::Store;

#[derive(Parser)]
#[command(name = "mien", about = "Photo ingestion and face-similarity search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a single image or a folder of images
    Ingest {
        /// Image file or folder
        path: PathBuf,
        /// Event tag applied to the ingested photos
        #[arg(short, long)]
        tag: Option<String>,
        /// Do not recurse into subfolders
        #[arg(long)]
        flat: bool,
    },
    /// Search the corpus with a query image
    Search {
        /// Query image file
        image: PathBuf,
        /// Maximum number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Minimum similarity in [0, 1]
        #[arg(short = 's', long)]
        threshold: Option<f32>,
        /// Only match photos with this event tag
        #[arg(short, long)]
        tag: Option<String>,
    },
    /// Re-derive the stored faces of every photo
    Reprocess,
    /// Show corpus statistics
    Stats,
    /// List stored photos
    List {
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Remove a photo and its faces
    Remove {
        /// Photo ID to remove
        id: String,
    },
    /// Set or clear a photo's event tag
    Tag {
        /// Photo ID
        id: String,
        /// New tag; omit to clear
        tag: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let store = Store::open(&config.db_path).await?;
    let detector = spawn_detector({
        let endpoint = config.detector_endpoint.clone();
        let timeout = Duration::from_secs(config.detector_timeout_secs);
        Box::new(move || {
            let backend = RemoteDetector::connect(&endpoint, timeout)?;
            Ok(Box::new(backend) as Box<dyn FaceDetector>)
        })
    });

    match cli.command {
        Commands::Ingest { path, tag, flat } => {
            std::fs::create_dir_all(&config.images_root).with_context(|| {
                format!("creating images root {}", config.images_root.display())
            })?;
            let pipeline = IngestPipeline::new(
                store,
                detector,
                config.images_root.clone(),
                config.faces_per_photo,
            );
            if path.is_dir() {
                let summary = pipeline.ingest_folder(&path, !flat, tag.as_deref()).await;
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                match pipeline.ingest_one(&path, tag.as_deref()).await? {
                    IngestOutcome::Ingested { photo_id, faces } => {
                        println!("ingested {photo_id} ({faces} faces)")
                    }
                    IngestOutcome::SkippedDuplicate => println!("skipped: duplicate content"),
                    IngestOutcome::SkippedNoFace => println!("skipped: no face detected"),
                }
            }
        }
        Commands::Search {
            image,
            top_k,
            threshold,
            tag,
        } => {
            let bytes =
                std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let engine = SearchEngine::new(store, detector);
            let response = engine
                .search(
                    bytes,
                    top_k.unwrap_or(config.default_top_k),
                    threshold.unwrap_or(config.default_threshold),
                    tag.as_deref(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Reprocess => {
            let pipeline = IngestPipeline::new(
                store,
                detector,
                config.images_root.clone(),
                config.faces_per_photo,
            );
            let summary = pipeline.reprocess_all().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Stats => {
            let stats = store.stats().await?;
            println!("photos:     {}", stats.photos);
            println!("faces:      {}", stats.faces);
            let tags = if stats.event_tags.is_empty() {
                "(none)".to_string()
            } else {
                stats.event_tags.join(", ")
            };
            println!("event tags: {tags}");
        }
        Commands::List { limit, offset } => {
            for entry in store.list_photos(limit, offset).await? {
                println!(
                    "{}  {}  faces={}  tag={}",
                    entry.photo.id,
                    entry.photo.path,
                    entry.face_count,
                    entry.photo.event_tag.as_deref().unwrap_or("-"),
                );
            }
        }
        Commands::Remove { id } => {
            store.delete_photo(&id).await?;
            println!("removed {id}");
        }
        Commands::Tag { id, tag } => {
            store.set_event_tag(&id, tag.as_deref()).await?;
            println!("updated {id}");
        }
    }

    Ok(())
}

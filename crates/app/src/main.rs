use clap::{Parser, Subcommand};
use course_search_core::{
    CourseContent, Embedder, HashEmbedder, HttpEmbedder, HybridSearcher, IngestionPipeline,
    IngestionReport, LocalVectorStore, MetaValue, Metadata, SearchConfig, VectorIndex,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "course-search", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persistent vector collection.
    #[arg(long, default_value = "./search-data")]
    data_dir: String,

    /// Collection name.
    #[arg(long, default_value = "course_kb")]
    collection: String,

    /// Use the deterministic local embedder instead of the remote provider.
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// API key for the embedding provider.
    #[arg(long, env = "DASHSCOPE_API_KEY")]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a file, or every supported file under a directory.
    Ingest {
        /// File or directory to ingest.
        #[arg(long)]
        path: String,
        /// Id namespace for the resulting records.
        #[arg(long, default_value = "kb")]
        prefix: String,
    },
    /// Ingest a course content tree from a JSON file.
    IngestCourse {
        /// JSON file with the course, its chapters, and lessons.
        #[arg(long)]
        file: String,
    },
    /// Query the index with fused vector and keyword scoring.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of results to return.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Restrict results to one course.
        #[arg(long)]
        course_id: Option<i64>,
        /// Weight of the keyword term in [0, 1].
        #[arg(long, default_value = "0.3")]
        keyword_boost: f64,
    },
    /// Print the record count of the collection.
    Stats,
    /// Delete a document and all of its chunks.
    Delete {
        /// Id namespace the document was ingested under.
        #[arg(long, default_value = "kb")]
        prefix: String,
        /// Document id as reported at ingestion time.
        #[arg(long)]
        doc_id: String,
    },
    /// Drop every record in the collection.
    Reset,
}

fn print_report(report: &IngestionReport) {
    println!(
        "{}/{} units indexed, {} failed",
        report.indexed_count,
        report.total,
        report.errors.len()
    );
    for failure in &report.errors {
        println!("  failed: {} ({})", failure.id, failure.reason);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = SearchConfig::default();
    config.embedding.api_key = cli.api_key.clone();

    let embedder: Arc<dyn Embedder> = if cli.offline {
        Arc::new(HashEmbedder::default())
    } else {
        Arc::new(HttpEmbedder::new(&config.embedding))
    };

    let store = Arc::new(LocalVectorStore::open(
        &cli.data_dir,
        &cli.collection,
        embedder.model_name(),
        embedder.dimension(),
    )?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        collection = %cli.collection,
        model = embedder.model_name(),
        "course-search boot"
    );

    match cli.command {
        Command::Ingest { path, prefix } => {
            let pipeline = IngestionPipeline::new(embedder, store, config)?;
            let target = Path::new(&path);
            let report = if target.is_dir() {
                pipeline.ingest_folder(target, &prefix).await?
            } else {
                let report = pipeline.ingest_document(target, &prefix).await?;
                let doc_id = pipeline.process_document(target)?.doc_id;
                println!("doc_id: {doc_id}");
                report
            };
            print_report(&report);
        }
        Command::IngestCourse { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let course: CourseContent = serde_json::from_str(&raw)?;
            let pipeline = IngestionPipeline::new(embedder, store, config)?;
            let report = pipeline.ingest_course(&course).await;
            print_report(&report);
        }
        Command::Search {
            query,
            top_k,
            course_id,
            keyword_boost,
        } => {
            let searcher = HybridSearcher::new(embedder, store, keyword_boost);

            let filter = course_id.map(|id| {
                let mut filter = Metadata::new();
                filter.insert("course_id".to_string(), MetaValue::Int(id));
                filter
            });

            let results = searcher.try_retrieve(&query, top_k, filter.as_ref()).await?;
            if results.is_empty() {
                println!("no results");
            }
            for result in results {
                println!(
                    "[{}] score={:.4} vector={:.4} keyword={:.4}",
                    result.id, result.score, result.vector_score, result.keyword_score
                );
                let preview: String = result.content.chars().take(200).collect();
                println!("  {preview}");
            }
        }
        Command::Stats => {
            println!("records: {}", store.count().await?);
        }
        Command::Delete { prefix, doc_id } => {
            let pipeline = IngestionPipeline::new(embedder, store, config)?;
            let removed = pipeline.delete_document(&prefix, &doc_id).await?;
            println!("removed {removed} records");
        }
        Command::Reset => {
            store.reset().await?;
            println!("collection reset");
        }
    }

    Ok(())
}

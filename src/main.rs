//! Thin demonstration binary over the `context_harness` retrieval core.
//!
//! A CLI front end is explicitly out of scope for this crate beyond this
//! demonstration surface (spec.md Non-goals); it exists to exercise the
//! [`Admission`] and [`Search`] capability ports end to end, not as a
//! product CLI.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use context_harness::config;
use context_harness::ports::{Admission, Engine, Search};
use context_harness::progress::ProgressMode;
use context_harness::search::{Query, SearchMode, SearchOptions};
use context_harness::store::{MetadataFilter, Store};

#[derive(Parser)]
#[command(
    name = "ctx",
    about = "A local-first personal knowledge engine: content-addressed ingestion and hybrid retrieval",
    version
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "./config/engine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Ingest every file under `root` (content-addressed, resumable)
    Sync {
        root: PathBuf,

        /// Resume (or start) a specific checkpoint run id
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Search the indexed collection
    Search {
        query: String,

        /// hybrid, semantic, or keyword
        #[arg(long, default_value = "hybrid")]
        mode: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        rerank: bool,
    },

    /// Retrieve a document by id
    Get { doc_id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            context_harness::migrate::run_migrations(&cfg).await?;
            println!("Database initialized.");
        }
        Commands::Sync { root, run_id } => {
            let engine = Engine::open(cfg).await?;
            let reporter: Arc<dyn context_harness::progress::ProgressReporter> =
                Arc::from(ProgressMode::default_for_tty().reporter());
            let summary = engine
                .ingest(&root, run_id, reporter, Arc::new(AtomicBool::new(false)))
                .await?;
            println!(
                "admitted: {}, skipped_unchanged: {}, duplicates: {}, linked: {}, failed: {}",
                summary.admitted,
                summary.skipped_unchanged,
                summary.duplicates,
                summary.linked,
                summary.failed.len()
            );
            for failure in &summary.failed {
                eprintln!("  failed: {} ({}): {}", failure.path, failure.category, failure.message);
            }
        }
        Commands::Search { query, mode, limit, rerank } => {
            let engine = Engine::open(cfg.clone()).await?;
            let mut options = SearchOptions::from_config(&cfg.retrieval);
            options.mode = SearchMode::parse(&mode)?;
            if let Some(limit) = limit {
                options.limit = limit;
            }
            options.rerank = options.rerank || rerank;

            let results = Search::search(
                &engine,
                Query { text: query, filter: MetadataFilter::default() },
                options,
                Arc::new(AtomicBool::new(false)),
            )
            .await?;

            if results.is_empty() {
                println!("No results.");
            }
            for hit in results {
                println!("id: {}  score: {:.4}", hit.chunk_id, hit.score);
                println!("  doc: {}", hit.doc_id);
                if let Some(title) = &hit.title {
                    println!("  title: {title}");
                }
                println!("  source: {}", hit.citation.source_path);
                if !hit.citation.section_path.is_empty() {
                    println!("  section: {}", hit.citation.section_path.join(" > "));
                }
                println!("  text: {}", truncate(&hit.text, 240));
                println!();
            }
        }
        Commands::Get { doc_id } => {
            let engine = Engine::open(cfg).await?;
            match engine.store().get_document(&doc_id).await? {
                Some(doc) => {
                    println!("Document {}", doc.doc_id);
                    println!("  source: {}", doc.source_path);
                    println!("  format: {}", doc.format);
                    println!("  chunks: {}", doc.chunk_count);
                    let chunks = engine.store().get_chunks(&doc_id).await?;
                    for chunk in chunks {
                        println!("  [{}] {}", chunk.ordinal, truncate(&chunk.text, 160));
                    }
                }
                None => {
                    anyhow::bail!("document not found: {doc_id}");
                }
            }
        }
    }

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('\u{2026}');
    }
    out
}

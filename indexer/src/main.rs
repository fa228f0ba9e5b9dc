use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use sieve_core::tokenizer::analyze;
use sieve_core::{build_index, IndexConfig, SearchIndex};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sieve-indexer")]
#[command(about = "Build and query a deduplicated TF-IDF inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// Index directory
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Index crawled pages (.json / .jsonl) into a merged posting store
    Build {
        #[command(flatten)]
        common: ConfigArgs,
        /// Directory of crawled pages
        #[arg(long)]
        input: Option<PathBuf>,
        /// Accepted documents per partial-index batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// Maximum differing SimHash bits for a near duplicate
        #[arg(long)]
        threshold: Option<u32>,
    },
    /// Run a query against a built index and print matching URLs
    Query {
        #[command(flatten)]
        common: ConfigArgs,
        /// Maximum number of results
        #[arg(long)]
        k: Option<usize>,
        /// Query text
        #[arg(required = true)]
        query: Vec<String>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { common, input, batch_size, threshold } => {
            let mut config = load_config(&common)?;
            if let Some(input) = input {
                config.input_dir = input;
            }
            if let Some(n) = batch_size {
                config.batch_size = n;
            }
            if let Some(t) = threshold {
                config.near_duplicate_threshold = t;
            }
            let config = config.sanitized();

            tracing::info!(
                input = %config.input_dir.display(),
                output = %config.output_dir.display(),
                batch_size = config.batch_size,
                threshold = config.near_duplicate_threshold,
                "starting index build"
            );
            let start = Instant::now();
            let stats = build_index(&config)?;
            tracing::info!(elapsed_s = start.elapsed().as_secs_f64(), "indexer finished");
            println!(
                "indexed {} documents, {} terms in {:.2}s -> {}",
                stats.documents,
                stats.terms,
                start.elapsed().as_secs_f64(),
                config.output_dir.display()
            );
            Ok(())
        }
        Commands::Query { common, k, query } => {
            let mut config = load_config(&common)?;
            if let Some(k) = k {
                config.max_results = k;
            }
            let index = SearchIndex::open(&config)?;

            let start = Instant::now();
            let terms = analyze(&query.join(" "));
            let hits = index.search(&terms);
            let elapsed = start.elapsed();
            tracing::info!(terms = ?terms, hits = hits.len(), "query answered");
            for (rank, doc_id) in hits.iter().enumerate() {
                println!("{:>3}. [{}] {}", rank + 1, doc_id, index.doc_name(*doc_id).unwrap_or("<unknown>"));
            }
            println!("{} results in {:.1}ms", hits.len(), elapsed.as_secs_f64() * 1000.0);
            Ok(())
        }
    }
}

fn load_config(args: &ConfigArgs) -> Result<IndexConfig> {
    let mut config = match &args.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    Ok(config)
}

//! Binary entry point for tagsignal.
//!
//! This binary provides the CLI interface for the ingestion-to-signal
//! pipeline.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tagsignal::config::TagsignalConfig;
use tagsignal::io::JsonPostSource;
use tagsignal::observability;
use tagsignal::services::IngestService;
use tagsignal::{
    CorpusStore, ExportMetadata, FeatureExtractor, SharedCorpus, SignalExporter,
    storage::SCHEMA_VERSION,
};

/// Rows sampled for the per-row mean preview, matching the plot size.
const PREVIEW_SAMPLE: usize = 500;

/// Tagsignal - hashtag post ingestion and TF-IDF signal extraction.
#[derive(Parser)]
#[command(name = "tagsignal")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "TAGSIGNAL_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Ingest scraper output files, one session per file.
    Ingest {
        /// NDJSON or JSON array files.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Tag every record with this hashtag query.
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Merge other persisted corpora into the configured corpus.
    Merge {
        /// Parquet corpus files.
        #[arg(required = true)]
        other: Vec<PathBuf>,
    },

    /// Extract TF-IDF features and export them.
    Extract {
        /// Output directory (defaults to the configured signals dir).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Keep at most this many terms.
        #[arg(long)]
        max_vocab: Option<usize>,

        /// Minimum number of posts a term must appear in.
        #[arg(long)]
        min_df: Option<usize>,

        /// Longest n-gram to include.
        #[arg(long)]
        ngram_max: Option<usize>,
    },

    /// Show corpus status.
    Status,
}

/// Main entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_settings(&config.observability, cli.verbose)
    {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: TagsignalConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Ingest { files, query } => cmd_ingest(&config, files, query),
        Commands::Merge { other } => cmd_merge(&config, other),
        Commands::Extract {
            out,
            max_vocab,
            min_df,
            ngram_max,
        } => cmd_extract(config, out, max_vocab, min_df, ngram_max),
        Commands::Status => cmd_status(&config),
    }
}

/// Loads configuration.
fn load_config(path: Option<&Path>) -> Result<TagsignalConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => TagsignalConfig::load_from_file(path)?,
        None => TagsignalConfig::load_default(),
    };
    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Ingests files as parallel sessions and persists the corpus.
fn cmd_ingest(
    config: &TagsignalConfig,
    files: Vec<PathBuf>,
    query: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let corpus = CorpusStore::load_or_default(&config.corpus_path)?;
    let before = corpus.len();
    let shared = SharedCorpus::new(corpus);

    let sessions = files
        .iter()
        .map(|path| Ok((path.display().to_string(), JsonPostSource::open(path)?)))
        .collect::<tagsignal::Result<Vec<_>>>()?;

    let service = IngestService::from_config(config);
    let report = service.ingest_sessions(&shared, sessions, query.as_deref())?;

    let corpus = shared.into_inner()?;
    corpus.persist(&config.corpus_path)?;

    let total = report.total();
    for session in &report.sessions {
        println!(
            "{}: {} submitted, {} accepted, {} duplicates, {} malformed, {} merged",
            session.label,
            session.summary.submitted,
            session.summary.accepted,
            session.summary.rejected_duplicates,
            session.summary.malformed,
            session.merge.added,
        );
        for issue in &session.summary.issues {
            println!("  {issue}");
        }
    }
    for failure in &report.failures {
        println!("{}: FAILED ({})", failure.label, failure.error);
    }
    println!();
    println!(
        "Corpus: {} -> {} posts ({} submitted, {} malformed) at {}",
        before,
        corpus.len(),
        total.submitted,
        total.malformed,
        config.corpus_path.display()
    );
    if corpus.len() < config.min_posts {
        println!("Below collection target of {} posts", config.min_posts);
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        Err(format!("{} session(s) failed", report.failures.len()).into())
    }
}

/// Merges persisted corpora into the configured corpus.
fn cmd_merge(config: &TagsignalConfig, other: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut corpus = CorpusStore::load_or_default(&config.corpus_path)?;
    for path in &other {
        let incoming = CorpusStore::load(path)?;
        let report = corpus.merge(incoming);
        println!(
            "{}: {} added, {} already present",
            path.display(),
            report.added,
            report.skipped_duplicates
        );
    }
    corpus.persist(&config.corpus_path)?;
    println!("Corpus now holds {} posts", corpus.len());
    Ok(())
}

/// Extracts features and writes the signal export.
fn cmd_extract(
    mut config: TagsignalConfig,
    out: Option<PathBuf>,
    max_vocab: Option<usize>,
    min_df: Option<usize>,
    ngram_max: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(max_vocab) = max_vocab {
        config.features.max_vocab_size = Some(max_vocab);
    }
    if let Some(min_df) = min_df {
        config.features.min_df = min_df;
    }
    if let Some(ngram_max) = ngram_max {
        config.features.ngram_range.1 = ngram_max;
    }

    let corpus = CorpusStore::load(&config.corpus_path)?;
    let extractor = FeatureExtractor::new(config.features.clone());
    let (vocabulary, matrix) = extractor.extract(&corpus)?;

    let metadata = ExportMetadata::for_corpus(&corpus, &config.features);
    let signals = SignalExporter::export(&vocabulary, &matrix, metadata)?;
    let out = out.unwrap_or(config.signals_dir);
    let manifest = signals.write_to_dir(&out)?;

    let preview = matrix.sampled_row_means(PREVIEW_SAMPLE);
    let preview_mean = if preview.is_empty() {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let n = preview.len() as f64;
        preview.iter().map(|(_, mean)| mean).sum::<f64>() / n
    };

    println!("Signals written to {}", out.display());
    println!("  Snapshot: {}", manifest.metadata.snapshot_id);
    println!("  Shape: {} posts x {} terms ({} non-zero)", manifest.n_rows, manifest.n_terms, manifest.nnz);
    println!("  Mean std: {:.6}", manifest.mean_std);
    println!("  Mean 95% CI half-width: {:.6}", manifest.mean_ci95);
    println!("  Mean row weight over {} sampled rows: {preview_mean:.6}", preview.len());
    Ok(())
}

/// Prints corpus status.
fn cmd_status(config: &TagsignalConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("Tagsignal Status");
    println!("================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Schema Version: {SCHEMA_VERSION}");
    println!("Tracked Hashtags: {}", config.hashtags.join(" "));
    println!();

    if !config.corpus_path.exists() {
        println!("Corpus: Not created yet");
        println!("  Path: {}", config.corpus_path.display());
        return Ok(());
    }

    let corpus = CorpusStore::load(&config.corpus_path)?;
    println!("Corpus: {} posts (target {})", corpus.len(), config.min_posts);
    println!("  Path: {}", config.corpus_path.display());
    println!("  Snapshot: {}", corpus.snapshot_id());
    println!();
    println!("Posts per query:");
    for (query, count) in corpus.query_counts() {
        let query = if query.is_empty() { "(none)" } else { query.as_str() };
        println!("  {query}: {count}");
    }
    Ok(())
}

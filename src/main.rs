//! Binary entry point for dupfind.
//!
//! Thin command-line layer over the library: imports collaborator output into
//! the indexes and prints duplicate reports as JSON.

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

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dupfind::config::DupfindConfig;
use dupfind::models::{CONTEXT_UNARCHIVED, VectorEntry};
use dupfind::observability::{self, LoggingConfig};
use dupfind::storage::{ContentHashIndex, SqliteHashIndex};
use dupfind::{
    BackendKind, BackendSelection, ContentHasher, DuplicateResolver, FileRecord, ResolverConfig,
    SimilarityBackendFactory, VectorId,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// dupfind - exact and near-duplicate file detection.
#[derive(Parser)]
#[command(name = "dupfind")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "DUPFIND_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import file records (JSON lines) into the hash index.
    ImportRecords {
        /// Input file; reads stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Records per transaction.
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },

    /// Import `{"id": ..., "vector": [...]}` lines into the vector backend.
    ImportVectors {
        /// Input file; reads stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Backend name (overrides config).
        #[arg(short, long)]
        backend: Option<String>,

        /// Vector dimension (overrides config).
        #[arg(short, long)]
        dimensions: Option<usize>,

        /// Extend the existing artifact instead of replacing it.
        #[arg(long)]
        append: bool,
    },

    /// Hash files and record them in the index.
    AddFiles {
        /// Files to hash.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Context tag for the new records.
        #[arg(long, default_value = CONTEXT_UNARCHIVED)]
        context: String,

        /// Re-hash files even when size and mtime are unchanged.
        #[arg(long)]
        force: bool,
    },

    /// Print exact duplicate groups.
    Groups,

    /// Print the combined exact and near-duplicate report.
    Report {
        /// Near-duplicate distance threshold (overrides config).
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Neighbours examined per vector (overrides config).
        #[arg(short, long)]
        neighbors: Option<usize>,

        /// Byte-verify exact groups.
        #[arg(long)]
        verify_bytes: bool,

        /// Skip near-duplicate detection.
        #[arg(long)]
        exact_only: bool,
    },

    /// List registered backend names and their availability.
    Backends,

    /// Remove paths from the hash index.
    Remove {
        /// Paths to remove.
        #[arg(required = true)]
        paths: Vec<String>,

        /// Also drop vectors with these ids and rewrite the artifact.
        #[arg(long)]
        vectors: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let logging = LoggingConfig::from_settings(Some(&config.logging), cli.verbose);
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<DupfindConfig> {
    match path {
        Some(path) => Ok(DupfindConfig::load_from_file(path)
            .with_context(|| format!("reading {}", path.display()))?
            .with_env_overrides(|key| std::env::var(key).ok())),
        None => Ok(DupfindConfig::load_default()),
    }
}

fn run_command(command: Commands, config: &DupfindConfig) -> Result<()> {
    match command {
        Commands::ImportRecords { input, batch_size } => {
            cmd_import_records(config, input.as_deref(), batch_size)
        },
        Commands::ImportVectors {
            input,
            backend,
            dimensions,
            append,
        } => cmd_import_vectors(config, input.as_deref(), backend, dimensions, append),
        Commands::AddFiles {
            paths,
            context,
            force,
        } => cmd_add_files(config, &paths, &context, force),
        Commands::Groups => cmd_groups(config),
        Commands::Report {
            threshold,
            neighbors,
            verify_bytes,
            exact_only,
        } => cmd_report(config, threshold, neighbors, verify_bytes, exact_only),
        Commands::Backends => cmd_backends(),
        Commands::Remove { paths, vectors } => cmd_remove(config, &paths, vectors),
    }
}

fn open_index(config: &DupfindConfig) -> Result<SqliteHashIndex> {
    let path = config.index_db_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    SqliteHashIndex::new(&path).with_context(|| format!("opening index {}", path.display()))
}

/// Opens `input`, or stdin when absent.
fn open_input(input: Option<&Path>) -> Result<Box<dyn BufRead>> {
    Ok(match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

/// Parses JSON lines, skipping blank ones.
fn read_json_lines<T: serde::de::DeserializeOwned>(reader: Box<dyn BufRead>) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.context("reading input")?;
        if line.trim().is_empty() {
            continue;
        }
        items.push(
            serde_json::from_str(&line).with_context(|| format!("parsing line {}", number + 1))?,
        );
    }
    Ok(items)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn cmd_import_records(config: &DupfindConfig, input: Option<&Path>, batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }
    let records: Vec<FileRecord> = read_json_lines(open_input(input)?)?;
    let index = open_index(config)?;

    for batch in records.chunks(batch_size) {
        index.upsert(batch)?;
    }
    eprintln!("Imported {} records ({} total)", records.len(), index.count()?);
    Ok(())
}

fn cmd_import_vectors(
    config: &DupfindConfig,
    input: Option<&Path>,
    backend: Option<String>,
    dimensions: Option<usize>,
    append: bool,
) -> Result<()> {
    let factory = SimilarityBackendFactory::new();
    let name = backend.unwrap_or_else(|| config.backend.clone());
    let artifact = config.vector_artifact_path();

    let entries: Vec<VectorEntry> = read_json_lines(open_input(input)?)?;
    let dimensions = dimensions
        .or_else(|| entries.first().map(|e| e.vector.len()))
        .unwrap_or(config.dimensions);

    let mut selection = if append {
        factory
            .load(&name, &artifact)
            .with_context(|| format!("loading {}", artifact.display()))?
    } else {
        factory.create(&name, dimensions)?
    };
    if selection.fell_back() {
        eprintln!(
            "Requested backend '{}', using {}",
            selection.requested(),
            selection.selected()
        );
    }

    let (ids, vectors): (Vec<VectorId>, Vec<Vec<f32>>) =
        entries.into_iter().map(|e| (e.id, e.vector)).unzip();
    if vectors.is_empty() {
        bail!("no vectors in input");
    }
    selection.backend_mut().add(&vectors, Some(ids.as_slice()))?;
    selection.backend().persist(&artifact)?;

    eprintln!(
        "Indexed {} vectors with {} ({} total)",
        vectors.len(),
        selection.selected(),
        selection.backend().len()
    );
    Ok(())
}

fn cmd_add_files(config: &DupfindConfig, paths: &[PathBuf], context: &str, force: bool) -> Result<()> {
    let index = open_index(config)?;
    let mut records = Vec::with_capacity(paths.len());
    let mut skipped = 0usize;

    for path in paths {
        let meta = std::fs::metadata(path).with_context(|| format!("reading {}", path.display()))?;
        let key = path.to_string_lossy();
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .unwrap_or(0);
        if !force && index.is_unchanged(&key, meta.len(), mtime)? {
            skipped += 1;
            continue;
        }
        records.push(ContentHasher::record_for(path, context)?);
    }

    index.upsert(&records)?;
    eprintln!("Hashed {} files, {} unchanged", records.len(), skipped);
    Ok(())
}

fn cmd_groups(config: &DupfindConfig) -> Result<()> {
    let index = open_index(config)?;
    print_json(&index.duplicate_groups()?)
}

/// Loads the configured vector artifact, or `None` when there is nothing
/// usable to search.
fn load_backend(factory: &SimilarityBackendFactory, config: &DupfindConfig) -> Result<Option<BackendSelection>> {
    let artifact = config.vector_artifact_path();
    match factory.load(&config.backend, &artifact) {
        Ok(selection) => Ok(Some(selection)),
        Err(dupfind::Error::Storage { cause, .. }) => {
            tracing::info!(path = %artifact.display(), %cause, "No vector artifact loaded");
            Ok(None)
        },
        Err(dupfind::Error::BackendUnavailable(reason)) => {
            tracing::warn!(%reason, "Vector backend unavailable, skipping near duplicates");
            Ok(None)
        },
        Err(e) => Err(e.into()),
    }
}

fn cmd_report(
    config: &DupfindConfig,
    threshold: Option<f32>,
    neighbors: Option<usize>,
    verify_bytes: bool,
    exact_only: bool,
) -> Result<()> {
    let mut resolver_config: ResolverConfig = config.resolver.into();
    if let Some(threshold) = threshold {
        resolver_config = resolver_config.with_threshold(threshold);
    }
    if let Some(neighbors) = neighbors {
        resolver_config = resolver_config.with_neighbors(neighbors);
    }
    if verify_bytes {
        resolver_config = resolver_config.with_verify_bytes(true);
    }

    let index: Arc<dyn ContentHashIndex> = Arc::new(open_index(config)?);
    let mut resolver = DuplicateResolver::new(index, resolver_config)?;
    if !exact_only
        && let Some(selection) = load_backend(&SimilarityBackendFactory::new(), config)?
    {
        resolver = resolver.with_backend(selection.into_backend().into());
    }

    print_json(&resolver.resolve()?)
}

#[derive(Serialize)]
struct BackendListing<'a> {
    name: &'a str,
    kind: &'static str,
    available: bool,
}

fn cmd_backends() -> Result<()> {
    let factory = SimilarityBackendFactory::new();
    let listing: Vec<BackendListing<'_>> = factory
        .registered_names()
        .map(|(name, kind)| BackendListing {
            name,
            kind: kind.as_str(),
            available: SimilarityBackendFactory::available(kind),
        })
        .collect();
    print_json(&listing)?;

    if !BackendKind::Usearch.available() {
        eprintln!("Rebuild with --features usearch-hnsw to enable the usearch backend");
    }
    Ok(())
}

fn cmd_remove(config: &DupfindConfig, paths: &[String], vectors: bool) -> Result<()> {
    let index = open_index(config)?;
    let removed = index.remove(paths)?;
    eprintln!("Removed {removed} records");

    if vectors {
        let factory = SimilarityBackendFactory::new();
        let Some(selection) = load_backend(&factory, config)? else {
            bail!("no vector artifact to rewrite");
        };
        let rebuilt = factory.rebuild_from(&selection, |entry| {
            !paths.iter().any(|p| p == entry.id.as_str())
        })?;
        rebuilt.backend().persist(&config.vector_artifact_path())?;
        eprintln!(
            "Removed {} vectors",
            selection.backend().len() - rebuilt.backend().len()
        );
    }
    Ok(())
}

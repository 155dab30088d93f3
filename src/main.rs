//! wordvec CLI
//!
//! Builds, queries and inspects cached embedding tables.
//!
//! # Usage
//!
//! ```bash
//! # Parse a text file once and write its cache triple
//! wordvec build --source glove.6B.50d.txt --cache-dir .vector_cache
//!
//! # Look tokens up (the cache is mapped, not re-parsed)
//! wordvec lookup --source glove.6B.50d.txt the cat
//!
//! # Pretrained aliases resolve to their file inside the cache directory
//! wordvec lookup --source charngram.100d --charngram unseenword
//!
//! # Table and cache file statistics
//! wordvec stats --source glove.6B.50d.txt
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wordvec::{CacheConfig, CachePaths, LookupStrategy, Pretrained, TableOptions, VectorTable};

#[derive(Parser)]
#[command(name = "wordvec")]
#[command(about = "Cached word-embedding tables with zero-copy reload")]
#[command(version)]
struct Cli {
    /// JSON config file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or reuse) the cache for a vectors file
    Build {
        /// Text vectors file, file name inside the cache directory, or alias
        #[arg(short, long)]
        source: String,

        /// Drop keys longer than this many chars
        #[arg(long)]
        max_key_length: Option<usize>,

        /// Discard an existing cache and parse the source again
        #[arg(long)]
        force: bool,
    },

    /// Print the vector for each token
    Lookup {
        #[arg(short, long)]
        source: String,

        /// Compose misses from char n-gram vectors
        #[arg(long)]
        charngram: bool,

        /// Fail on tokens that are not keys
        #[arg(long)]
        strict: bool,

        #[arg(required = true)]
        tokens: Vec<String>,
    },

    /// Show table and cache file statistics
    Stats {
        #[arg(short, long)]
        source: String,
    },

    /// List pretrained aliases
    Aliases,
}

fn load_config(cli: &Cli) -> anyhow::Result<CacheConfig> {
    let base = match &cli.config {
        Some(path) => CacheConfig::load(path)?,
        None => CacheConfig::default(),
    };
    let mut config = base.with_overrides(|name| std::env::var(name).ok())?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

/// Source path and options, with aliases swapped for their file name
fn resolve(source: &str, options: TableOptions) -> (PathBuf, TableOptions) {
    match Pretrained::from_alias(source) {
        Ok(pretrained) => {
            tracing::info!("Resolved alias {} to {}", source, pretrained.file_name());
            (
                PathBuf::from(pretrained.file_name()),
                pretrained.table_options(&options),
            )
        }
        Err(_) => (PathBuf::from(source), options),
    }
}

fn format_vector(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Build {
            source,
            max_key_length,
            force,
        } => {
            let mut config = config;
            if let Some(n) = max_key_length {
                config.max_key_length = n;
            }
            let (source, options) = resolve(&source, config.table_options(LookupStrategy::Direct)?);

            if force {
                let resolved = options.resolve_source(&source);
                if let Some(paths) = options.cache_paths(&resolved) {
                    tracing::info!("Removing cache for {:?}", resolved);
                    paths.remove_all()?;
                }
            }

            let table = VectorTable::open(&source, &options)
                .with_context(|| format!("failed to open vectors {:?}", source))?;
            let stats = table.stats();
            tracing::info!(
                "Table ready: {} keys, dimension {}, {} buckets",
                stats.keys,
                stats.dim,
                stats.buckets
            );
            println!("keys: {}", stats.keys);
            println!("dim: {}", stats.dim);
            println!("mapped: {}", stats.mapped);
        }

        Commands::Lookup {
            source,
            charngram,
            strict,
            tokens,
        } => {
            let strategy = if charngram {
                LookupStrategy::CharNGram
            } else {
                LookupStrategy::Direct
            };
            let (source, mut options) = resolve(&source, config.table_options(strategy)?);
            if charngram {
                options = options.with_strategy(LookupStrategy::CharNGram);
            }

            let table = VectorTable::open(&source, &options)
                .with_context(|| format!("failed to open vectors {:?}", source))?;

            for token in &tokens {
                if strict {
                    let vector = table.lookup_strict(token)?;
                    println!("{}\t{}", token, format_vector(vector));
                } else {
                    if !table.contains(token) {
                        tracing::debug!("{:?} is not a key; using fallback", token);
                    }
                    println!("{}\t{}", token, format_vector(&table.lookup(token)));
                }
            }
        }

        Commands::Stats { source } => {
            let (source, options) = resolve(&source, config.table_options(LookupStrategy::Direct)?);
            let table = VectorTable::open(&source, &options)
                .with_context(|| format!("failed to open vectors {:?}", source))?;
            let stats = table.stats();

            println!("Vector Table: {}", table.name());
            println!("  Keys: {}", stats.keys);
            println!("  Dimensions: {}", stats.dim);
            println!("  Buckets: {}", stats.buckets);
            println!("  Longest probe: {}", stats.max_probe_length);
            println!("  Mapped: {}", stats.mapped);
            if let Some(id) = table.build_id() {
                println!("  Build id: {:016x}", id);
            }

            let resolved = options.resolve_source(&source);
            if let Some(paths) = options.cache_paths(&resolved) {
                print_cache_files(&paths);
            }
        }

        Commands::Aliases => {
            for alias in Pretrained::aliases() {
                let pretrained = Pretrained::from_alias(alias)?;
                println!("{}\t{}\t{}", alias, pretrained.file_name(), pretrained.url());
            }
        }
    }

    Ok(())
}

fn print_cache_files(paths: &CachePaths) {
    for path in [&paths.vectors, &paths.keys, &paths.table] {
        match std::fs::metadata(path) {
            Ok(meta) => println!(
                "  {:?}: {:.2} MB",
                path,
                meta.len() as f64 / (1024.0 * 1024.0)
            ),
            Err(_) => println!("  {:?}: missing", path),
        }
    }
}

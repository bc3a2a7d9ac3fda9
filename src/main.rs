//! Dashboard View Pipeline (DVP) - CLI entry point
//!
//! Offline driver for the pipeline: run the compute operations over a JSON
//! rows file, and inspect or clean the file-backed result cache.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use humansize::{format_size, BINARY};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dvp::compute::{ComputeChannel, ComputeRequest, ComputeResponse, SortOrder};
use dvp::rows::Row;
use dvp::{CacheStore, Config, FileBackend};

/// How long the CLI waits for a worker response before giving up.
const COMPUTE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "dvp")]
#[command(about = "Dashboard View Pipeline - offline tools for the presentation pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute KPI totals and ratios over a JSON rows file
    Kpis {
        /// Path to a JSON array of row objects
        file: PathBuf,
    },

    /// Aggregate a JSON rows file into per-date buckets
    Aggregate {
        /// Path to a JSON array of row objects
        file: PathBuf,
    },

    /// Sort a JSON rows file by a field
    Sort {
        /// Path to a JSON array of row objects
        file: PathBuf,
        /// Field to sort by
        #[arg(long)]
        by: String,
        /// Sort direction: asc or desc
        #[arg(long, default_value = "asc")]
        order: String,
    },

    /// Inspect and maintain the result cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show entry counts and total size of the store
    Stats,
    /// Remove expired entries for a namespace
    Clear {
        /// Namespace (page id) to clean
        namespace: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Kpis { file } => {
            run_compute(&config, ComputeRequest::CalculateKpis(load_rows(&file)?))
        }
        Commands::Aggregate { file } => {
            run_compute(&config, ComputeRequest::AggregateData(load_rows(&file)?))
        }
        Commands::Sort { file, by, order } => run_compute(
            &config,
            ComputeRequest::SortData {
                items: load_rows(&file)?,
                sort_by: by,
                sort_order: parse_order(&order)?,
            },
        ),
        Commands::Cache(command) => run_cache(&config, command),
        Commands::Config(command) => run_config(&config, command),
    }
}

fn load_rows(file: &Path) -> Result<Vec<Row>> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("Failed to read rows file: {:?}", file))?;
    let rows: Vec<Row> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse rows file: {:?}", file))?;
    Ok(rows)
}

fn parse_order(order: &str) -> Result<SortOrder> {
    match order {
        "asc" => Ok(SortOrder::Asc),
        "desc" => Ok(SortOrder::Desc),
        other => anyhow::bail!("Invalid sort order '{}' (expected asc or desc)", other),
    }
}

fn run_compute(config: &Config, request: ComputeRequest) -> Result<()> {
    let mut channel = ComputeChannel::new(config.compute.workers);
    let id = channel.submit(request);
    let response = channel
        .wait_for(id, COMPUTE_TIMEOUT)
        .context("Computation timed out")?;

    match response {
        ComputeResponse::KpisCalculated { result } => print_json(&result),
        ComputeResponse::DataAggregated { result } => print_json(&result),
        ComputeResponse::DataSorted { result } => print_json(&result),
        ComputeResponse::Error { message } => anyhow::bail!("Computation failed: {}", message),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_cache(config: &Config, command: CacheCommands) -> Result<()> {
    let backend = FileBackend::open(config.cache_file_path(), Some(config.storage.quota_bytes))
        .context("Failed to open cache store")?;
    let mut store = CacheStore::new(backend);

    match command {
        CacheCommands::Stats => {
            let namespaces = store.stored_namespaces();
            if namespaces.is_empty() {
                println!("Cache is empty");
            } else {
                for namespace in &namespaces {
                    println!("{}: {} entries", namespace, store.entry_count(namespace));
                }
            }
            println!("Total size: {}", format_size(store.used_bytes(), BINARY));
            Ok(())
        }
        CacheCommands::Clear { namespace } => {
            let before = store.entry_count(&namespace);
            store.clear_expired(&namespace);
            let removed = before - store.entry_count(&namespace);
            println!("Removed {} expired entries from {}", removed, namespace);
            Ok(())
        }
    }
}

fn run_config(config: &Config, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", Config::config_path()?.display());
            Ok(())
        }
    }
}

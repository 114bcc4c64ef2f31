// CLI Interface
//
// This module provides the command-line interface for LeGarde.

use crate::config::{GuardConfig, DEFAULT_CONFIG_FILE};
use crate::coordinator::{GuardCoordinator, ProcessingResult};
use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::{DirEntry, WalkDir};

/// LeGarde - Resource-guarded chunking
#[derive(Parser, Debug)]
#[command(name = "legarde")]
#[command(author = "LeGarde Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chunk source files under memory and error guards", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to .legarde/config.toml in the current directory)
    #[arg(global = true, long = "config", short = 'c')]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(global = true, long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk files or directories
    Chunk {
        /// Files or directories to chunk
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Print one JSON result per line instead of a summary
        #[arg(long = "json")]
        json: bool,

        /// Skip files larger than this many bytes
        #[arg(long = "max-bytes", default_value = "8388608")]
        max_bytes: u64,
    },

    /// Print the guard status as JSON
    Status,

    /// Sample memory once per second
    Monitor {
        /// How long to sample
        #[arg(long = "seconds", default_value = "10")]
        seconds: u64,
    },

    /// Write a default configuration file
    InitConfig {
        /// Project directory
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// Overwrite an existing file
        #[arg(long = "force")]
        force: bool,
    },
}

impl Cli {
    /// Run the CLI
    pub async fn run(self) -> AnyhowResult<()> {
        init_logging_impl(self.verbose);

        match self.command {
            Commands::Chunk {
                paths,
                json,
                max_bytes,
            } => cmd_chunk_impl(self.config, paths, json, max_bytes).await,
            Commands::Status => cmd_status_impl(self.config),
            Commands::Monitor { seconds } => cmd_monitor_impl(self.config, seconds).await,
            Commands::InitConfig { dir, force } => cmd_init_config_impl(dir, force),
        }
    }
}

/// Initialize logging; `RUST_LOG` wins over `--verbose`
fn init_logging_impl(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn load_config(explicit: Option<PathBuf>) -> AnyhowResult<GuardConfig> {
    match explicit {
        Some(path) => GuardConfig::load_file(&path),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            GuardConfig::load(cwd)
        }
    }
}

fn build_guard(config: Option<PathBuf>) -> AnyhowResult<GuardCoordinator> {
    let config = load_config(config)?;
    GuardCoordinator::new(config).context("Failed to build guard")
}

/// Chunk command implementation
async fn cmd_chunk_impl(
    config: Option<PathBuf>,
    paths: Vec<PathBuf>,
    json: bool,
    max_bytes: u64,
) -> AnyhowResult<()> {
    let guard = build_guard(config)?;
    guard.initialize().context("Failed to initialize guard")?;

    let mut files = 0usize;
    let mut chunks = 0usize;
    let mut degraded = 0usize;

    for root in &paths {
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if size > max_bytes {
                info!(path = %path.display(), size, "Skipping oversized file");
                continue;
            }
            let content = match std::fs::read(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(path = %path.display(), "Failed to read file: {err}");
                    continue;
                }
            };

            let result = guard.process_unit(path, &content).await;
            files += 1;
            chunks += result.chunk_count();
            if !result.success {
                degraded += 1;
            }

            if json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                print_summary_line(path, &result);
            }
        }
    }

    if !json {
        println!();
        println!("Files: {files}");
        println!("Chunks: {chunks}");
        println!("Degraded: {degraded}");
    }

    guard.destroy();
    Ok(())
}

fn print_summary_line(path: &Path, result: &ProcessingResult) {
    let tier = result
        .tier_used
        .map_or_else(|| "emergency".to_string(), |t| t.to_string());
    match &result.fallback_reason {
        Some(reason) => println!(
            "{}: {} chunk(s) via {} ({}ms) [fallback: {}]",
            path.display(),
            result.chunk_count(),
            tier,
            result.duration_ms,
            reason
        ),
        None => println!(
            "{}: {} chunk(s) via {} ({}ms)",
            path.display(),
            result.chunk_count(),
            tier,
            result.duration_ms
        ),
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') || name == "target" || name == "node_modules")
}

/// Status command implementation
fn cmd_status_impl(config: Option<PathBuf>) -> AnyhowResult<()> {
    let guard = build_guard(config)?;
    let status = guard.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

/// Monitor command implementation
async fn cmd_monitor_impl(config: Option<PathBuf>, seconds: u64) -> AnyhowResult<()> {
    let guard = build_guard(config)?;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    for _ in 0..seconds.max(1) {
        ticker.tick().await;
        let status = guard
            .check_memory_usage()
            .context("Failed to sample memory")?;
        println!(
            "{} {:>6.2}% {:>8.1} MB  pressure={:?} trend={:?} health={:.0}",
            chrono::Utc::now().format("%H:%M:%S"),
            status.usage_percent,
            status.heap_used as f64 / 1024.0 / 1024.0,
            status.pressure_level,
            status.trend,
            status.health_score
        );
    }

    let stats = guard.memory_stats();
    println!();
    println!("Samples: {}", stats.sample_count);
    println!("Peak: {:.1} MB", stats.peak_heap_used as f64 / 1024.0 / 1024.0);
    println!("Average: {:.1} MB", stats.average_heap_used as f64 / 1024.0 / 1024.0);
    Ok(())
}

/// Init-config command implementation
fn cmd_init_config_impl(dir: PathBuf, force: bool) -> AnyhowResult<()> {
    let target = dir.join(DEFAULT_CONFIG_FILE);
    if target.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", target.display());
    }
    GuardConfig::default().save(&dir)?;
    println!("Wrote {}", target.display());
    Ok(())
}

use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments. Flags override values from the config file.
#[derive(Debug, Parser)]
#[command(
    name = "pixcache",
    version,
    about = "Tiered memory/disk/network image cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH", env = "PIXCACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of decoded images kept in memory.
    #[arg(long)]
    pub memory_capacity: Option<usize>,

    /// HTTP request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Action to perform.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve images through the cache and report where each came from.
    Fetch {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Resolve every URL this many times.
        #[arg(long, default_value_t = 1)]
        repeat: usize,
    },
    /// Remove every cached image from disk.
    Clear,
    /// Show the disk cache location and usage.
    Info,
}

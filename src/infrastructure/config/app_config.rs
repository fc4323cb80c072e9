//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::project_dirs;
use crate::infrastructure::image::ImageCacheConfig;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and overridden by CLI flags.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Image cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Image cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of decoded images kept in memory.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Disk cache directory. Defaults to the platform cache directory.
    #[serde(default)]
    pub disk_dir: Option<PathBuf>,

    /// Disk cache size bound in bytes.
    #[serde(default = "default_max_disk_size")]
    pub max_disk_size: u64,

    /// Maximum concurrent downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_memory_capacity() -> usize {
    ImageCacheConfig::default().memory_cache_size
}

fn default_max_disk_size() -> u64 {
    ImageCacheConfig::default().disk_cache_size
}

fn default_max_concurrent_downloads() -> usize {
    ImageCacheConfig::default().max_concurrent_downloads
}

fn default_timeout_secs() -> u64 {
    ImageCacheConfig::default().timeout_secs
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            disk_dir: None,
            max_disk_size: default_max_disk_size(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CacheConfig {
    /// Returns the settings the cache coordinator is built from.
    #[must_use]
    pub const fn to_image_cache_config(&self) -> ImageCacheConfig {
        ImageCacheConfig {
            memory_cache_size: self.memory_capacity,
            disk_cache_size: self.max_disk_size,
            max_concurrent_downloads: self.max_concurrent_downloads,
            timeout_secs: self.timeout_secs,
        }
    }
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.disk_dir = Some(cache_dir.clone());
        }
        if let Some(capacity) = args.memory_capacity {
            self.cache.memory_capacity = capacity;
        }
        if let Some(timeout) = args.timeout_secs {
            self.cache.timeout_secs = timeout;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            cache: CacheConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_config_with_cache_table() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            memory_capacity = 25
            disk_dir = "/var/tmp/pixcache"
            timeout_secs = 5
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.memory_capacity, 25);
        assert_eq!(
            config.cache.disk_dir,
            Some(PathBuf::from("/var/tmp/pixcache"))
        );
        assert_eq!(config.cache.timeout_secs, 5);
        assert_eq!(
            config.cache.max_disk_size,
            CacheConfig::default().max_disk_size
        );
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.log_path, None);
        assert_eq!(config.cache.memory_capacity, 100);
        assert_eq!(config.cache.max_concurrent_downloads, 4);
    }

    #[test]
    fn test_cli_args_override_file_values() {
        let mut config: AppConfig = toml::from_str("[cache]\nmemory_capacity = 25\n").unwrap();
        let args = CliArgs::parse_from([
            "pixcache",
            "--memory-capacity",
            "7",
            "--log-level",
            "trace",
            "info",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.cache.memory_capacity, 7);
        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.cache.timeout_secs, 30);
    }

    #[test]
    fn test_to_image_cache_config() {
        let cache = CacheConfig {
            memory_capacity: 3,
            ..CacheConfig::default()
        };
        let converted = cache.to_image_cache_config();
        assert_eq!(converted.memory_cache_size, 3);
        assert_eq!(converted.timeout_secs, cache.timeout_secs);
    }
}

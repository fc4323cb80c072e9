//! Infrastructure layer with cache tiers, fetching and configuration.

/// Application configuration.
pub mod config;
/// Image handling (caching, fetching, tier coordination).
pub mod image;

pub use config::{AppConfig, CacheConfig, CliArgs, Command, LogLevel, StorageManager};
pub use image::{
    CacheStats, DiskImageCache, HttpImageFetcher, ImageCache, ImageCacheConfig, MemoryImageCache,
};

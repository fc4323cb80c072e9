//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction
//! - Disk caching for persistence
//! - HTTP fetching
//! - The tiered cache coordinator

pub mod cache;
pub mod disk_cache;
pub mod http_fetcher;
pub mod memory_cache;

pub use cache::{ImageCache, ImageCacheConfig, validate_url};
pub use disk_cache::{DiskImageCache, default_cache_dir};
pub use http_fetcher::HttpImageFetcher;
pub use memory_cache::{CacheStats, MemoryImageCache};

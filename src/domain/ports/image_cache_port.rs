//! Port definitions for image caching and fetching.

use std::sync::Arc;

use bytes::Bytes;

use crate::domain::entities::{CacheKey, LoadedImage};

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur while resolving an image.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// The URL scheme cannot be fetched over the network.
    #[error("Unsupported URL scheme: {0}")]
    InvalidScheme(String),
    /// Failed to decode image bytes.
    #[error("Decode error: {0}")]
    DecodeError(String),
    /// I/O error during a disk cache operation.
    #[error("IO error: {0}")]
    IoError(String),
    /// Network error during download.
    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Port for the in-memory image tier.
/// Implementations must be thread-safe and must not block on I/O.
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image from the cache.
    fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>>;

    /// Stores an image in the cache.
    fn put(&self, key: CacheKey, image: Arc<image::DynamicImage>);

    /// Removes an image from the cache.
    fn evict(&self, key: &CacheKey);

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all images from the cache.
    fn clear(&self);
}

/// Port for retrieving raw image bytes over the network.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ImageFetchPort: Send + Sync {
    /// Downloads the body at `url`.
    /// Callers only pass `http` and `https` URLs.
    async fn fetch(&self, url: &reqwest::Url) -> CacheResult<Bytes>;
}

/// Port for resolving a URL to an image through whatever tiers back it.
#[async_trait::async_trait]
pub trait ImageResolverPort: Send + Sync {
    /// Returns the image if it can be served without suspending.
    ///
    /// # Errors
    /// Returns error if the URL can never be resolved.
    fn cached(&self, url: &str) -> CacheResult<Option<LoadedImage>>;

    /// Resolves the image, falling back to slower tiers as needed.
    async fn resolve(&self, url: &str) -> CacheResult<LoadedImage>;

    /// Resolves the image after [`cached`](Self::cached) already missed,
    /// without recording a second fast-tier lookup.
    async fn resolve_uncached(&self, url: &str) -> CacheResult<LoadedImage>;
}

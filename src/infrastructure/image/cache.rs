//! Tiered image resolution.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Network

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domain::entities::{CacheKey, ImageSource, LoadedImage};
use crate::domain::ports::{
    CacheError, CacheResult, ImageCachePort, ImageFetchPort, ImageResolverPort,
};

use super::disk_cache::{DEFAULT_MAX_CACHE_SIZE, DiskImageCache, default_cache_dir};
use super::http_fetcher::{DEFAULT_TIMEOUT_SECS, HttpImageFetcher};
use super::memory_cache::{CacheStats, DEFAULT_CACHE_SIZE, MemoryImageCache};

/// Configuration for the image cache.
#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    /// Maximum images in memory cache.
    pub memory_cache_size: usize,
    /// Maximum disk cache size in bytes.
    pub disk_cache_size: u64,
    /// Maximum concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            memory_cache_size: DEFAULT_CACHE_SIZE,
            disk_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_concurrent_downloads: 4,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Owns both cache tiers and the fetcher, and decides which one satisfies a request.
///
/// Construct once and share it behind an `Arc`.
pub struct ImageCache {
    memory_cache: Arc<MemoryImageCache>,
    disk_cache: Arc<DiskImageCache>,
    fetcher: Arc<dyn ImageFetchPort>,
    download_permits: Semaphore,
    pending_writes: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("memory_entries", &self.memory_cache.len())
            .field("disk_dir", &self.disk_cache.cache_dir())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Creates a cache from already constructed parts.
    #[must_use]
    pub fn new(
        memory_cache: Arc<MemoryImageCache>,
        disk_cache: Arc<DiskImageCache>,
        fetcher: Arc<dyn ImageFetchPort>,
        max_concurrent_downloads: usize,
    ) -> Self {
        Self {
            memory_cache,
            disk_cache,
            fetcher,
            download_permits: Semaphore::new(max_concurrent_downloads.max(1)),
            pending_writes: Mutex::new(JoinSet::new()),
        }
    }

    /// Builds the memory tier, the HTTP fetcher and a disk tier in `disk_dir`
    /// (or the platform cache directory).
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub async fn open(
        config: &ImageCacheConfig,
        disk_dir: Option<std::path::PathBuf>,
    ) -> CacheResult<Self> {
        let fetcher = HttpImageFetcher::new(Duration::from_secs(config.timeout_secs))?;
        let disk_dir = disk_dir.unwrap_or_else(default_cache_dir);
        let disk_cache = DiskImageCache::new(disk_dir, config.disk_cache_size).await;

        Ok(Self::new(
            Arc::new(MemoryImageCache::new(config.memory_cache_size)),
            Arc::new(disk_cache),
            Arc::new(fetcher),
            config.max_concurrent_downloads,
        ))
    }

    /// Returns the memory tier.
    #[must_use]
    pub fn memory_cache(&self) -> &Arc<MemoryImageCache> {
        &self.memory_cache
    }

    /// Returns the disk tier.
    #[must_use]
    pub fn disk_cache(&self) -> &Arc<DiskImageCache> {
        &self.disk_cache
    }

    /// Memory-tier lookup. Never suspends.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or not `http`/`https`.
    pub fn cached(&self, url: &str) -> CacheResult<Option<LoadedImage>> {
        let parsed = validate_url(url)?;
        let key = CacheKey::from_url(parsed.as_str());
        Ok(self.memory_cache.get(&key).map(|image| LoadedImage {
            key,
            image,
            source: ImageSource::MemoryCache,
        }))
    }

    /// Resolves an image, checking memory, then disk, then the network.
    ///
    /// Every success leaves the image in the memory tier; network results are
    /// also persisted to disk in the background (see [`Self::flush`]).
    /// Failures write nothing.
    ///
    /// # Errors
    /// Returns error for unsupported URLs, failed downloads and undecodable bodies.
    pub async fn resolve(&self, url: &str) -> CacheResult<LoadedImage> {
        let parsed = validate_url(url)?;
        let key = CacheKey::from_url(parsed.as_str());

        if let Some(image) = self.memory_cache.get(&key) {
            return Ok(LoadedImage {
                key,
                image,
                source: ImageSource::MemoryCache,
            });
        }

        self.load(parsed, key).await
    }

    /// Resolves an image whose memory lookup already missed through [`Self::cached`].
    ///
    /// The memory tier is checked again, since another caller may have filled it
    /// meanwhile, but the check is not recorded in the hit/miss statistics.
    ///
    /// # Errors
    /// Same as [`Self::resolve`].
    pub async fn resolve_uncached(&self, url: &str) -> CacheResult<LoadedImage> {
        let parsed = validate_url(url)?;
        let key = CacheKey::from_url(parsed.as_str());

        if let Some(image) = self.memory_cache.peek(&key) {
            return Ok(LoadedImage {
                key,
                image,
                source: ImageSource::MemoryCache,
            });
        }

        self.load(parsed, key).await
    }

    async fn load(&self, parsed: reqwest::Url, key: CacheKey) -> CacheResult<LoadedImage> {
        if let Some(image) = self.disk_cache.get(&key).await {
            self.memory_cache.put(key.clone(), image.clone());
            return Ok(LoadedImage {
                key,
                image,
                source: ImageSource::DiskCache,
            });
        }

        let bytes = {
            let _permit = self
                .download_permits
                .acquire()
                .await
                .map_err(|e| CacheError::NetworkError(format!("Download queue closed: {e}")))?;
            self.fetcher.fetch(&parsed).await?
        };

        let image = decode(bytes.clone()).await?;

        self.memory_cache.put(key.clone(), image.clone());
        self.persist_in_background(key.clone(), bytes);

        debug!(key = %key, source = "network", "Image loaded successfully");

        Ok(LoadedImage {
            key,
            image,
            source: ImageSource::Network,
        })
    }

    fn persist_in_background(&self, key: CacheKey, bytes: Bytes) {
        let disk_cache = self.disk_cache.clone();
        let mut pending = self.pending_writes.lock();
        while let Some(finished) = pending.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "Disk write task failed");
            }
        }
        pending.spawn(async move {
            if let Err(e) = disk_cache.put_bytes(&key, &bytes).await {
                warn!(key = %key, error = %e, "Failed to cache to disk");
            }
        });
    }

    /// Waits for every background disk write started so far.
    ///
    /// Dropping the cache aborts writes that are still pending, so call this
    /// before shutting down.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.pending_writes.lock());
        let count = pending.len();
        while let Some(finished) = pending.join_next().await {
            if let Err(e) = finished {
                warn!(error = %e, "Disk write task failed");
            }
        }
        if count > 0 {
            debug!(count, "Flushed pending disk writes");
        }
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.memory_cache.stats()
    }

    /// Empties the memory tier only.
    pub fn clear_memory(&self) {
        self.memory_cache.clear();
    }

    /// Clears all caches.
    pub async fn clear_all(&self) {
        self.flush().await;
        self.memory_cache.clear();
        if let Err(e) = self.disk_cache.clear().await {
            warn!(error = %e, "Failed to clear disk cache");
        }
        info!("Cleared all image caches");
    }
}

#[async_trait::async_trait]
impl ImageResolverPort for ImageCache {
    fn cached(&self, url: &str) -> CacheResult<Option<LoadedImage>> {
        Self::cached(self, url)
    }

    async fn resolve(&self, url: &str) -> CacheResult<LoadedImage> {
        Self::resolve(self, url).await
    }

    async fn resolve_uncached(&self, url: &str) -> CacheResult<LoadedImage> {
        Self::resolve_uncached(self, url).await
    }
}

/// Parses `url` and rejects anything that cannot be fetched over HTTP.
///
/// # Errors
/// Returns `InvalidUrl` for unparsable input and `InvalidScheme` otherwise.
pub fn validate_url(url: &str) -> CacheResult<reqwest::Url> {
    let parsed = reqwest::Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(CacheError::InvalidScheme(other.to_string())),
    }
}

async fn decode(bytes: Bytes) -> CacheResult<Arc<image::DynamicImage>> {
    tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
        .await
        .map_err(|e| CacheError::DecodeError(format!("Decode task panicked: {e}")))?
        .map(Arc::new)
        .map_err(|e| CacheError::DecodeError(format!("Failed to decode image: {e}")))
}


#[cfg(test)]
mod tests {
    use super::test_support::png_bytes;
    use super::*;
    use crate::domain::ports::MockImageFetchPort;
    use tempfile::TempDir;
    use test_case::test_case;

    async fn cache_with(fetcher: MockImageFetchPort, dir: &TempDir) -> ImageCache {
        let disk = DiskImageCache::new(dir.path().join("images"), 1024 * 1024).await;
        ImageCache::new(
            Arc::new(MemoryImageCache::new(10)),
            Arc::new(disk),
            Arc::new(fetcher),
            2,
        )
    }

    #[test_case("https://example.com/a.png" ; "https")]
    #[test_case("http://example.com/a.png" ; "http")]
    fn test_network_schemes_accepted(url: &str) {
        tokio_test::assert_ok!(validate_url(url));
    }

    #[test_case("file:///etc/passwd", "file" ; "file")]
    #[test_case("ftp://example.com/a.png", "ftp" ; "ftp")]
    #[test_case("data:image/png;base64,AAAA", "data" ; "data")]
    fn test_other_schemes_rejected(url: &str, scheme: &str) {
        assert_eq!(
            validate_url(url).unwrap_err(),
            CacheError::InvalidScheme(scheme.to_string())
        );
    }

    #[test]
    fn test_unparsable_url_rejected() {
        assert!(matches!(
            validate_url("not a url"),
            Err(CacheError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_second_resolve_hits_memory() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(png_bytes(8, 4, [1, 2, 3])));
        let cache = cache_with(fetcher, &dir).await;

        let first = cache.resolve("https://example.com/a.png").await.unwrap();
        assert_eq!(first.source, ImageSource::Network);
        assert_eq!(first.image.width(), 8);

        let second = cache.resolve("https://example.com/a.png").await.unwrap();
        assert_eq!(second.source, ImageSource::MemoryCache);
        assert!(Arc::ptr_eq(&first.image, &second.image));
    }

    #[tokio::test]
    async fn test_network_result_persisted_and_served_from_disk() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(png_bytes(3, 3, [9, 9, 9])));
        let cache = cache_with(fetcher, &dir).await;
        let url = "https://example.com/a.png";

        cache.resolve(url).await.unwrap();
        cache.flush().await;
        assert!(cache.disk_cache().contains(&CacheKey::from_url(url)).await);

        cache.clear_memory();
        assert!(cache.cached(url).unwrap().is_none());

        let loaded = cache.resolve(url).await.unwrap();
        assert_eq!(loaded.source, ImageSource::DiskCache);
        assert_eq!(loaded.image.to_rgb8().get_pixel(1, 1), &image::Rgb([9, 9, 9]));

        // disk hit warms the memory tier again
        assert!(cache.cached(url).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_disk_survives_fresh_memory_tier() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a.png";
        {
            let mut fetcher = MockImageFetchPort::new();
            fetcher
                .expect_fetch()
                .returning(|_| Ok(png_bytes(2, 2, [5, 6, 7])));
            let cache = cache_with(fetcher, &dir).await;
            cache.resolve(url).await.unwrap();
            cache.flush().await;
        }

        let mut fetcher = MockImageFetchPort::new();
        fetcher.expect_fetch().never();
        let restarted = cache_with(fetcher, &dir).await;

        let loaded = restarted.resolve(url).await.unwrap();
        assert_eq!(loaded.source, ImageSource::DiskCache);
        assert_eq!(loaded.image.to_rgb8().get_pixel(0, 0), &image::Rgb([5, 6, 7]));
    }

    #[tokio::test]
    async fn test_invalid_scheme_never_fetches() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = MockImageFetchPort::new();
        fetcher.expect_fetch().never();
        let cache = cache_with(fetcher, &dir).await;

        let result = cache.resolve("file:///etc/passwd").await;

        assert_eq!(
            result.unwrap_err(),
            CacheError::InvalidScheme("file".to_string())
        );
        assert!(cache.memory_cache().is_empty());
        assert!(cache.disk_cache().is_empty());
        assert!(!cache.disk_cache().cache_dir().exists());
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(CacheError::NetworkError("timeout".to_string())));
        let cache = cache_with(fetcher, &dir).await;

        let result = cache.resolve("https://example.com/a.png").await;

        assert!(matches!(result, Err(CacheError::NetworkError(_))));
        assert!(cache.memory_cache().is_empty());
        assert!(cache.disk_cache().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_body_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .returning(|_| Ok(Bytes::from_static(b"<html>not found</html>")));
        let cache = cache_with(fetcher, &dir).await;

        let result = cache.resolve("https://example.com/a.png").await;

        assert!(matches!(result, Err(CacheError::DecodeError(_))));
        assert!(cache.memory_cache().is_empty());
        cache.flush().await;
        assert!(cache.disk_cache().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_disk_entry_falls_through_to_network() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a.png";
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(png_bytes(1, 1, [0, 0, 0])));
        let cache = cache_with(fetcher, &dir).await;
        cache
            .disk_cache()
            .put_bytes(&CacheKey::from_url(url), b"garbage")
            .await
            .unwrap();

        let loaded = cache.resolve(url).await.unwrap();
        assert_eq!(loaded.source, ImageSource::Network);
    }

    #[tokio::test]
    async fn test_clear_all_empties_both_tiers() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a.png";
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .times(2)
            .returning(|_| Ok(png_bytes(1, 1, [0, 0, 0])));
        let cache = cache_with(fetcher, &dir).await;

        cache.resolve(url).await.unwrap();
        cache.clear_all().await;

        assert!(cache.memory_cache().is_empty());
        assert!(!cache.disk_cache().contains(&CacheKey::from_url(url)).await);

        let loaded = cache.resolve(url).await.unwrap();
        assert_eq!(loaded.source, ImageSource::Network);
    }

    #[tokio::test]
    async fn test_flush_waits_for_disk_write() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a.png";
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(png_bytes(16, 16, [4, 4, 4])));
        let cache = cache_with(fetcher, &dir).await;

        cache.resolve(url).await.unwrap();
        cache.flush().await;

        let key = CacheKey::from_url(url);
        assert!(cache.disk_cache().contains(&key).await);
        assert_eq!(cache.disk_cache().len(), 1);

        // nothing left pending, so a second flush returns at once
        cache.flush().await;
    }

    #[tokio::test]
    async fn test_resolve_uncached_does_not_count_memory_lookup() {
        let dir = TempDir::new().unwrap();
        let url = "https://example.com/a.png";
        let mut fetcher = MockImageFetchPort::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(png_bytes(1, 1, [0, 0, 0])));
        let cache = cache_with(fetcher, &dir).await;

        assert!(cache.cached(url).unwrap().is_none());
        let first = cache.resolve_uncached(url).await.unwrap();
        assert_eq!(first.source, ImageSource::Network);

        let again = cache.resolve_uncached(url).await.unwrap();
        assert_eq!(again.source, ImageSource::MemoryCache);

        let stats = cache.memory_stats();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }
}

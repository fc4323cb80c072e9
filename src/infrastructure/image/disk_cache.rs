//! Disk-based image cache for persistence across sessions.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::ports::{CacheError, CacheResult};

/// Maximum disk cache size in bytes (200 MB default).
pub const DEFAULT_MAX_CACHE_SIZE: u64 = 200 * 1024 * 1024;

const ENTRY_EXTENSION: &str = "img";
const TEMP_SUFFIX: &str = ".img.tmp";

/// Disk-based image cache that persists encoded image bytes.
///
/// Files are named `<key>.img`. The directory is created lazily on every
/// write, so it may be removed externally between operations.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    /// Serializes renames into place with the counter updates they imply.
    commit_lock: Mutex<()>,
}

impl DiskImageCache {
    /// Opens a disk cache rooted at `cache_dir`, counting any existing entries
    /// and deleting temporary files left behind by interrupted writes.
    /// A missing directory is not an error.
    pub async fn new(cache_dir: PathBuf, max_size: u64) -> Self {
        let mut total_size = 0u64;
        let mut count = 0usize;

        if let Ok(mut entries) = fs::read_dir(&cache_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if is_temp_file(&path) {
                    match fs::remove_file(&path).await {
                        Ok(()) => trace!(path = %path.display(), "Removed stale temporary file"),
                        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stale temporary file"),
                    }
                } else if is_entry_file(&path)
                    && let Ok(meta) = entry.metadata().await
                {
                    total_size += meta.len();
                    count += 1;
                }
            }
        }

        let cache = Self {
            cache_dir,
            max_size,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
            commit_lock: Mutex::new(()),
        };

        cache.cleanup_if_needed().await;

        debug!(
            dir = %cache.cache_dir.display(),
            entries = count,
            size = total_size,
            "Opened disk image cache"
        );

        cache
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the size bound in bytes.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXTENSION}", key.as_str()))
    }

    /// Gets raw image bytes from disk cache.
    pub async fn get_bytes(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.cache_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Some(bytes)
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key = %key, error = %e, "Failed to read cached image");
                }
                trace!(key = %key, "Disk cache miss");
                None
            }
        }
    }

    /// Loads and decodes an image from disk cache.
    /// Undecodable entries are reported as misses.
    pub async fn get(&self, key: &CacheKey) -> Option<Arc<image::DynamicImage>> {
        let bytes = self.get_bytes(key).await?;

        let result = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes)).await;

        match result {
            Ok(Ok(img)) => {
                debug!(key = %key, "Decoded image from disk cache");
                Some(Arc::new(img))
            }
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to decode cached image");
                None
            }
            Err(e) => {
                error!(key = %key, error = %e, "Decode task panicked");
                None
            }
        }
    }

    /// Stores raw bytes in the disk cache.
    ///
    /// The bytes go to a uniquely named temporary sibling that is renamed into
    /// place, so readers never observe a partially written entry and concurrent
    /// writers of one key do not interfere; the last rename wins.
    ///
    /// # Errors
    /// Returns error if the directory or file cannot be created or written.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to create cache dir: {e}")))?;

        let staged = self.stage(key, bytes).await?;
        let path = self.cache_path(key);
        let new_size = bytes.len() as u64;

        {
            let _commit = self.commit_lock.lock().await;
            let old_size = fs::metadata(&path).await.map(|m| m.len()).ok();

            let target = path.clone();
            tokio::task::spawn_blocking(move || staged.persist(&target))
                .await
                .map_err(|e| CacheError::IoError(format!("Persist task panicked: {e}")))?
                .map_err(|e| {
                    CacheError::IoError(format!("Failed to move cache file into place: {}", e.error))
                })?;

            match old_size {
                Some(old) if new_size >= old => {
                    self.current_size.fetch_add(new_size - old, Ordering::Relaxed);
                }
                Some(old) => {
                    self.current_size.fetch_sub(old - new_size, Ordering::Relaxed);
                }
                None => {
                    self.current_size.fetch_add(new_size, Ordering::Relaxed);
                    self.item_count.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored image in disk cache");

        self.cleanup_if_needed().await;

        Ok(())
    }

    /// Writes `bytes` to a fresh temporary file in the cache directory.
    /// The file is deleted again if the returned path is dropped.
    async fn stage(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<tempfile::TempPath> {
        let dir = self.cache_dir.clone();
        let prefix = format!("{}.", key.as_str());
        let staged = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(TEMP_SUFFIX)
                .tempfile_in(&dir)
        })
        .await
        .map_err(|e| CacheError::IoError(format!("Create task panicked: {e}")))?
        .map_err(|e| CacheError::IoError(format!("Failed to create cache file: {e}")))?;

        let (file, temp_path) = staged.into_parts();
        let mut file = fs::File::from_std(file);

        file.write_all(bytes)
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to write cache file: {e}")))?;
        file.flush()
            .await
            .map_err(|e| CacheError::IoError(format!("Failed to flush cache file: {e}")))?;

        Ok(temp_path)
    }

    /// Encodes an image as PNG and stores it.
    /// Failures are logged; the entry simply stays cold.
    pub async fn put(&self, key: &CacheKey, image: Arc<image::DynamicImage>) {
        let encoded = tokio::task::spawn_blocking(move || {
            let mut buf = Cursor::new(Vec::new());
            image
                .write_to(&mut buf, image::ImageFormat::Png)
                .map(|()| buf.into_inner())
        })
        .await;

        let bytes = match encoded {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to encode image for disk cache");
                return;
            }
            Err(e) => {
                error!(key = %key, error = %e, "Encode task panicked");
                return;
            }
        };

        if let Err(e) = self.put_bytes(key, &bytes).await {
            warn!(key = %key, error = %e, "Failed to cache to disk");
        }
    }

    /// Removes an image from disk cache.
    pub async fn evict(&self, key: &CacheKey) {
        let _commit = self.commit_lock.lock().await;
        let path = self.cache_path(key);
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key = %key, error = %e, "Failed to evict from disk cache");
            }
        } else if let Some(s) = size {
            self.current_size.fetch_sub(s, Ordering::Relaxed);
            self.item_count.fetch_sub(1, Ordering::Relaxed);
            debug!(key = %key, "Evicted from disk cache");
        }
    }

    /// Removes the whole cache directory.
    ///
    /// # Errors
    /// Returns error if the directory exists but cannot be removed.
    pub async fn clear(&self) -> CacheResult<()> {
        let _commit = self.commit_lock.lock().await;
        match fs::remove_dir_all(&self.cache_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CacheError::IoError(format!(
                    "Failed to remove cache dir: {e}"
                )));
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!(dir = %self.cache_dir.display(), "Cleared disk cache");
        Ok(())
    }

    /// Returns the current cache size in bytes.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if an image is cached.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.cache_path(key)).await.unwrap_or(false)
    }

    /// Removes least recently accessed files once over the size bound,
    /// freeing an extra tenth of the bound as headroom.
    async fn cleanup_if_needed(&self) {
        let _commit = self.commit_lock.lock().await;
        let current_size = self.current_size();
        if current_size <= self.max_size {
            return;
        }

        debug!(
            current_size = current_size,
            max_size = self.max_size,
            "Disk cache over limit, cleaning up"
        );

        let Ok(mut entries) = fs::read_dir(&self.cache_dir).await else {
            return;
        };

        let mut files: Vec<(PathBuf, std::time::SystemTime, u64)> = Vec::new();

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_entry_file(&path) {
                continue;
            }

            if let Ok(meta) = entry.metadata().await {
                let accessed = meta
                    .accessed()
                    .or_else(|_| meta.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                files.push((path, accessed, meta.len()));
            }
        }

        files.sort_by_key(|(_, time, _)| *time);

        let mut freed_size = 0u64;
        let mut freed_count = 0usize;
        let target = current_size - self.max_size + (self.max_size / 10);

        for (path, _, size) in files {
            if freed_size >= target {
                break;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove old cache file");
            } else {
                trace!(path = %path.display(), "Removed old cache file");
                freed_size += size;
                freed_count += 1;
            }
        }
        self.current_size
            .fetch_sub(freed_size.min(current_size), Ordering::Relaxed);
        self.item_count.fetch_sub(freed_count, Ordering::Relaxed);

        debug!(
            freed_size = freed_size,
            freed_count = freed_count,
            "Disk cache cleanup complete"
        );
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
}

fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(TEMP_SUFFIX))
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    crate::infrastructure::config::project_dirs().map_or_else(
        || {
            std::env::temp_dir()
                .join(crate::NAME)
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}

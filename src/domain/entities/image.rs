//! Domain types for image caching.

use std::sync::Arc;

/// Content-addressed identifier for a cached image.
/// Derived from a SHA-256 digest of the URL string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a `CacheKey` from a URL by hashing it.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an image was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Served from the in-memory LRU tier.
    MemoryCache,
    /// Decoded from the disk tier.
    DiskCache,
    /// Downloaded from the network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A decoded image together with the tier that produced it.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Cache key of the source URL.
    pub key: CacheKey,
    /// Decoded pixels, shared with the memory tier.
    pub image: Arc<image::DynamicImage>,
    /// Tier that satisfied the request.
    pub source: ImageSource,
}

/// Phase of a load session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No target URL.
    #[default]
    Idle,
    /// A resolution is in flight for the URL.
    Resolving(String),
    /// The latest resolution for the URL completed and was published.
    Settled(String),
    /// The latest resolution for the URL failed; nothing was published.
    Failed(String),
}

impl SessionPhase {
    /// Returns the URL this phase refers to, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Resolving(url) | Self::Settled(url) | Self::Failed(url) => Some(url),
        }
    }

    /// Returns true if a resolution is in flight.
    #[must_use]
    pub const fn is_resolving(&self) -> bool {
        matches!(self, Self::Resolving(_))
    }

    /// Returns true if an image has been published for the target.
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Settled(_))
    }

    /// Returns true if the last resolution failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

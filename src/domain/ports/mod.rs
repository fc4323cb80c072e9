mod image_cache_port;

pub use image_cache_port::{
    CacheError, CacheResult, ImageCachePort, ImageFetchPort, ImageResolverPort,
};

#[cfg(test)]
pub use image_cache_port::MockImageFetchPort;

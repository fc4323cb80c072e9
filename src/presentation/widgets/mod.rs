//! TUI widgets.

mod cached_image;

pub use cached_image::CachedImage;

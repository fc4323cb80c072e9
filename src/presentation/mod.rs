//! Presentation layer with UI components.

/// UI widgets.
pub mod widgets;

pub use widgets::CachedImage;

//! Application layer with per-consumer load sessions.

/// Application services.
pub mod services;

pub use services::{ImageLoadSession, PublishedImage};

//! pixcache - A tiered image cache for terminal clients.
//!
//! Images are served from an in-memory LRU tier, then a content-addressed
//! disk tier, then the network. Load sessions follow a consumer's changing
//! target URL and never publish results for a superseded target.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing load sessions.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing cache tiers, fetching and configuration.
pub mod infrastructure;
/// Presentation layer containing UI components.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "pixcache";

/// Per-consumer load sessions.
pub mod load_session;

pub use load_session::{ImageLoadSession, PublishedImage};

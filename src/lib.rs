//! clipfeed - playback and prefetch coordinator for short-form video feeds
//!
//! Re-exports all modules for use by binary targets.

// Core engine (cache, signals, coordinator, workers)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod sim;

// Re-export commonly used types from core
pub use crate::core::cache_store::{BoundPolicy, CacheConfig, CacheStore};
pub use crate::core::coordinator::{ActivateOutcome, PlaybackCoordinator, PlaybackState};
pub use crate::core::position::FeedPositionController;

// Re-export entities
pub use crate::entities::{Feed, FeedItem, MediaBackend, MediaHandle};
pub use crate::error::{FeedError, FeedResult};

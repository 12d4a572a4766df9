//! Core engine modules - cache, signals, coordinator, workers
//!
//! These modules form the playback engine, independent of UI.

pub mod cache_store;
pub mod coordinator;
pub mod deferred;
pub mod position;
pub mod signals;
pub mod workers;

// Re-exports for convenience
pub use cache_store::{BoundPolicy, CacheConfig, CacheStatsSnapshot, CacheStore, proximate};
pub use coordinator::{ActivateOutcome, PlaybackCoordinator, PlaybackPhase, PlaybackState};
pub use deferred::Deferred;
pub use position::FeedPositionController;
pub use signals::{SignalBus, SignalSink, Subscription};
pub use workers::Workers;

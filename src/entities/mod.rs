//! Entities module - feed data and the host-facing seams
//!
//! - `feed`: the ordered catalog the coordinator addresses by index
//! - `media`: handle and backend traits implemented by the host player
//! - `traits`: worker pool and clock, injected instead of global

pub mod feed;
pub mod media;
pub mod traits;

pub use feed::{DisplayMetadata, Feed, FeedItem};
pub use media::{HandleId, MediaBackend, MediaEvent, MediaHandle, MediaSignal, MediaStatus, SharedHandle};
pub use traits::{Clock, SystemClock, WorkerPool};

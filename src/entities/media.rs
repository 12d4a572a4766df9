//! Media handle abstraction over the host's native playback primitive.
//!
//! The core never decodes or streams anything itself. A host supplies a
//! [`MediaBackend`] that opens [`MediaHandle`]s; handles are thread-safe and
//! report progress asynchronously as [`MediaEvent`]s pushed into a
//! [`SignalSink`](crate::core::signals::SignalSink).
//!
//! # Handle lifecycle
//!
//! ```text
//! Unbound -> Binding -> Ready -> Playing -> Ended --(loop)--> Ready
//!               \                   \
//!                `-> Failed          `-> Paused
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::signals::SignalSink;

/// Identity of a handle, unique for the lifetime of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Coarse status of a handle as reported by the host primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Unbound,
    Binding,
    Ready,
    Playing,
    Paused,
    Ended,
    Failed,
}

impl MediaStatus {
    /// Media is loaded enough to start without waiting.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            MediaStatus::Ready | MediaStatus::Playing | MediaStatus::Paused | MediaStatus::Ended
        )
    }
}

/// Asynchronous notification from a handle.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSignal {
    /// Ready to play.
    Ready,
    /// Playback actually started (or resumed) at rate.
    Playing,
    /// Waiting to play at rate (buffer underrun).
    Stalled,
    /// Reached end of media.
    Ended,
    /// Binding failed: bad URL, network, decode.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaEvent {
    pub handle: HandleId,
    pub signal: MediaSignal,
}

impl MediaEvent {
    pub fn new(handle: HandleId, signal: MediaSignal) -> Self {
        Self { handle, signal }
    }
}

/// A playable resource bound to one URL.
///
/// Implementations wrap the platform player. All methods are non-blocking;
/// their effects surface later through signals.
pub trait MediaHandle: Send + Sync + fmt::Debug {
    fn id(&self) -> HandleId;

    fn url(&self) -> &Url;

    fn status(&self) -> MediaStatus;

    fn play(&self);

    fn pause(&self);

    /// Seek to `secs` from the start. Out-of-range values are clamped by the host.
    fn seek(&self, secs: f64);

    /// Stop and release the underlying media. The handle is dead afterwards.
    fn unbind(&self);

    /// Host-side buffering hint, seconds ahead. Default: ignore.
    fn set_forward_buffer(&self, _secs: f64) {}

    fn is_ready(&self) -> bool {
        self.status().is_ready()
    }
}

pub type SharedHandle = Arc<dyn MediaHandle>;

/// Factory for handles. The only way handles come into existence.
pub trait MediaBackend: Send + Sync {
    /// Construct a handle bound to `url`, starting media loading.
    ///
    /// Returns `Err(reason)` if the resource cannot even be bound
    /// (e.g. unsupported scheme). Later failures arrive as
    /// [`MediaSignal::Failed`].
    fn open(&self, url: &Url, signals: SignalSink) -> Result<SharedHandle, String>;
}

impl<T: MediaBackend + ?Sized> MediaBackend for Arc<T> {
    fn open(&self, url: &Url, signals: SignalSink) -> Result<SharedHandle, String> {
        (**self).open(url, signals)
    }
}

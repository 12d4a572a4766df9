//! Playback coordinator - owns the single active handle.
//!
//! **Architecture**: the coordinator owns the [`CacheStore`] and the
//! [`SignalBus`]. It never constructs or destroys handles itself; it asks the
//! cache for one and only decides which handle is active.
//!
//! # Transition model
//!
//! `activate()` is optimistic: a handle that is already warm or ready is
//! seeked to start and played immediately. A freshly created handle is left
//! alone until its `Ready` signal arrives through [`pump`](PlaybackCoordinator::pump).
//!
//! # Per-handle phases
//!
//! `Unbound -> Binding -> Ready -> Playing -> Ended -> Ready ...`
//!
//! - `is_loading` is true while `Binding` (and while stalled), false at `Playing`
//! - `loading_progress` jumps to 1.0 at `Playing`
//! - `Ended` seeks to start and plays again: clips loop forever
//! - `Failed` clears `is_loading` and keeps `active_index` so the UI can draw
//!   a placeholder for that slot

use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::Serialize;
use url::Url;

use crate::core::cache_store::{CacheConfig, CacheStore};
use crate::core::signals::{SignalBus, Subscription};
use crate::entities::media::{MediaBackend, MediaEvent, MediaSignal, MediaStatus, SharedHandle};
use crate::entities::{Feed, WorkerPool};

/// Phase of the active slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPhase {
    #[default]
    Unbound,
    Binding,
    Ready,
    Playing,
    Ended,
    Failed,
}

/// Observable playback state. Read-only outside the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub active_index: Option<usize>,
    pub is_loading: bool,
    /// 0.0 until playback starts, then 1.0
    pub loading_progress: f64,
    /// `None` is the "nothing requested" sentinel
    pub last_requested_index: Option<usize>,
    pub phase: PlaybackPhase,
    pub paused: bool,
    /// Reason of the last binding failure, for the placeholder
    pub last_error: Option<String>,
}

/// What `activate` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateOutcome {
    /// Same index as the last request; nothing touched.
    Duplicate,
    /// Handle was warm or ready; play issued immediately.
    Started,
    /// Fresh handle; play deferred until it signals ready.
    AwaitingReady,
    /// Handle could not be bound; slot shows a placeholder.
    Failed,
}

struct ActiveBinding {
    index: usize,
    handle: SharedHandle,
    _subscription: Subscription,
    awaiting_ready: bool,
    wants_play: bool,
}

pub struct PlaybackCoordinator {
    cache: CacheStore,
    signals: SignalBus,
    active: Option<ActiveBinding>,
    state: PlaybackState,
}

impl std::fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("state", &self.state)
            .field("active_handle", &self.active.as_ref().map(|b| b.handle.id()))
            .field("cache", &self.cache)
            .finish()
    }
}

impl PlaybackCoordinator {
    /// `signals` must be the bus whose sink was given to `cache`.
    pub fn new(cache: CacheStore, signals: SignalBus) -> Self {
        Self {
            cache,
            signals,
            active: None,
            state: PlaybackState::default(),
        }
    }

    /// Wire a cache and a fresh signal bus around `backend`.
    pub fn with_backend(
        feed: Arc<Feed>,
        backend: Arc<dyn MediaBackend>,
        workers: Arc<dyn WorkerPool>,
        config: CacheConfig,
    ) -> Self {
        let signals = SignalBus::new();
        let cache = CacheStore::new(feed, backend, workers, signals.sink(), config);
        Self::new(cache, signals)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn active_index(&self) -> Option<usize> {
        self.state.active_index
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn loading_progress(&self) -> f64 {
        self.state.loading_progress
    }

    /// Render-capable handle for the active slot; `None` when nothing is
    /// active or the slot failed to bind.
    pub fn active_handle(&self) -> Option<SharedHandle> {
        self.active.as_ref().map(|b| b.handle.clone())
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn item_count(&self) -> usize {
        self.cache.feed().len()
    }

    /// Make `index` the playing clip.
    pub fn activate(&mut self, index: usize, url: &Url) -> ActivateOutcome {
        if self.state.last_requested_index == Some(index) {
            debug!("Coordinator: skipping duplicate activation for index {}", index);
            return ActivateOutcome::Duplicate;
        }
        self.state.last_requested_index = Some(index);
        info!("Coordinator: activating index {}", index);

        // a failed slot keeps its index but has no binding left
        let switching = self.state.active_index != Some(index) || self.active.is_none();
        if let Some(previous) = self.active.take()
            && switching
        {
            trace!("Coordinator: pausing index {}", previous.index);
            previous.handle.pause();
        }
        if switching {
            self.state.is_loading = true;
            self.state.loading_progress = 0.0;
            self.state.phase = PlaybackPhase::Binding;
        }
        self.state.paused = false;
        self.state.last_error = None;

        let item_count = self.item_count();
        let was_warm = self.cache.is_warm(index);
        let handle = match self.cache.acquire(index, url) {
            Ok(handle) => handle,
            Err(e) => {
                self.mark_failed(index, e.to_string());
                self.cache.prefetch(index, item_count);
                return ActivateOutcome::Failed;
            }
        };

        self.state.active_index = Some(index);
        // subscribe before reading status: a ready signal sent in between would be dropped
        let subscription = self.signals.subscribe(handle.id());
        let status = handle.status();
        if status == MediaStatus::Failed {
            self.mark_failed(index, "media failed to load".to_string());
            self.cache.discard(index);
            self.cache.prefetch(index, item_count);
            return ActivateOutcome::Failed;
        }

        let start_now = was_warm || status.is_ready();
        if start_now {
            handle.seek(0.0);
            handle.play();
            if status.is_ready() && self.state.phase == PlaybackPhase::Binding {
                self.state.phase = PlaybackPhase::Ready;
            }
        }
        if handle.status() == MediaStatus::Playing {
            self.mark_playing();
        }

        self.active = Some(ActiveBinding {
            index,
            handle,
            _subscription: subscription,
            awaiting_ready: !start_now,
            wants_play: true,
        });

        self.cache.prefetch(index, item_count);

        if start_now {
            ActivateOutcome::Started
        } else {
            ActivateOutcome::AwaitingReady
        }
    }

    /// Apply signals queued by handles. Call from the UI loop.
    /// Returns how many signals were applied.
    pub fn pump(&mut self) -> usize {
        let events = self.signals.drain();
        let mut applied = 0;
        for event in events {
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    fn apply(&mut self, event: MediaEvent) -> bool {
        let Some(binding) = self.active.as_mut() else {
            return false;
        };
        if binding.handle.id() != event.handle {
            return false;
        }

        match event.signal {
            MediaSignal::Ready => {
                if binding.awaiting_ready {
                    binding.awaiting_ready = false;
                    if binding.wants_play {
                        binding.handle.seek(0.0);
                        binding.handle.play();
                        debug!("Coordinator: index {} ready, starting", binding.index);
                    }
                } else if binding.wants_play && binding.handle.status() != MediaStatus::Playing {
                    binding.handle.play();
                }
                if self.state.phase != PlaybackPhase::Playing {
                    self.state.phase = PlaybackPhase::Ready;
                }
                if !binding.wants_play {
                    // paused while binding: nothing will start, stop the spinner
                    self.state.is_loading = false;
                }
            }
            MediaSignal::Playing => self.mark_playing(),
            MediaSignal::Stalled => {
                if self.state.phase == PlaybackPhase::Playing {
                    self.state.is_loading = true;
                }
            }
            MediaSignal::Ended => {
                debug!("Coordinator: index {} ended, looping", binding.index);
                self.state.phase = PlaybackPhase::Ended;
                binding.handle.seek(0.0);
                self.state.phase = PlaybackPhase::Ready;
                if binding.wants_play {
                    binding.handle.play();
                }
            }
            MediaSignal::Failed(reason) => {
                let index = binding.index;
                self.mark_failed(index, reason);
                // next activation of this index rebinds from scratch
                self.cache.discard(index);
            }
        }
        true
    }

    fn mark_playing(&mut self) {
        self.state.phase = PlaybackPhase::Playing;
        self.state.is_loading = false;
        self.state.loading_progress = 1.0;
    }

    fn mark_failed(&mut self, index: usize, reason: String) {
        warn!("Coordinator: index {} failed to bind: {}", index, reason);
        // placeholder slot: no handle to render, no observers left
        self.active = None;
        self.state.active_index = Some(index);
        self.state.phase = PlaybackPhase::Failed;
        self.state.is_loading = false;
        self.state.last_error = Some(reason);
    }

    pub fn pause(&mut self) {
        let Some(binding) = self.active.as_mut() else {
            return;
        };
        binding.wants_play = false;
        binding.handle.pause();
        self.state.paused = true;
    }

    pub fn resume(&mut self) {
        let Some(binding) = self.active.as_mut() else {
            return;
        };
        binding.wants_play = true;
        self.state.paused = false;
        // a slot still binding starts on its ready signal
        if !binding.awaiting_ready {
            binding.handle.play();
            if binding.handle.status() == MediaStatus::Playing {
                self.mark_playing();
            }
        }
    }

    /// Let the next `activate` for the last index go through.
    pub fn forget_last_request(&mut self) {
        self.state.last_requested_index = None;
    }

    /// Stop everything and empty the cache. Idempotent.
    pub fn deactivate_all(&mut self) {
        if let Some(binding) = self.active.take() {
            info!("Coordinator: deactivating index {}", binding.index);
            binding.handle.pause();
        }
        self.state = PlaybackState::default();
        self.cache.clear();
        // anything still queued belongs to handles that are gone
        let dropped = self.signals.drain().len();
        if dropped > 0 {
            trace!("Coordinator: discarded {} signals on teardown", dropped);
        }
    }
}

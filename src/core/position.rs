//! Feed position controller - turns scroll positions into activations.
//!
//! Raw position updates from the scroll surface arrive many times per swipe.
//! The controller:
//! 1. Pauses the playing clip immediately on any position change
//! 2. Arms a [`Deferred`] with the new index, replacing any pending one
//! 3. On [`tick`](FeedPositionController::tick), activates the index whose
//!    delay elapsed without being superseded
//!
//! Also carries the view lifecycle hooks (`on_appear`, `on_disappear`,
//! `on_app_resumed`).

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};

use crate::core::coordinator::{ActivateOutcome, PlaybackCoordinator, PlaybackState};
use crate::core::deferred::Deferred;
use crate::entities::{Clock, Feed};

pub struct FeedPositionController {
    coordinator: PlaybackCoordinator,
    feed: Arc<Feed>,
    clock: Arc<dyn Clock>,
    current_index: usize,
    debounce: Deferred<usize>,
    /// Activations actually issued (duplicates included)
    activation_count: usize,
    last_activation: Option<usize>,
}

impl std::fmt::Debug for FeedPositionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedPositionController")
            .field("current_index", &self.current_index)
            .field("pending", &self.debounce.pending())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl FeedPositionController {
    pub fn new(coordinator: PlaybackCoordinator, clock: Arc<dyn Clock>, debounce: Duration) -> Self {
        let feed = Arc::clone(coordinator.cache().feed());
        Self {
            coordinator,
            feed,
            clock,
            current_index: 0,
            debounce: Deferred::new(debounce),
            activation_count: 0,
            last_activation: None,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// True while a position change is waiting out the debounce delay.
    pub fn is_settling(&self) -> bool {
        self.debounce.is_armed()
    }

    pub fn debounce_delay(&self) -> Duration {
        self.debounce.delay()
    }

    pub fn set_debounce_delay(&mut self, delay: Duration) {
        self.debounce.set_delay(delay);
    }

    pub fn activation_count(&self) -> usize {
        self.activation_count
    }

    /// Index of the most recent activation issued.
    pub fn last_activation(&self) -> Option<usize> {
        self.last_activation
    }

    pub fn state(&self) -> &PlaybackState {
        self.coordinator.state()
    }

    pub fn coordinator(&self) -> &PlaybackCoordinator {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut PlaybackCoordinator {
        &mut self.coordinator
    }

    pub fn feed(&self) -> &Arc<Feed> {
        &self.feed
    }

    /// New scroll position. Out-of-range indices are ignored.
    pub fn update_position(&mut self, index: usize) {
        if index >= self.feed.len() {
            trace!("Position: ignoring out-of-range index {} (len {})", index, self.feed.len());
            return;
        }
        if index == self.current_index {
            return;
        }
        self.current_index = index;
        self.coordinator.pause();
        if let Some(superseded) = self.debounce.arm(index, self.clock.now()) {
            trace!("Position: index {} superseded by {}", superseded, index);
        } else {
            trace!(
                "Position: settling on {} in {}ms",
                index,
                self.debounce.delay().as_millis()
            );
        }
    }

    /// Drive the controller from the update loop: applies host signals, then
    /// fires a settled activation if one is due. Returns the activated index.
    pub fn tick(&mut self) -> Option<usize> {
        self.coordinator.pump();
        let index = self.debounce.poll(self.clock.now())?;
        debug!("Position: settled on {}", index);
        self.activate_current();
        Some(index)
    }

    /// Cancel any pending debounce and activate the current index now.
    pub fn force_activate_now(&mut self) -> ActivateOutcome {
        if let Some(cancelled) = self.debounce.cancel() {
            trace!("Position: cancelled pending activation for {}", cancelled);
        }
        self.activate_current()
    }

    fn activate_current(&mut self) -> ActivateOutcome {
        let index = self.current_index;
        let url = match self.feed.item(index) {
            Ok(item) => item.media_url.clone(),
            Err(e) => {
                debug!("Position: cannot activate: {}", e);
                return ActivateOutcome::Failed;
            }
        };
        self.activation_count += 1;
        self.last_activation = Some(index);
        let outcome = self.coordinator.activate(index, &url);
        if outcome == ActivateOutcome::Duplicate && self.coordinator.state().paused {
            // settled back on the clip that was paused by the swipe
            self.coordinator.resume();
        }
        outcome
    }

    pub fn pause(&mut self) {
        self.coordinator.pause();
    }

    pub fn resume(&mut self) {
        self.coordinator.resume();
    }

    /// View became visible: start at the top of the feed.
    pub fn on_appear(&mut self) -> ActivateOutcome {
        info!("Position: feed appeared ({} items)", self.feed.len());
        self.update_position(0);
        self.force_activate_now()
    }

    /// View went away: cancel pending work and release every handle.
    pub fn on_disappear(&mut self) {
        info!("Position: feed disappeared");
        self.debounce.cancel();
        self.coordinator.deactivate_all();
    }

    /// App returned to foreground: re-activate the current index in place.
    pub fn on_app_resumed(&mut self) -> ActivateOutcome {
        info!("Position: app resumed at index {}", self.current_index);
        self.debounce.cancel();
        self.coordinator.forget_last_request();
        self.activate_current()
    }
}

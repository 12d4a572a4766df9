//! Single-slot deferred task - the debounce primitive.
//!
//! Raw position updates arrive far faster than activations should happen.
//! Instead of firing on each one:
//! 1. Every update re-arms the slot, replacing whatever was pending
//! 2. The owner polls the slot from its update loop
//! 3. Only a payload whose delay elapsed without being replaced comes out
//!
//! Replacement is atomic with respect to polling: a superseded payload can
//! never be returned.

use std::time::{Duration, Instant};

/// One pending payload with a due time.
///
/// # Usage
/// ```ignore
/// // On position change:
/// deferred.arm(index, clock.now());
///
/// // In update loop:
/// if let Some(index) = deferred.poll(clock.now()) {
///     coordinator.activate(index, url);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Default for Deferred<T> {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}

impl<T> Deferred<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Applies to the next `arm`; an already armed payload keeps its due time.
    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    /// Arm with `payload`, due `delay` after `now`. Replaces any pending payload.
    /// Returns the payload that was superseded, if any.
    pub fn arm(&mut self, payload: T, now: Instant) -> Option<T> {
        let due = now + self.delay;
        self.pending.replace((payload, due)).map(|(old, _)| old)
    }

    /// Drop the pending payload without firing it.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(payload, _)| payload)
    }

    /// Returns the payload if it is due at `now`, clearing the slot.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, due)) if now >= *due => self.cancel(),
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref().map(|(payload, _)| payload)
    }

    /// Time left until the pending payload fires (zero if overdue).
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|(_, due)| due.saturating_duration_since(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn test_not_due_before_delay() {
        let t0 = Instant::now();
        let mut slot = Deferred::new(100 * MS);
        slot.arm(1, t0);
        assert!(slot.is_armed());
        assert_eq!(slot.poll(t0 + 99 * MS), None);
        assert!(slot.is_armed());
    }

    #[test]
    fn test_fires_once_after_delay() {
        let t0 = Instant::now();
        let mut slot = Deferred::new(100 * MS);
        slot.arm(1, t0);
        assert_eq!(slot.poll(t0 + 100 * MS), Some(1));
        assert!(!slot.is_armed());
        assert_eq!(slot.poll(t0 + 500 * MS), None);
    }

    #[test]
    fn test_rearm_replaces_and_resets_timer() {
        let t0 = Instant::now();
        let mut slot = Deferred::new(300 * MS);
        slot.arm(1, t0);
        assert_eq!(slot.arm(2, t0 + 200 * MS), Some(1));
        // original due time passed, replacement not yet due
        assert_eq!(slot.poll(t0 + 300 * MS), None);
        assert_eq!(slot.pending(), Some(&2));
        assert_eq!(slot.poll(t0 + 500 * MS), Some(2));
    }

    #[test]
    fn test_cancel_leaves_no_residue() {
        let t0 = Instant::now();
        let mut slot = Deferred::new(10 * MS);
        slot.arm("a", t0);
        assert_eq!(slot.cancel(), Some("a"));
        assert_eq!(slot.poll(t0 + 50 * MS), None);
        assert_eq!(slot.cancel(), None);
    }

    #[test]
    fn test_remaining() {
        let t0 = Instant::now();
        let mut slot = Deferred::new(300 * MS);
        assert_eq!(slot.remaining(t0), None);
        slot.arm((), t0);
        assert_eq!(slot.remaining(t0 + 100 * MS), Some(200 * MS));
        assert_eq!(slot.remaining(t0 + 400 * MS), Some(Duration::ZERO));
    }
}

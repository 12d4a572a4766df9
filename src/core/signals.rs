//! Signal mailbox between host media handles and the UI context.
//!
//! Architecture:
//! - Handles hold a cloneable [`SignalSink`] and emit [`MediaEvent`]s from
//!   whatever thread the host player calls back on.
//! - The coordinator owns the [`SignalBus`] and drains it on the UI context,
//!   so every state transition is applied from one place.
//! - Delivery is gated by [`Subscription`]s: an event for a handle with no
//!   live subscription is dropped, both at emit time and again at drain time.
//!   Dropping the subscription is the teardown.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{trace, warn};

use crate::entities::media::{HandleId, MediaEvent, MediaSignal};

/// Maximum events drained in one pump before the rest wait for the next one
const MAX_DRAIN: usize = 1000;

type LiveSet = Arc<RwLock<HashMap<HandleId, usize>>>;

fn is_live(live: &LiveSet, id: HandleId) -> bool {
    live.read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&id)
        .is_some_and(|n| *n > 0)
}

/// UI-side end of the mailbox.
#[derive(Debug)]
pub struct SignalBus {
    tx: Sender<MediaEvent>,
    rx: Receiver<MediaEvent>,
    live: LiveSet,
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            live: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Sender handed to the backend for each new handle.
    pub fn sink(&self) -> SignalSink {
        SignalSink {
            tx: self.tx.clone(),
            live: Arc::clone(&self.live),
        }
    }

    /// Start receiving signals for `handle` until the returned guard drops.
    pub fn subscribe(&self, handle: HandleId) -> Subscription {
        *self
            .live
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(handle)
            .or_default() += 1;
        trace!("SignalBus: subscribed {}", handle);
        Subscription {
            handle,
            live: Arc::clone(&self.live),
        }
    }

    pub fn is_subscribed(&self, handle: HandleId) -> bool {
        is_live(&self.live, handle)
    }

    /// Take every pending event that still has a live subscriber.
    pub fn drain(&self) -> Vec<MediaEvent> {
        let mut out = Vec::new();
        for event in self.rx.try_iter().take(MAX_DRAIN) {
            if is_live(&self.live, event.handle) {
                out.push(event);
            } else {
                trace!("SignalBus: dropped {:?} for detached {}", event.signal, event.handle);
            }
        }
        out
    }

    /// Number of queued events (including ones that will be filtered).
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Producer end held by handles. Cheap to clone, usable from any thread.
#[derive(Debug, Clone)]
pub struct SignalSink {
    tx: Sender<MediaEvent>,
    live: LiveSet,
}

impl SignalSink {
    pub fn emit(&self, handle: HandleId, signal: MediaSignal) {
        if !is_live(&self.live, handle) {
            return;
        }
        if self.tx.send(MediaEvent::new(handle, signal)).is_err() {
            warn!("SignalSink: bus gone, dropping signal for {}", handle);
        }
    }
}

/// Live interest in one handle's signals. Detaches on drop.
#[derive(Debug)]
pub struct Subscription {
    handle: HandleId,
    live: LiveSet,
}

impl Subscription {
    pub fn handle(&self) -> HandleId {
        self.handle
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut live = self.live.write().unwrap_or_else(|e| e.into_inner());
        if let Some(n) = live.get_mut(&self.handle) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                live.remove(&self.handle);
            }
        }
        trace!("SignalBus: unsubscribed {}", self.handle);
    }
}

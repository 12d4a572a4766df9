//! Scripted stand-ins for host collaborators.
//!
//! - [`SimBackend`] / [`SimHandle`]: a media primitive whose loading, failure
//!   and end-of-media are driven explicitly, with every call recorded
//! - [`ManualClock`]: time that only moves when told to
//! - [`ManualPool`]: a worker pool that queues jobs until `run_pending()`
//!
//! Used by the demo binary and by tests; nothing here touches the network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use log::trace;
use url::Url;

use crate::core::signals::SignalSink;
use crate::entities::media::{
    HandleId, MediaBackend, MediaHandle, MediaSignal, MediaStatus, SharedHandle,
};
use crate::entities::{Clock, WorkerPool};

/// One recorded call on a [`SimHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum HandleCall {
    Play,
    Pause,
    Seek(f64),
    Unbind,
    ForwardBuffer(f64),
}

#[derive(Debug)]
struct SimState {
    status: MediaStatus,
    position: f64,
    wants_play: bool,
    calls: Vec<HandleCall>,
}

/// Simulated player bound to one URL.
#[derive(Debug)]
pub struct SimHandle {
    id: HandleId,
    url: Url,
    sink: SignalSink,
    state: Mutex<SimState>,
}

impl SimHandle {
    fn new(id: HandleId, url: Url, sink: SignalSink, status: MediaStatus) -> Self {
        Self {
            id,
            url,
            sink,
            state: Mutex::new(SimState {
                status,
                position: 0.0,
                wants_play: false,
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loading finished: Binding -> Ready, then Playing if play was requested early.
    pub fn finish_loading(&self) {
        let start = {
            let mut st = self.lock();
            if st.status != MediaStatus::Binding {
                return;
            }
            st.status = MediaStatus::Ready;
            if st.wants_play {
                st.status = MediaStatus::Playing;
            }
            st.wants_play
        };
        self.sink.emit(self.id, MediaSignal::Ready);
        if start {
            self.sink.emit(self.id, MediaSignal::Playing);
        }
    }

    /// Loading failed asynchronously.
    pub fn fail(&self, reason: &str) {
        {
            let mut st = self.lock();
            if st.status == MediaStatus::Unbound {
                return;
            }
            st.status = MediaStatus::Failed;
            st.wants_play = false;
        }
        self.sink.emit(self.id, MediaSignal::Failed(reason.to_string()));
    }

    /// Playback reached the end of media.
    pub fn reach_end(&self) {
        {
            let mut st = self.lock();
            if st.status != MediaStatus::Playing {
                return;
            }
            st.status = MediaStatus::Ended;
        }
        self.sink.emit(self.id, MediaSignal::Ended);
    }

    /// Buffer underrun while playing.
    pub fn stall(&self) {
        if self.lock().status == MediaStatus::Playing {
            self.sink.emit(self.id, MediaSignal::Stalled);
        }
    }

    pub fn calls(&self) -> Vec<HandleCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn position(&self) -> f64 {
        self.lock().position
    }
}

impl MediaHandle for SimHandle {
    fn id(&self) -> HandleId {
        self.id
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn status(&self) -> MediaStatus {
        self.lock().status
    }

    fn play(&self) {
        let emit = {
            let mut st = self.lock();
            st.calls.push(HandleCall::Play);
            match st.status {
                MediaStatus::Binding => {
                    st.wants_play = true;
                    false
                }
                MediaStatus::Ready | MediaStatus::Paused | MediaStatus::Ended => {
                    st.status = MediaStatus::Playing;
                    st.wants_play = true;
                    true
                }
                // already playing, unbound or failed
                _ => false,
            }
        };
        if emit {
            self.sink.emit(self.id, MediaSignal::Playing);
        }
    }

    fn pause(&self) {
        let mut st = self.lock();
        st.calls.push(HandleCall::Pause);
        st.wants_play = false;
        if st.status == MediaStatus::Playing {
            st.status = MediaStatus::Paused;
        }
    }

    fn seek(&self, secs: f64) {
        let mut st = self.lock();
        st.calls.push(HandleCall::Seek(secs));
        if matches!(st.status, MediaStatus::Unbound | MediaStatus::Failed) {
            return;
        }
        st.position = secs.max(0.0);
        if st.status == MediaStatus::Ended {
            st.status = MediaStatus::Ready;
        }
    }

    fn unbind(&self) {
        let mut st = self.lock();
        st.calls.push(HandleCall::Unbind);
        st.status = MediaStatus::Unbound;
        st.wants_play = false;
    }

    fn set_forward_buffer(&self, secs: f64) {
        self.lock().calls.push(HandleCall::ForwardBuffer(secs));
    }
}

/// Backend producing [`SimHandle`]s.
///
/// By default new handles start in `Binding` and wait for
/// [`SimHandle::finish_loading`]; [`SimBackend::instant`] makes them ready on open.
#[derive(Debug, Default)]
pub struct SimBackend {
    next_id: AtomicU64,
    instant: bool,
    rejected: Mutex<HashSet<String>>,
    opened: Mutex<Vec<Arc<SimHandle>>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instant() -> Self {
        Self {
            instant: true,
            ..Self::default()
        }
    }

    /// Make `open` fail synchronously for `url`.
    pub fn reject(&self, url: &Url) {
        self.rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string());
    }

    /// Every handle ever opened, oldest first.
    pub fn opened(&self) -> Vec<Arc<SimHandle>> {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Handles for `url` that have not been unbound.
    pub fn live_for(&self, url: &Url) -> Vec<Arc<SimHandle>> {
        self.opened()
            .into_iter()
            .filter(|h| h.url() == url && h.status() != MediaStatus::Unbound)
            .collect()
    }

    /// Most recent handle opened for `url`.
    pub fn latest_for(&self, url: &Url) -> Option<Arc<SimHandle>> {
        self.opened().into_iter().rev().find(|h| h.url() == url)
    }

    pub fn handle(&self, id: HandleId) -> Option<Arc<SimHandle>> {
        self.opened().into_iter().find(|h| h.id() == id)
    }

    /// Finish loading on every handle still binding.
    pub fn finish_all(&self) {
        for handle in self.opened() {
            handle.finish_loading();
        }
    }
}

impl MediaBackend for SimBackend {
    fn open(&self, url: &Url, signals: SignalSink) -> Result<SharedHandle, String> {
        let rejected = self
            .rejected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url.as_str());
        if rejected {
            return Err(format!("unsupported media: {}", url));
        }

        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let status = if self.instant {
            MediaStatus::Ready
        } else {
            MediaStatus::Binding
        };
        let handle = Arc::new(SimHandle::new(id, url.clone(), signals, status));
        trace!("SimBackend: opened {} for {}", id, url);
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Clock advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) += by;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool that holds jobs until [`ManualPool::run_pending`].
#[derive(Default)]
pub struct ManualPool {
    queue: Mutex<Vec<(Option<u64>, Job)>>,
    epoch: AtomicU64,
}

impl std::fmt::Debug for ManualPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualPool")
            .field("queued", &self.queued())
            .field("epoch", &self.current_epoch())
            .finish()
    }
}

impl ManualPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run queued jobs in FIFO order; stale-epoch jobs are skipped.
    /// Returns how many actually ran.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()));
        let current = self.current_epoch();
        let mut ran = 0;
        for (epoch, job) in jobs {
            if epoch.is_none_or(|e| e == current) {
                job();
                ran += 1;
            }
        }
        ran
    }
}

impl WorkerPool for ManualPool {
    fn execute(&self, f: Job) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((None, f));
    }

    fn execute_with_epoch(&self, epoch: u64, f: Job) {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((Some(epoch), f));
    }

    fn increment_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }
}

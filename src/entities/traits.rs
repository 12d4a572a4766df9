//! Abstract traits for dependency inversion.
//!
//! The cache store and position controller depend on these rather than on a
//! concrete thread pool or wall clock, so tests can drive them step by step.
//!
//! Implementations live in `core/` (threaded) and `sim` (deterministic).

use std::sync::Arc;
use std::time::Instant;

/// Abstract worker pool interface.
///
/// Background jobs here only touch media handles (priming seeks); they never
/// mutate the cache map or playback state.
pub trait WorkerPool: Send + Sync {
    /// Run `f` on a worker.
    fn execute(&self, f: Box<dyn FnOnce() + Send + 'static>);

    /// Run `f` on a worker unless the pool's epoch moved past `epoch`
    /// before the job was picked up.
    fn execute_with_epoch(&self, epoch: u64, f: Box<dyn FnOnce() + Send + 'static>);

    /// Advance the epoch, invalidating every job queued under older epochs.
    fn increment_epoch(&self) -> u64;

    fn current_epoch(&self) -> u64;
}

/// Monotonic time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Blanket impl: Arc<T> implements traits if T does
impl<T: WorkerPool + ?Sized> WorkerPool for Arc<T> {
    fn execute(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        (**self).execute(f)
    }

    fn execute_with_epoch(&self, epoch: u64, f: Box<dyn FnOnce() + Send + 'static>) {
        (**self).execute_with_epoch(epoch, f)
    }

    fn increment_epoch(&self) -> u64 {
        (**self).increment_epoch()
    }

    fn current_epoch(&self) -> u64 {
        (**self).current_epoch()
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

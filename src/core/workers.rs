//! Background pool for handle priming.
//!
//! Priming jobs are tiny (two seeks on a host handle), but there can be a
//! burst of them on every settled swipe. Work-stealing deques keep them off
//! the UI context without a lock per job.
//!
//! Epoch mechanism skips priming queued for a neighbourhood the user has
//! already scrolled away from.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::trace;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::entities::WorkerPool;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Idle back-off between empty polls
const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Upper bound on how long drop waits for in-flight jobs
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Work-stealing job pool with an epoch counter.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(2);
/// let epoch = workers.increment_epoch();
/// let handle = Arc::clone(&handle);
/// workers.execute_with_epoch(epoch, Box::new(move || handle.seek(0.0)));
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    epoch: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> std::io::Result<Self> {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(Worker::stealer).collect();

        let mut handles = Vec::with_capacity(num_threads);
        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let stealers = stealers.clone();

            let handle = thread::Builder::new()
                .name(format!("clipfeed-prime-{}", worker_id))
                .spawn(move || run_worker(worker_id, local, &injector, &stealers, &shutdown))?;
            handles.push(handle);
        }

        trace!("Workers initialized: {} threads", num_threads);

        Ok(Self {
            injector,
            handles,
            epoch: Arc::new(AtomicU64::new(0)),
            shutdown,
        })
    }

    /// Pool sized from the machine, leaving most cores to the host player.
    pub fn auto() -> std::io::Result<Self> {
        Self::new((num_cpus::get() / 4).clamp(1, 4))
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

fn find_job(local: &Worker<Job>, injector: &Injector<Job>, stealers: &[Stealer<Job>]) -> Option<Job> {
    local
        .pop()
        .or_else(|| injector.steal_batch_and_pop(local).success())
        .or_else(|| stealers.iter().find_map(|s| s.steal().success()))
}

fn run_worker(
    worker_id: usize,
    local: Worker<Job>,
    injector: &Injector<Job>,
    stealers: &[Stealer<Job>],
    shutdown: &AtomicBool,
) {
    trace!("Worker {} started", worker_id);
    loop {
        if let Some(job) = find_job(&local, injector, stealers) {
            job();
            continue;
        }
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        thread::sleep(IDLE_SLEEP);
    }
    trace!("Worker {} stopped", worker_id);
}

impl WorkerPool for Workers {
    fn execute(&self, f: Job) {
        self.injector.push(f);
    }

    fn execute_with_epoch(&self, epoch: u64, f: Job) {
        let current = Arc::clone(&self.epoch);
        // checked when the job runs, not when it is queued
        self.injector.push(Box::new(move || {
            if current.load(Ordering::Relaxed) == epoch {
                f();
            }
        }));
    }

    fn increment_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        // stale jobs still queued become no-ops
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.shutdown.store(true, Ordering::SeqCst);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(IDLE_SLEEP);
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn wait_for(counter: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_execute_runs_jobs() {
        let workers = Workers::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..16 {
            let counter = Arc::clone(&counter);
            workers.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(wait_for(&counter, 16));
    }

    #[test]
    fn test_stale_epoch_skipped() {
        let workers = Workers::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let stale = workers.current_epoch();
        workers.increment_epoch();

        let r = Arc::clone(&ran);
        workers.execute_with_epoch(stale, Box::new(move || {
            r.fetch_add(100, Ordering::SeqCst);
        }));
        let r = Arc::clone(&ran);
        workers.execute_with_epoch(workers.current_epoch(), Box::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(wait_for(&ran, 1));
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_epoch_increments() {
        let workers = Workers::new(1).unwrap();
        assert_eq!(workers.current_epoch(), 0);
        assert_eq!(workers.increment_epoch(), 1);
        assert_eq!(workers.increment_epoch(), 2);
    }
}

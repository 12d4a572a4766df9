//! End-to-end feed sessions against the simulated backend.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clipfeed::core::cache_store::proximate;
use clipfeed::core::{
    ActivateOutcome, BoundPolicy, CacheConfig, CacheStore, FeedPositionController, PlaybackCoordinator,
    PlaybackPhase, SignalBus, Workers,
};
use clipfeed::entities::{Feed, MediaHandle, MediaStatus, WorkerPool};
use clipfeed::sim::{HandleCall, ManualClock, ManualPool, SimBackend, SimHandle};
use url::Url;

struct Harness {
    ctl: FeedPositionController,
    clock: Arc<ManualClock>,
    backend: Arc<SimBackend>,
    pool: Arc<ManualPool>,
}

impl Harness {
    fn new(items: usize, backend: SimBackend, config: CacheConfig) -> Self {
        let base = Url::parse("https://cdn.example.com/v/").unwrap();
        let feed = Arc::new(Feed::synthetic(&base, items).unwrap());
        let backend = Arc::new(backend);
        let pool = Arc::new(ManualPool::new());
        let coordinator = PlaybackCoordinator::with_backend(feed, backend.clone(), pool.clone(), config);
        let clock = Arc::new(ManualClock::new());
        let ctl = FeedPositionController::new(coordinator, clock.clone(), Duration::from_millis(300));
        Self {
            ctl,
            clock,
            backend,
            pool,
        }
    }

    fn sim(&self, index: usize) -> Arc<SimHandle> {
        let url = self.ctl.feed().url_of(index).unwrap();
        self.backend.latest_for(url).unwrap()
    }

    /// Load everything, then pump until the queue is quiet.
    fn settle(&mut self) {
        self.backend.finish_all();
        for _ in 0..3 {
            self.ctl.tick();
        }
    }

    fn live_per_index(&self) -> Vec<usize> {
        (0..self.ctl.feed().len())
            .map(|i| self.backend.live_for(self.ctl.feed().url_of(i).unwrap()).len())
            .collect()
    }
}

#[test]
fn burst_of_swipes_activates_only_last() {
    let mut h = Harness::new(10, SimBackend::new(), CacheConfig::default());
    h.ctl.update_position(1);
    h.clock.advance_ms(20);
    h.ctl.tick();
    h.ctl.update_position(2);
    h.clock.advance_ms(20);
    h.ctl.tick();
    h.ctl.update_position(3);
    h.clock.advance_ms(10);
    h.ctl.tick();

    assert_eq!(h.ctl.activation_count(), 0);
    h.clock.advance_ms(300);
    assert_eq!(h.ctl.tick(), Some(3));
    h.clock.advance_ms(1000);
    assert_eq!(h.ctl.tick(), None);

    assert_eq!(h.ctl.activation_count(), 1);
    assert_eq!(h.ctl.last_activation(), Some(3));
    assert_eq!(h.ctl.state().active_index, Some(3));
    assert_eq!(h.ctl.state().last_requested_index, Some(3));
}

#[test]
fn second_activation_of_same_index_is_noop() {
    let mut h = Harness::new(10, SimBackend::new(), CacheConfig::default());
    h.ctl.on_appear();
    h.settle();
    let created = h.backend.open_count();
    h.sim(0).clear_calls();

    assert_eq!(h.ctl.force_activate_now(), ActivateOutcome::Duplicate);
    assert!(h.sim(0).calls().is_empty());
    assert_eq!(h.backend.open_count(), created);
}

#[test]
fn five_item_feed_first_activation() {
    let mut h = Harness::new(5, SimBackend::new(), CacheConfig::default());
    h.ctl.on_appear();
    assert_eq!(h.ctl.state().active_index, Some(0));
    assert!(h.ctl.state().is_loading);

    h.settle();
    assert!(!h.ctl.state().is_loading);
    assert_eq!(h.ctl.state().loading_progress, 1.0);
    assert_eq!(h.ctl.state().phase, PlaybackPhase::Playing);

    let warm = h.ctl.coordinator().cache().indices();
    assert_eq!(warm, vec![0, 1, 2, 3, 4]);
    assert!(h.live_per_index().iter().all(|&n| n == 1));
}

#[test]
fn end_of_media_restarts_in_place() {
    let mut h = Harness::new(10, SimBackend::new(), CacheConfig::default());
    h.ctl.on_appear();
    h.settle();
    h.sim(0).clear_calls();

    h.sim(0).reach_end();
    h.ctl.tick();

    assert_eq!(h.sim(0).calls(), vec![HandleCall::Seek(0.0), HandleCall::Play]);
    assert_eq!(h.sim(0).status(), MediaStatus::Playing);
    assert_eq!(h.ctl.state().active_index, Some(0));
    assert_eq!(h.ctl.current_index(), 0);
}

#[test]
fn reactivating_playing_index_does_not_restart() {
    let mut h = Harness::new(10, SimBackend::instant(), CacheConfig::default());
    h.ctl.update_position(2);
    h.clock.advance_ms(300);
    h.ctl.tick();
    h.ctl.tick();
    assert_eq!(h.sim(2).status(), MediaStatus::Playing);
    h.sim(2).clear_calls();

    let url = h.ctl.feed().url_of(2).unwrap().clone();
    let outcome = h.ctl.coordinator_mut().activate(2, &url);
    assert_eq!(outcome, ActivateOutcome::Duplicate);
    assert!(!h.sim(2).calls().contains(&HandleCall::Pause));
    assert!(!h.sim(2).calls().contains(&HandleCall::Seek(0.0)));
    assert_eq!(h.sim(2).status(), MediaStatus::Playing);
}

#[test]
fn prefetch_keeps_warm_set_inside_window() {
    let config = CacheConfig {
        policy: BoundPolicy::Window,
        ..CacheConfig::default()
    };
    let mut h = Harness::new(20, SimBackend::instant(), config);
    for target in [1, 2, 3, 7, 8, 15, 14] {
        h.ctl.update_position(target);
        h.clock.advance_ms(300);
        h.ctl.tick();

        let mut allowed: HashSet<usize> = proximate(target, 20, 3).iter().map(|p| p.index).collect();
        allowed.insert(target);
        for index in h.ctl.coordinator().cache().indices() {
            assert!(allowed.contains(&index), "index {} warm around {}", index, target);
        }
        assert!(h.live_per_index().iter().all(|&n| n <= 1));
    }
}

#[test]
fn strict_bound_caps_warm_entries() {
    let mut h = Harness::new(20, SimBackend::instant(), CacheConfig::default());
    for target in [5, 6, 7, 12] {
        h.ctl.update_position(target);
        h.clock.advance_ms(300);
        h.ctl.tick();
        let warm = h.ctl.coordinator().cache().indices();
        assert!(warm.len() <= 5, "{:?}", warm);
        assert!(warm.contains(&target));
    }
}

#[test]
fn binding_failure_never_leaves_spinner() {
    let mut h = Harness::new(10, SimBackend::new(), CacheConfig::default());
    h.ctl.on_appear();
    h.settle();

    h.ctl.update_position(1);
    h.clock.advance_ms(300);
    h.sim(1).fail("404");
    h.ctl.tick();
    h.ctl.tick();

    let state = h.ctl.state();
    assert!(!state.is_loading);
    assert_eq!(state.active_index, Some(1));
    assert_eq!(state.phase, PlaybackPhase::Failed);
    assert!(h.ctl.coordinator().active_handle().is_none());

    // swiping on recovers normally
    h.ctl.update_position(2);
    h.clock.advance_ms(300);
    h.ctl.tick();
    h.settle();
    assert_eq!(h.ctl.state().phase, PlaybackPhase::Playing);
}

#[test]
fn failed_index_rebinds_after_swiping_back() {
    let mut h = Harness::new(10, SimBackend::new(), CacheConfig::default());
    h.ctl.on_appear();
    h.settle();
    h.ctl.update_position(1);
    h.clock.advance_ms(300);
    h.ctl.tick();

    let failed = h.sim(1);
    failed.fail("network blip");
    h.ctl.tick();
    assert_eq!(h.ctl.state().phase, PlaybackPhase::Failed);
    assert!(!h.ctl.coordinator().cache().is_warm(1));

    for target in [2, 1] {
        h.ctl.update_position(target);
        h.clock.advance_ms(300);
        h.ctl.tick();
        h.settle();
    }

    let url = h.ctl.feed().url_of(1).unwrap();
    let opened_for_one = h.backend.opened().iter().filter(|s| s.url() == url).count();
    assert_eq!(opened_for_one, 2);
    assert_eq!(failed.status(), MediaStatus::Unbound);
    assert_ne!(h.ctl.coordinator().active_handle().unwrap().id(), failed.id());
    assert_eq!(h.ctl.state().phase, PlaybackPhase::Playing);
    assert_eq!(h.ctl.state().active_index, Some(1));
}

#[test]
fn lifecycle_hooks() {
    let mut h = Harness::new(10, SimBackend::instant(), CacheConfig::default());
    assert_eq!(h.ctl.on_appear(), ActivateOutcome::Started);
    h.ctl.update_position(4);
    h.clock.advance_ms(300);
    h.ctl.tick();

    h.ctl.pause();
    assert_eq!(h.ctl.on_app_resumed(), ActivateOutcome::Started);
    assert_eq!(h.ctl.current_index(), 4);
    assert_eq!(h.sim(4).status(), MediaStatus::Playing);

    h.ctl.on_disappear();
    h.ctl.on_disappear();
    assert!(h.ctl.coordinator().cache().is_empty());
    assert!(h.backend.opened().iter().all(|s| s.status() == MediaStatus::Unbound));
}

#[test]
fn stale_primes_skipped_after_fast_swipes() {
    let mut h = Harness::new(30, SimBackend::new(), CacheConfig::default());
    h.ctl.on_appear();
    for target in [10, 20] {
        h.ctl.update_position(target);
        h.clock.advance_ms(300);
        h.ctl.tick();
    }
    h.pool.run_pending();

    // neighbours of 10 were evicted before their primes could run
    let url = h.ctl.feed().url_of(11).unwrap();
    let primed = h
        .backend
        .latest_for(url)
        .unwrap()
        .calls()
        .iter()
        .any(|c| matches!(c, HandleCall::ForwardBuffer(_)));
    assert!(!primed);
    assert!(h.sim(21).calls().contains(&HandleCall::ForwardBuffer(1.0)));
}

#[test]
fn concurrent_acquire_and_prefetch_one_live_entry_per_index() {
    let base = Url::parse("https://cdn.example.com/v/").unwrap();
    let feed = Arc::new(Feed::synthetic(&base, 12).unwrap());
    let backend = Arc::new(SimBackend::instant());
    let bus = SignalBus::new();
    let store = Arc::new(Mutex::new(CacheStore::new(
        Arc::clone(&feed),
        backend.clone(),
        Arc::new(ManualPool::new()),
        bus.sink(),
        CacheConfig::default(),
    )));

    let threads: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            let feed = Arc::clone(&feed);
            thread::spawn(move || {
                for round in 0..50 {
                    let index = (t + round) % 3;
                    let mut store = store.lock().unwrap();
                    if round % 2 == 0 {
                        store.acquire(index, feed.url_of(index).unwrap()).unwrap();
                    } else {
                        store.prefetch(index, feed.len());
                    }
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    for index in 0..feed.len() {
        assert!(backend.live_for(feed.url_of(index).unwrap()).len() <= 1, "index {}", index);
    }
}

#[test]
fn threaded_workers_prime_neighbours() {
    let base = Url::parse("https://cdn.example.com/v/").unwrap();
    let feed = Arc::new(Feed::synthetic(&base, 8).unwrap());
    let backend = Arc::new(SimBackend::instant());
    let workers: Arc<dyn WorkerPool> = Arc::new(Workers::new(2).unwrap());
    let mut coordinator =
        PlaybackCoordinator::with_backend(Arc::clone(&feed), backend.clone(), workers, CacheConfig::default());

    coordinator.activate(0, feed.url_of(0).unwrap());

    let next = backend.latest_for(feed.url_of(1).unwrap()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while !next.calls().contains(&HandleCall::Seek(0.0)) {
        assert!(Instant::now() < deadline, "neighbour never primed");
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(
        next.calls(),
        vec![HandleCall::ForwardBuffer(1.0), HandleCall::Seek(0.01), HandleCall::Seek(0.0)]
    );
    assert_eq!(next.status(), MediaStatus::Ready);
    assert_ne!(next.id(), coordinator.active_handle().unwrap().id());
}

#[test]
fn sample_feed_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/sample_feed.json");
    let feed = Feed::load(&path).unwrap();
    assert_eq!(feed.len(), 5);
    assert_eq!(feed.get(2).unwrap().metadata.username, "@clipper3");
    assert!(feed.url_of(4).unwrap().as_str().ends_with(".mp4"));
}

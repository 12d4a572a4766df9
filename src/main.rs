use clipfeed::cli::{self, Args, Step};
use clipfeed::config::{self, FeedSettings};
use clipfeed::core::{FeedPositionController, PlaybackCoordinator, Workers};
use clipfeed::entities::media::{HandleId, MediaHandle, MediaStatus};
use clipfeed::entities::{Clock, Feed, SystemClock, WorkerPool};
use clipfeed::sim::SimBackend;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Update loop period of the simulated session
const FRAME: Duration = Duration::from_millis(16);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    step: String,
    current_index: usize,
    state: &'a clipfeed::core::PlaybackState,
    warm: Vec<usize>,
    cache: clipfeed::core::CacheStatsSnapshot,
}

/// Scripted session against the simulated backend, driven in real time.
struct Session {
    controller: FeedPositionController,
    backend: Arc<SimBackend>,
    clock: Arc<dyn Clock>,
    latency: Duration,
    /// First time each handle was seen binding
    seen: HashMap<HandleId, Instant>,
    json: bool,
}

impl Session {
    /// Run the update loop for `duration`.
    fn run_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            self.complete_loading();
            if let Some(index) = self.controller.tick() {
                debug!("Session: activation fired for {}", index);
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(FRAME);
        }
    }

    /// Report ready on handles that have been binding longer than the latency.
    fn complete_loading(&mut self) {
        let now = self.clock.now();
        for handle in self.backend.opened() {
            if handle.status() != MediaStatus::Binding {
                continue;
            }
            let since = *self.seen.entry(handle.id()).or_insert(now);
            if now.duration_since(since) >= self.latency {
                handle.finish_loading();
            }
        }
    }

    fn report(&self, step: &str) -> Result<()> {
        let coordinator = self.controller.coordinator();
        let snapshot = Snapshot {
            step: step.to_string(),
            current_index: self.controller.current_index(),
            state: coordinator.state(),
            warm: coordinator.cache().indices(),
            cache: coordinator.cache().stats(),
        };
        if self.json {
            println!("{}", serde_json::to_string(&snapshot).context("Failed to serialize snapshot")?);
        } else {
            let state = snapshot.state;
            println!(
                "{:<10} pos={:<3} active={:<5} phase={:<8} loading={:<5} warm={:?}{}",
                snapshot.step,
                snapshot.current_index,
                state.active_index.map_or("-".to_string(), |i| i.to_string()),
                format!("{:?}", state.phase),
                state.is_loading,
                snapshot.warm,
                state
                    .last_error
                    .as_ref()
                    .map(|e| format!(" error={}", e))
                    .unwrap_or_default(),
            );
        }
        Ok(())
    }
}

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("clipfeed starting...");
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::SETTINGS_FILE, &path_config);
    info!("Settings path: {}", settings_path.display());
    let mut settings = FeedSettings::load_or_default(&settings_path)?;
    if let Some(ms) = args.debounce_ms {
        settings.debounce_ms = ms;
    }
    if let Some(n) = args.workers {
        settings.workers = n;
    }

    let feed = match &args.feed {
        Some(path) => Feed::load(path)?,
        None => {
            let base = Url::parse(&args.base_url)
                .with_context(|| format!("Invalid base URL: {}", args.base_url))?;
            Feed::synthetic(&base, args.items)?
        }
    };
    let feed = Arc::new(feed);
    info!("Feed: {} items", feed.len());

    let steps = cli::parse_script(&args.script).map_err(|e| anyhow!(e))?;

    let backend = Arc::new(SimBackend::new());
    for &index in &args.fail {
        match feed.url_of(index) {
            Some(url) => backend.reject(url),
            None => warn!("--fail {} is outside the feed, ignored", index),
        }
    }

    let workers = if settings.workers == 0 {
        Workers::auto()
    } else {
        Workers::new(settings.workers)
    }
    .context("Failed to start priming workers")?;
    info!("Priming workers: {}", workers.threads());
    let workers: Arc<dyn WorkerPool> = Arc::new(workers);

    let coordinator = PlaybackCoordinator::with_backend(
        Arc::clone(&feed),
        backend.clone(),
        workers,
        settings.cache_config(),
    );
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controller = FeedPositionController::new(coordinator, Arc::clone(&clock), settings.debounce());

    let mut session = Session {
        controller,
        backend,
        clock,
        latency: Duration::from_millis(args.latency_ms),
        seen: HashMap::new(),
        json: args.json,
    };

    session.controller.on_appear();
    session.report("appear")?;
    let warmup = session.latency + FRAME;
    session.run_for(warmup);
    session.report("loaded")?;

    for step in steps {
        match step {
            Step::Swipe(index) => {
                session.controller.update_position(index);
                session.run_for(FRAME);
                session.report(&format!("swipe {}", index))?;
            }
            Step::Wait(ms) => {
                session.run_for(Duration::from_millis(ms));
                session.report(&format!("wait {}", ms))?;
            }
        }
    }

    session.controller.on_disappear();
    session.report("disappear")?;

    let stats = session.controller.coordinator().cache().stats();
    info!(
        "Session done: {} activations, cache hit rate {:.0}%",
        session.controller.activation_count(),
        stats.hit_rate() * 100.0
    );
    Ok(())
}

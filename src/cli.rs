use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Backend: simulated\n",
    "Target:  ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Short-form video feed playback coordinator (simulated session)
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Feed catalog JSON (array of {id, media_url, metadata})
    #[arg(value_name = "FEED")]
    pub feed: Option<PathBuf>,

    /// Synthesize this many items when no feed file is given
    #[arg(short = 'n', long = "items", value_name = "N", default_value_t = 12)]
    pub items: usize,

    /// Base URL for synthesized items
    #[arg(long = "base-url", value_name = "URL", default_value = "https://cdn.example.com/clips/")]
    pub base_url: String,

    /// Swipe script: comma-separated positions and `+N` pauses in ms (e.g. "1,2,+400,3")
    #[arg(short = 's', long = "script", value_name = "STEPS", default_value = "1,2,3,+400,4,+400,3,+400")]
    pub script: String,

    /// Make simulated handles fail to bind for these feed indices
    #[arg(long = "fail", value_name = "INDEX")]
    pub fail: Vec<usize>,

    /// Simulated loading latency before a handle reports ready (ms)
    #[arg(long = "latency", value_name = "MS", default_value_t = 80)]
    pub latency_ms: u64,

    /// Override settle delay (ms)
    #[arg(long = "debounce", value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Override priming worker threads
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Print a JSON state snapshot after every step
    #[arg(long = "json")]
    pub json: bool,

    /// Enable debug logging to file (default: clipfeed.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

/// One step of a swipe script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Scroll to this position
    Swipe(usize),
    /// Let this many ms pass
    Wait(u64),
}

/// Parse `"1,2,+400,3"` into steps. Blank entries are skipped.
pub fn parse_script(script: &str) -> Result<Vec<Step>, String> {
    script
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|token| {
            if let Some(ms) = token.strip_prefix('+') {
                ms.parse::<u64>()
                    .map(Step::Wait)
                    .map_err(|e| format!("Bad wait '{}': {}", token, e))
            } else {
                token
                    .parse::<usize>()
                    .map(Step::Swipe)
                    .map_err(|e| format!("Bad position '{}': {}", token, e))
            }
        })
        .collect()
}

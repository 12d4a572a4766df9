//! Settings file and application paths.
//!
//! [`FeedSettings`] is a flat JSON document; any missing field takes its
//! default, so an empty `{}` is a valid settings file.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::cache_store::{BoundPolicy, CacheConfig};

/// Settings file name
pub const SETTINGS_FILE: &str = "clipfeed.json";
/// Default log file name
pub const LOG_FILE: &str = "clipfeed.log";
/// Environment override for the config directory
pub const CONFIG_DIR_ENV: &str = "CLIPFEED_CONFIG_DIR";

const APP_DIR: &str = "clipfeed";

/// Upper clamp for `prefetch_radius`
pub const MAX_PREFETCH_RADIUS: usize = 32;
/// Upper clamp for `cache_bound`
pub const MAX_CACHE_BOUND: usize = 2 * MAX_PREFETCH_RADIUS + 1;

/// Tunables for the feed engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Settle delay before a scroll position activates, ms
    pub debounce_ms: u64,
    /// Max warm handles after a prefetch cycle
    pub cache_bound: usize,
    /// Neighbours each side considered proximate
    pub prefetch_radius: usize,
    /// Neighbours each side primed on prefetch
    pub prime_radius: usize,
    pub prime_offset_secs: f64,
    pub bound_policy: BoundPolicy,
    /// Priming threads, 0 = auto
    pub workers: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        let cache = CacheConfig::default();
        Self {
            debounce_ms: 300,
            cache_bound: cache.bound,
            prefetch_radius: cache.radius,
            prime_radius: cache.prime_radius,
            prime_offset_secs: cache.prime_offset_secs,
            bound_policy: cache.policy,
            workers: 0,
        }
    }
}

impl FeedSettings {
    /// Read settings from `path`, then clamp.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: FeedSettings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(settings.validated())
    }

    /// Like [`load`](Self::load), but a missing file yields defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let settings = Self::load(path)?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }

    /// Clamp values that would make the cache unusable.
    pub fn validated(self) -> Self {
        let prefetch_radius = self.prefetch_radius.clamp(1, MAX_PREFETCH_RADIUS);
        Self {
            cache_bound: self.cache_bound.clamp(1, MAX_CACHE_BOUND),
            prefetch_radius,
            prime_radius: self.prime_radius.min(prefetch_radius),
            prime_offset_secs: if self.prime_offset_secs.is_finite() {
                self.prime_offset_secs.max(0.0)
            } else {
                0.0
            },
            ..self
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            bound: self.cache_bound,
            radius: self.prefetch_radius,
            prime_radius: self.prime_radius,
            prime_offset_secs: self.prime_offset_secs,
            policy: self.bound_policy,
        }
    }
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args, then `CLIPFEED_CONFIG_DIR`, then None (defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. CLI --config-dir argument
/// 2. CLIPFEED_CONFIG_DIR environment variable
/// 3. Local folder IF clipfeed.json or clipfeed.log exist there
/// 4. Platform config directory from dirs-next (`~/.config/clipfeed` on Linux)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir).join(name)
}

/// Path to a data file (logs), same priority as [`config_file`] but ending in
/// the platform data directory (`~/.local/share/clipfeed` on Linux).
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir).join(name)
}

/// Create config and data directories if missing.
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = resolve_dir(config, dirs_next::config_dir);
    let data_dir = resolve_dir(config, dirs_next::data_dir);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform: fn() -> Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Ok(current_dir) = std::env::current_dir()
        && has_local_config_files(&current_dir)
    {
        return current_dir;
    }
    platform()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("clipfeed_test_{}_{}", name, std::process::id()));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    #[test]
    fn test_custom_dir_wins() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("a.json", &config), PathBuf::from("/custom/a.json"));
        assert_eq!(data_file("b.log", &config), PathBuf::from("/custom/b.log"));
    }

    #[test]
    fn test_cli_dir_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from-cli")));
    }

    #[test]
    fn test_defaults() {
        let s = FeedSettings::default();
        assert_eq!(s.debounce(), Duration::from_millis(300));
        assert_eq!(s.cache_config(), CacheConfig::default());
        assert_eq!(s.workers, 0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s: FeedSettings = serde_json::from_str(r#"{"debounce_ms": 120, "bound_policy": "window"}"#).unwrap();
        assert_eq!(s.debounce_ms, 120);
        assert_eq!(s.bound_policy, BoundPolicy::Window);
        assert_eq!(s.cache_bound, 5);
    }

    #[test]
    fn test_validated_clamps() {
        let s = FeedSettings {
            cache_bound: 0,
            prefetch_radius: 0,
            prime_radius: 4,
            prime_offset_secs: f64::NAN,
            ..FeedSettings::default()
        }
        .validated();
        assert_eq!(s.cache_bound, 1);
        assert_eq!(s.prefetch_radius, 1);
        assert_eq!(s.prime_radius, 1);
        assert_eq!(s.prime_offset_secs, 0.0);
    }

    #[test]
    fn test_validated_caps_huge_values() {
        let s = FeedSettings {
            cache_bound: usize::MAX,
            prefetch_radius: usize::MAX,
            prime_radius: usize::MAX,
            ..FeedSettings::default()
        }
        .validated();
        assert_eq!(s.prefetch_radius, MAX_PREFETCH_RADIUS);
        assert_eq!(s.cache_bound, MAX_CACHE_BOUND);
        assert_eq!(s.prime_radius, MAX_PREFETCH_RADIUS);

        let parsed: FeedSettings = serde_json::from_str(r#"{"prefetch_radius": 1000000}"#).unwrap();
        assert_eq!(parsed.validated().prefetch_radius, MAX_PREFETCH_RADIUS);
    }

    #[test]
    fn test_save_then_load() {
        let dir = temp_dir("settings");
        let path = dir.join(SETTINGS_FILE);
        let s = FeedSettings {
            debounce_ms: 50,
            workers: 2,
            ..FeedSettings::default()
        };
        s.save(&path).unwrap();
        assert_eq!(FeedSettings::load(&path).unwrap(), s);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = temp_dir("missing");
        let s = FeedSettings::load_or_default(&dir.join("nope.json")).unwrap();
        assert_eq!(s, FeedSettings::default());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = temp_dir("garbage");
        let path = dir.join(SETTINGS_FILE);
        std::fs::write(&path, "not json").unwrap();
        let err = FeedSettings::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

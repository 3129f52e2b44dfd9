//! TOML configuration for the DJ scheduler.
//!
//! Every section falls back to compiled-in defaults, so an empty file (or no
//! file at all) gives a working setup. Individual keys can be patched from the
//! environment as `DJ_<SECTION>_<KEY>`, e.g. `DJ_RATING_MIN_HATERS=5`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "DJ_SCHEDULER_CONFIG";

/// Config file looked up in the working directory as a last resort.
pub const DEFAULT_CONFIG_FILE: &str = "dj-scheduler.toml";

const ENV_PREFIX: &str = "DJ_";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the scheduler process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub rating: RatingConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub users: UsersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SchedulerConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded scheduler configuration");
        Ok(config)
    }

    /// Resolve the effective configuration.
    ///
    /// 1. `explicit` (from `--config`); a failure here is an error.
    /// 2. The file named by `DJ_SCHEDULER_CONFIG`.
    /// 3. `./dj-scheduler.toml`.
    /// 4. Compiled-in defaults.
    ///
    /// `DJ_<SECTION>_<KEY>` overrides are applied on top in every case.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let base = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(),
        };
        base.with_env_overrides(std::env::vars())
    }

    fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "DJ_SCHEDULER_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    /// Patch scalar keys from `DJ_<SECTION>_<KEY>` variables.
    ///
    /// The replacement is parsed according to the type of the value it
    /// replaces; list values take a comma-separated string. Variables that
    /// name no known key are ignored.
    pub fn with_env_overrides<I>(self, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut doc = toml::Value::try_from(&self).context("failed to encode configuration")?;
        let Some(root) = doc.as_table_mut() else {
            return Ok(self);
        };

        let mut patched = false;
        for (name, raw) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let rest = rest.to_ascii_lowercase();
            let Some((section, key)) = root
                .keys()
                .filter_map(|s| {
                    rest.strip_prefix(s.as_str())
                        .and_then(|r| r.strip_prefix('_'))
                        .map(|k| (s.clone(), k.to_string()))
                })
                .next()
            else {
                continue;
            };
            let Some(slot) = root
                .get_mut(&section)
                .and_then(toml::Value::as_table_mut)
                .and_then(|t| t.get_mut(&key))
            else {
                continue;
            };

            *slot = parse_like(slot, &raw)
                .with_context(|| format!("invalid value for {}: {:?}", name, raw))?;
            debug!(section = %section, key = %key, "configuration overridden from environment");
            patched = true;
        }

        if !patched {
            return Ok(self);
        }
        doc.try_into::<Self>()
            .context("environment overrides produced an invalid configuration")
    }
}

fn parse_like(current: &toml::Value, raw: &str) -> Result<toml::Value> {
    use toml::Value;
    Ok(match current {
        Value::Integer(_) => Value::Integer(raw.trim().parse()?),
        Value::Float(_) => Value::Float(raw.trim().parse()?),
        Value::Boolean(_) => Value::Boolean(raw.trim().parse()?),
        Value::Array(_) => Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| match s.parse::<i64>() {
                    Ok(n) => Value::Integer(n),
                    Err(_) => Value::String(s.to_string()),
                })
                .collect(),
        ),
        _ => Value::String(raw.to_string()),
    })
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Where queue state and fallback media live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Snapshot written at shutdown and read at startup.
    pub snapshot_path: PathBuf,
    /// Directory scanned for backlog media.
    pub fallback_media_dir: PathBuf,
    /// File extensions accepted from the fallback directory.
    pub fallback_extensions: Vec<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("queue.json"),
            fallback_media_dir: PathBuf::from("media_fallback"),
            fallback_extensions: ["mp3", "ogg", "flac", "m4a", "opus", "wav"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Rating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Fraction of active listeners whose dislike ejects a track.
    pub threshold: f64,
    /// Minimum number of active haters before the fraction is considered.
    pub min_haters: usize,
    /// How recently a listener must have acted to count as active.
    pub active_window_minutes: u64,
    /// Period of the background rating sweep.
    pub sweep_interval_sec: u64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            min_haters: 3,
            active_window_minutes: 60,
            sweep_interval_sec: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Per-user submission quota. Superusers are exempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestsConfig {
    pub limit: u32,
    pub interval_sec: u64,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            interval_sec: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Settings for the built-in timed playback driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Play time assumed for tracks whose duration is unknown.
    pub default_track_sec: u64,
    /// How early the next track is started before the current one ends.
    pub end_margin_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_track_sec: 180,
            end_margin_ms: 300,
        }
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8910".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Seed for the in-process user directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    pub superusers: Vec<i64>,
    pub banned: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level, used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_sane() {
        let cfg = SchedulerConfig::default();

        assert_eq!(cfg.queue.snapshot_path, PathBuf::from("queue.json"));
        assert_eq!(cfg.queue.fallback_media_dir, PathBuf::from("media_fallback"));
        assert!(cfg.queue.fallback_extensions.contains(&"mp3".to_string()));

        assert_eq!(cfg.rating.threshold, 0.3);
        assert_eq!(cfg.rating.min_haters, 3);
        assert_eq!(cfg.rating.active_window_minutes, 60);
        assert_eq!(cfg.rating.sweep_interval_sec, 30);

        assert_eq!(cfg.requests.limit, 10);
        assert_eq!(cfg.requests.interval_sec, 600);

        assert_eq!(cfg.playback.default_track_sec, 180);
        assert_eq!(cfg.playback.end_margin_ms, 300);

        assert_eq!(cfg.api.bind, "127.0.0.1:8910");
        assert!(cfg.users.superusers.is_empty());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[queue]
snapshot_path = "/var/lib/dj/queue.json"
fallback_media_dir = "/srv/music/fallback"
fallback_extensions = ["mp3"]

[rating]
threshold = 0.5
min_haters = 4
active_window_minutes = 30
sweep_interval_sec = 10

[requests]
limit = 3
interval_sec = 60

[users]
superusers = [1, 2]
banned = [66]

[logging]
level = "debug"
json = true
"#;

        let cfg: SchedulerConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.queue.snapshot_path, PathBuf::from("/var/lib/dj/queue.json"));
        assert_eq!(cfg.queue.fallback_extensions, vec!["mp3".to_string()]);
        assert_eq!(cfg.rating.threshold, 0.5);
        assert_eq!(cfg.rating.min_haters, 4);
        assert_eq!(cfg.rating.active_window_minutes, 30);
        assert_eq!(cfg.requests.limit, 3);
        assert_eq!(cfg.users.superusers, vec![1, 2]);
        assert_eq!(cfg.users.banned, vec![66]);
        assert!(cfg.logging.json);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.api.bind, "127.0.0.1:8910");
        assert_eq!(cfg.playback.default_track_sec, 180);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: SchedulerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.rating.min_haters, RatingConfig::default().min_haters);
        assert_eq!(cfg.api.bind, ApiConfig::default().bind);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dj-scheduler.toml");
        std::fs::write(&path, "[api]\nbind = \"0.0.0.0:9999\"\n").unwrap();

        let cfg = SchedulerConfig::load(&path).unwrap();
        assert_eq!(cfg.api.bind, "0.0.0.0:9999");
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(SchedulerConfig::load(Path::new("/nonexistent/dj-scheduler.toml")).is_err());
    }

    #[test]
    fn test_env_overrides_patch_typed_values() {
        let cfg = SchedulerConfig::default()
            .with_env_overrides(vars(&[
                ("DJ_RATING_MIN_HATERS", "5"),
                ("DJ_RATING_THRESHOLD", "0.25"),
                ("DJ_LOGGING_JSON", "true"),
                ("DJ_API_BIND", "0.0.0.0:1234"),
                ("DJ_USERS_SUPERUSERS", "7, 8"),
                ("DJ_QUEUE_SNAPSHOT_PATH", "/tmp/q.json"),
                ("DJ_SCHEDULER_CONFIG", "/ignored.toml"),
                ("DJ_RATING_UNKNOWN_KEY", "1"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert_eq!(cfg.rating.min_haters, 5);
        assert_eq!(cfg.rating.threshold, 0.25);
        assert!(cfg.logging.json);
        assert_eq!(cfg.api.bind, "0.0.0.0:1234");
        assert_eq!(cfg.users.superusers, vec![7, 8]);
        assert_eq!(cfg.queue.snapshot_path, PathBuf::from("/tmp/q.json"));
    }

    #[test]
    fn test_env_override_rejects_bad_number() {
        let result = SchedulerConfig::default()
            .with_env_overrides(vars(&[("DJ_RATING_MIN_HATERS", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = SchedulerConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let back: SchedulerConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.queue.snapshot_path, cfg.queue.snapshot_path);
        assert_eq!(back.rating.threshold, cfg.rating.threshold);
    }
}

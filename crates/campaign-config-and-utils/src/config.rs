//! Configuration management for the campaign services.
//!
//! `Config` is read once at startup (file, then environment), validated, and
//! then only read. The pipeline and scheduler take copies of their sections
//! at construction.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default channel API base URL.
pub const DEFAULT_CHANNEL_API_URL: &str = "https://graph.facebook.com/v21.0";

/// Largest accepted catch-up window behind `now`.
pub const LOOKBACK_CAP_MINUTES: u64 = 60;

/// Largest accepted window ahead of `now`.
pub const LOOKAHEAD_CAP_MINUTES: u64 = 10;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub channel: ChannelSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Build and dispatch sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Mobiles per attribute lookup call.
    pub batch_size: usize,
    /// Recipients built and serialized per chunk.
    pub build_batch_size: usize,
    /// Serialized items per channel request.
    pub dispatch_chunk_size: usize,
    /// Chunk sends allowed in flight at once.
    pub max_concurrent_chunks: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 200,
            build_batch_size: 500,
            dispatch_chunk_size: 100,
            max_concurrent_chunks: 16,
        }
    }
}

/// Scheduled broadcast polling and release cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub poll_interval_secs: u64,
    pub release_interval_ms: u64,
    pub lookback_minutes: u64,
    pub lookahead_minutes: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 300,
            release_interval_ms: 1000,
            lookback_minutes: 10,
            lookahead_minutes: 2,
        }
    }
}

impl SchedulerSettings {
    /// Never shorter than one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Never shorter than one millisecond.
    pub fn release_interval(&self) -> Duration {
        Duration::from_millis(self.release_interval_ms.max(1))
    }

    /// Catch-up window behind `now`, clamped to [`LOOKBACK_CAP_MINUTES`].
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_minutes.min(LOOKBACK_CAP_MINUTES) * 60)
    }

    /// Window ahead of `now`, clamped to [`LOOKAHEAD_CAP_MINUTES`].
    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_minutes.min(LOOKAHEAD_CAP_MINUTES) * 60)
    }
}

/// Channel client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CHANNEL_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl ChannelSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            pipeline: PipelineSettings::default(),
            scheduler: SchedulerSettings::default(),
            channel: ChannelSettings::default(),
        }
    }
}

impl Config {
    /// Defaults overridden from the process environment.
    pub fn new() -> CoreResult<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the config file (defaults when absent), then
    /// apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let mut config = Self::load_unvalidated(paths)?;
        config.validate()?;
        Ok(config)
    }

    /// File plus environment overrides, without [`Config::validate`]. Lets a
    /// process pick its log level before the window clamps are reported.
    pub fn load_unvalidated(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `CAMPAIGN_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(level) = text("CAMPAIGN_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = text("CAMPAIGN_CHANNEL_API_URL") {
            self.channel.api_url = url;
        }

        let numbers: [(&str, &mut u64); 5] = [
            ("CAMPAIGN_POLL_INTERVAL_SECS", &mut self.scheduler.poll_interval_secs),
            ("CAMPAIGN_RELEASE_INTERVAL_MS", &mut self.scheduler.release_interval_ms),
            ("CAMPAIGN_LOOKBACK_MINUTES", &mut self.scheduler.lookback_minutes),
            ("CAMPAIGN_LOOKAHEAD_MINUTES", &mut self.scheduler.lookahead_minutes),
            ("CAMPAIGN_CHANNEL_TIMEOUT_SECS", &mut self.channel.timeout_secs),
        ];
        for (key, slot) in numbers {
            if let Some(raw) = text(key) {
                *slot = parse_number(key, &raw)?;
            }
        }

        let sizes: [(&str, &mut usize); 4] = [
            ("CAMPAIGN_BATCH_SIZE", &mut self.pipeline.batch_size),
            ("CAMPAIGN_BUILD_BATCH_SIZE", &mut self.pipeline.build_batch_size),
            ("CAMPAIGN_DISPATCH_CHUNK_SIZE", &mut self.pipeline.dispatch_chunk_size),
            ("CAMPAIGN_MAX_CONCURRENT_CHUNKS", &mut self.pipeline.max_concurrent_chunks),
        ];
        for (key, slot) in sizes {
            if let Some(raw) = text(key) {
                *slot = parse_number(key, &raw)?;
            }
        }

        Ok(())
    }

    /// Reject zero sizes/intervals and bad URLs; clamp scheduler windows to
    /// their caps.
    pub fn validate(&mut self) -> CoreResult<()> {
        let positive = [
            ("pipeline.batch_size", self.pipeline.batch_size as u64),
            ("pipeline.build_batch_size", self.pipeline.build_batch_size as u64),
            ("pipeline.dispatch_chunk_size", self.pipeline.dispatch_chunk_size as u64),
            ("pipeline.max_concurrent_chunks", self.pipeline.max_concurrent_chunks as u64),
            ("scheduler.poll_interval_secs", self.scheduler.poll_interval_secs),
            ("scheduler.release_interval_ms", self.scheduler.release_interval_ms),
            ("channel.timeout_secs", self.channel.timeout_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(CoreError::Config(format!("{name} must be at least 1")));
        }

        if self.scheduler.lookback_minutes > LOOKBACK_CAP_MINUTES {
            warn!(
                requested = self.scheduler.lookback_minutes,
                cap = LOOKBACK_CAP_MINUTES,
                "Lookback window capped"
            );
            self.scheduler.lookback_minutes = LOOKBACK_CAP_MINUTES;
        }
        if self.scheduler.lookahead_minutes > LOOKAHEAD_CAP_MINUTES {
            warn!(
                requested = self.scheduler.lookahead_minutes,
                cap = LOOKAHEAD_CAP_MINUTES,
                "Lookahead window capped"
            );
            self.scheduler.lookahead_minutes = LOOKAHEAD_CAP_MINUTES;
        }

        self.channel_url()?;
        Ok(())
    }

    /// Sizing handed to the batch builder and dispatch coordinator.
    pub fn pipeline_config(&self) -> PipelineSettings {
        self.pipeline
    }

    /// Cadence and windows handed to the scheduler.
    pub fn scheduler_config(&self) -> SchedulerSettings {
        self.scheduler
    }

    /// Get the channel API URL as a parsed URL.
    pub fn channel_url(&self) -> CoreResult<Url> {
        Url::parse(&self.channel.api_url).map_err(CoreError::from)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> CoreResult<T> {
    raw.parse()
        .map_err(|_| CoreError::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.pipeline.batch_size, 200);
        assert_eq!(config.pipeline.build_batch_size, 500);
        assert_eq!(config.pipeline.dispatch_chunk_size, 100);
        assert_eq!(config.scheduler.poll_interval_secs, 300);
        assert_eq!(config.scheduler.release_interval_ms, 1000);
        assert_eq!(config.scheduler.lookback_minutes, 10);
        assert_eq!(config.scheduler.lookahead_minutes, 2);
    }

    #[test]
    fn test_config_load_from_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(
            &config_path,
            r#"{"log_level": "debug", "pipeline": {"dispatch_chunk_size": 50}}"#,
        )
        .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.pipeline.dispatch_chunk_size, 50);
        assert_eq!(config.pipeline.build_batch_size, 500);
        assert_eq!(config.scheduler, SchedulerSettings::default());
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.pipeline.build_batch_size = 250;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded.pipeline.build_batch_size, 250);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("CAMPAIGN_LOG_LEVEL", "trace"),
                ("CAMPAIGN_DISPATCH_CHUNK_SIZE", "25"),
                ("CAMPAIGN_LOOKBACK_MINUTES", "30"),
                ("CAMPAIGN_BATCH_SIZE", "  "),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "trace");
        assert_eq!(config.pipeline.dispatch_chunk_size, 25);
        assert_eq!(config.scheduler.lookback_minutes, 30);
        assert_eq!(config.pipeline.batch_size, 200);
    }

    #[test]
    fn test_env_rejects_garbage_numbers() {
        let mut config = Config::default();
        let result = config.apply_env(env(&[("CAMPAIGN_BUILD_BATCH_SIZE", "many")]));
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_caps_windows() {
        let mut config = Config::default();
        config.scheduler.lookback_minutes = 600;
        config.scheduler.lookahead_minutes = 11;

        config.validate().unwrap();

        assert_eq!(config.scheduler.lookback_minutes, LOOKBACK_CAP_MINUTES);
        assert_eq!(config.scheduler.lookahead_minutes, LOOKAHEAD_CAP_MINUTES);
    }

    #[test]
    fn test_unvalidated_load_defers_clamping() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(
            paths.config_file(),
            r#"{"log_level": "debug", "scheduler": {"lookback_minutes": 600}}"#,
        )
        .unwrap();

        let mut config = Config::load_unvalidated(&paths).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.scheduler.lookback_minutes, 600);

        config.validate().unwrap();
        assert_eq!(config.scheduler.lookback_minutes, LOOKBACK_CAP_MINUTES);
        assert_eq!(Config::load(&paths).unwrap(), config);
    }

    #[test]
    fn test_scheduler_durations_respect_caps() {
        let settings = SchedulerSettings {
            lookback_minutes: 90,
            ..SchedulerSettings::default()
        };
        assert_eq!(settings.lookback(), Duration::from_secs(60 * 60));
        assert_eq!(settings.lookahead(), Duration::from_secs(2 * 60));
        assert_eq!(settings.release_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_scheduler_periods_are_never_zero() {
        let settings = SchedulerSettings {
            poll_interval_secs: 0,
            release_interval_ms: 0,
            ..SchedulerSettings::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.release_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = Config::default();
        config.pipeline.dispatch_chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_invalid_url() {
        let mut config = Config::default();
        config.channel.api_url = "not a valid url".to_string();

        assert!(config.channel_url().is_err());
        assert!(config.validate().is_err());
    }
}

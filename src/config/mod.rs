use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which synchronization strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyChoice {
    /// Pick from the control plane version
    #[default]
    Auto,
    EventStream,
    Polling,
}

impl std::str::FromStr for StrategyChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(StrategyChoice::Auto),
            "event-stream" => Ok(StrategyChoice::EventStream),
            "polling" => Ok(StrategyChoice::Polling),
            other => anyhow::bail!("unknown sync strategy '{}'", other),
        }
    }
}

/// Synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between two snapshot fetches in polling mode (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay after a failed snapshot fetch (milliseconds)
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Treat undecodable deltas as fatal
    #[serde(default)]
    pub strict_mode: bool,

    #[serde(default)]
    pub strategy: StrategyChoice,

    /// Buffered change events per broadcast subscriber
    #[serde(default = "default_observer_channel_capacity")]
    pub observer_channel_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_observer_channel_capacity() -> usize {
    1000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            strict_mode: false,
            strategy: StrategyChoice::default(),
            observer_channel_capacity: default_observer_channel_capacity(),
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Build from `MODEL_SYNC_*` env vars, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides(|name| std::env::var(name).ok());
        cfg
    }

    /// Overwrite fields for which `lookup` returns a parseable value.
    /// Unparseable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(n) = lookup("MODEL_SYNC_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = n;
        }
        if let Some(n) = lookup("MODEL_SYNC_ERROR_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.error_backoff_ms = n;
        }
        if let Some(b) = lookup("MODEL_SYNC_STRICT_MODE").and_then(|v| v.parse().ok()) {
            self.strict_mode = b;
        }
        if let Some(s) = lookup("MODEL_SYNC_STRATEGY").and_then(|v| v.parse().ok()) {
            self.strategy = s;
        }
        if let Some(n) = lookup("MODEL_SYNC_OBSERVER_CHANNEL_CAPACITY").and_then(|v| v.parse().ok()) {
            self.observer_channel_capacity = n;
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<SyncConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: SyncConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

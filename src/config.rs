use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Engine tuning knobs, loaded from a JSON file by embedders.
///
/// All fields have defaults; an empty object is a valid configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct EngineConfig {
    /// Directory holding per-probe state (history rings, last reports)
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Bounded wait for one check run, in seconds
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Bounded wait for liveness-style checks, in seconds
    #[serde(default = "default_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,

    /// Delay before re-running a failing or non-quiet probe, in seconds
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Delay before re-running a healthy probe, in seconds
    #[serde(default = "default_healthy_delay_secs")]
    pub healthy_delay_secs: u64,

    /// Upper bound for known-expensive checks, in seconds
    #[serde(default = "default_max_healthy_delay_secs")]
    pub max_healthy_delay_secs: u64,

    /// Observer notification debounce window, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Default history ring capacity
    #[serde(default = "default_capacity")]
    pub default_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            default_timeout_secs: default_timeout_secs(),
            liveness_timeout_secs: default_liveness_timeout_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            healthy_delay_secs: default_healthy_delay_secs(),
            max_healthy_delay_secs: default_max_healthy_delay_secs(),
            debounce_ms: default_debounce_ms(),
            default_capacity: default_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs)
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_timeout_secs() -> u64 {
    5 * 60
}

fn default_liveness_timeout_secs() -> u64 {
    60
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_healthy_delay_secs() -> u64 {
    5 * 60
}

fn default_max_healthy_delay_secs() -> u64 {
    12 * 60 * 60
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_capacity() -> usize {
    100
}

pub fn read_config_file(path: &str) -> anyhow::Result<EngineConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

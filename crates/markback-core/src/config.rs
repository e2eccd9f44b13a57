use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing of the highlight reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HighlightConfig {
    /// Period of the pending-highlight retry tick.
    pub retry_interval_ms: u64,
    /// A pending request is dropped once its failed-tick count exceeds this.
    pub max_attempts: u32,
    /// How long a located answer stays highlighted.
    pub duration_ms: u64,
}

impl HighlightConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            retry_interval_ms: 800,
            max_attempts: 40,
            duration_ms: 2400,
        }
    }
}

/// Sender-side retry for cross-surface highlight requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay_ms: 400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    /// Directory holding the file-backed replicated and local stores.
    pub data_dir: PathBuf,
    pub highlight: HighlightConfig,
    pub retry: RetryPolicy,
}

impl CoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            highlight: HighlightConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// `~/.markback`, or `./.markback` when there is no home directory.
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".markback")
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::new(Self::default_data_dir())
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Section of the config store holding the agent's own settings
pub const AGENT_SECTION: &str = "agent";

fn default_min_wait_ms() -> u64 {
    10
}

fn default_idle_wait_ms() -> u64 {
    1000
}

fn default_loopback_limit() -> usize {
    64
}

fn default_stats_window_secs() -> u64 {
    10
}

/// Scheduler tunables, read from the `[agent]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Lower bound of a single transport wait
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,

    /// Wait used when no module declares a tick interval
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Maximum number of self-addressed lines re-dispatched per input
    #[serde(default = "default_loopback_limit")]
    pub loopback_limit: usize,

    /// Length of the rolling scheduling statistics window
    #[serde(default = "default_stats_window_secs")]
    pub stats_window_secs: u64,
}

impl AgentSettings {
    pub fn min_wait(&self) -> Duration {
        Duration::from_millis(self.min_wait_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms.max(self.min_wait_ms))
    }

    pub fn stats_window(&self) -> Duration {
        Duration::from_secs(self.stats_window_secs)
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            min_wait_ms: default_min_wait_ms(),
            idle_wait_ms: default_idle_wait_ms(),
            loopback_limit: default_loopback_limit(),
            stats_window_secs: default_stats_window_secs(),
        }
    }
}

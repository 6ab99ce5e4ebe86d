use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "d_max_size")]
    pub max_size: usize,
    #[serde(default = "d_default_timeout_secs")]
    pub default_timeout_secs: u64,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "d_true")]
    pub enable_backpressure: bool,
    /// Blocking-enqueue wait when backpressure is disabled (§4.6: 5 s).
    #[serde(default = "d_enqueue_wait_secs")]
    pub enqueue_wait_secs: u64,
    #[serde(default = "d_workers")]
    pub workers: usize,
    #[serde(default = "d_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: d_max_size(),
            default_timeout_secs: d_default_timeout_secs(),
            max_concurrent: d_max_concurrent(),
            enable_backpressure: d_true(),
            enqueue_wait_secs: d_enqueue_wait_secs(),
            workers: d_workers(),
            monitor_interval_secs: d_monitor_interval_secs(),
        }
    }
}

fn d_max_size() -> usize {
    1_000
}
fn d_default_timeout_secs() -> u64 {
    30
}
fn d_max_concurrent() -> usize {
    10
}
fn d_true() -> bool {
    true
}
fn d_enqueue_wait_secs() -> u64 {
    5
}
fn d_workers() -> usize {
    5
}
fn d_monitor_interval_secs() -> u64 {
    5
}

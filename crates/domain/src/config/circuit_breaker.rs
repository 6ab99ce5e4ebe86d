use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "d_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "d_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    /// Per-call RPC-level timeout, distinct from `recovery_timeout_secs`.
    #[serde(default = "d_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: d_failure_threshold(),
            recovery_timeout_secs: d_recovery_timeout_secs(),
            call_timeout_secs: d_call_timeout_secs(),
        }
    }
}

fn d_failure_threshold() -> u32 {
    5
}
fn d_recovery_timeout_secs() -> u64 {
    30
}
fn d_call_timeout_secs() -> u64 {
    10
}

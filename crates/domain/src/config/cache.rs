use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_capacity")]
    pub capacity: usize,
    #[serde(default = "d_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: d_capacity(),
            ttl_secs: d_ttl_secs(),
        }
    }
}

fn d_capacity() -> usize {
    1_000
}
fn d_ttl_secs() -> u64 {
    300
}

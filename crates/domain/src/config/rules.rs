use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "d_rules_path")]
    pub path: PathBuf,
    /// File Watcher debounce interval, milliseconds (§4.3 default 1 s).
    #[serde(default = "d_debounce_ms")]
    pub debounce_ms: u64,
    /// Whether to start the File Watcher at all. Disabling is useful for
    /// the one-shot CLI, which loads the rule file once and exits.
    #[serde(default = "d_true")]
    pub watch: bool,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: d_rules_path(),
            debounce_ms: d_debounce_ms(),
            watch: d_true(),
        }
    }
}

fn d_rules_path() -> PathBuf {
    PathBuf::from("rules.yaml")
}
fn d_debounce_ms() -> u64 {
    1_000
}
fn d_true() -> bool {
    true
}

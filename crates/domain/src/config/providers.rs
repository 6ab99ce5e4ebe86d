use serde::{Deserialize, Serialize};

/// Controls how the gateway handles inference-provider initialization at
/// startup, mirroring `LlmStartupPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartupPolicy {
    /// Gateway boots even if zero providers initialize; `sample` rules
    /// then fall through to the rule-based fallback only.
    #[default]
    AllowNone,
    /// Abort startup if no providers successfully initialize.
    RequireOne,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default preference order, by provider id, when a rule does not
    /// set `inference_provider` (§4.8).
    #[serde(default)]
    pub preference: Vec<String>,
    #[serde(default)]
    pub startup_policy: StartupPolicy,
    #[serde(default)]
    pub cli: Option<CliProviderConfig>,
    #[serde(default)]
    pub http: Vec<HttpProviderConfig>,
    /// Rule-based fallback is always available and needs no credentials;
    /// this only overrides its default word lists.
    #[serde(default)]
    pub fallback: FallbackProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            preference: vec!["mock_inference".to_string()],
            startup_policy: StartupPolicy::default(),
            cli: None,
            http: Vec::new(),
            fallback: FallbackProviderConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliProviderConfig {
    pub id: String,
    /// Argv[0]; no shell is ever used to invoke it (§4.7.1).
    pub command: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub append_system_prompt: Option<String>,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn d_max_retries() -> u32 {
    2
}
fn d_retry_delay_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpProviderKind {
    Claude,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    pub id: String,
    pub kind: HttpProviderKind,
    pub base_url: String,
    /// Env var holding the API key (§6: `ANTHROPIC_API_KEY`/`OPENAI_API_KEY`).
    pub api_key_env: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackProviderConfig {
    #[serde(default = "d_dangerous_patterns")]
    pub dangerous_patterns: Vec<String>,
    #[serde(default = "d_protected_paths")]
    pub protected_paths: Vec<String>,
}

impl Default for FallbackProviderConfig {
    fn default() -> Self {
        Self {
            dangerous_patterns: d_dangerous_patterns(),
            protected_paths: d_protected_paths(),
        }
    }
}

fn d_dangerous_patterns() -> Vec<String> {
    [
        "rm -rf",
        "/etc/passwd",
        "sudo rm",
        "chmod 777",
        "dd if=",
        "mkfs",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn d_protected_paths() -> Vec<String> {
    ["/etc/", "/boot/", "C:\\Windows\\"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

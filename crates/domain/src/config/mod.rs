mod cache;
mod circuit_breaker;
mod providers;
mod queue;
mod rules;
mod server;

pub use cache::*;
pub use circuit_breaker::*;
pub use providers::*;
pub use queue::*;
pub use rules::*;
pub use server::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Top-level configuration, loaded from YAML (§6) with every field
/// defaulted so an empty file is a valid, conservative configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues. An empty
    /// vec means the configuration is safe to run with; `Error`-severity
    /// issues should abort startup (§6), `Warning` ones are only logged.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors.allowed_origins.len() == 1 && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if self.rules.path.as_os_str().is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "rules.path".into(),
                message: "path must not be empty".into(),
            });
        }

        if self.queue.max_size == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "queue.max_size".into(),
                message: "max_size must be greater than 0".into(),
            });
        }
        if self.queue.max_concurrent == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "queue.max_concurrent".into(),
                message: "max_concurrent must be greater than 0".into(),
            });
        }
        if self.queue.workers == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "queue.workers".into(),
                message: "workers must be greater than 0".into(),
            });
        }

        if self.circuit_breaker.failure_threshold == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "circuit_breaker.failure_threshold".into(),
                message: "failure_threshold must be greater than 0".into(),
            });
        }

        // Providers: warn when nothing besides the rule-based fallback is
        // configured — the gateway still boots (StartupPolicy::AllowNone
        // is the default) but `sample` rules get no real inference.
        if self.providers.cli.is_none() && self.providers.http.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "providers".into(),
                message: "no CLI or HTTP inference provider configured; sample rules fall back to rule-based inference only".into(),
            });
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        if let Some(cli) = &self.providers.cli {
            if cli.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "providers.cli.id".into(),
                    message: "provider id must not be empty".into(),
                });
            }
            if cli.command.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "providers.cli.command".into(),
                    message: "command must not be empty".into(),
                });
            }
            seen_ids.insert(cli.id.as_str());
        }
        for (i, http) in self.providers.http.iter().enumerate() {
            if http.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.http[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if !http.base_url.starts_with("http://") && !http.base_url.starts_with("https://") {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("providers.http[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        http.base_url
                    ),
                });
            }
            if !http.id.is_empty() && !seen_ids.insert(&http.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("providers.http[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider shadows earlier one",
                        http.id
                    ),
                });
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let cfg = Config::default();
        let issues = cfg.validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn default_config_warns_no_providers() {
        let issues = Config::default().validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "providers" && e.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_port_is_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "server.port" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "server.cors.allowed_origins"));
    }

    #[test]
    fn http_provider_bad_scheme_is_error() {
        let mut cfg = Config::default();
        cfg.providers.http.push(HttpProviderConfig {
            id: "claude".into(),
            kind: HttpProviderKind::Claude,
            base_url: "ftp://example.com".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            model: None,
        });
        let issues = cfg.validate();
        assert!(issues.iter().any(|e| e.field == "providers.http[0].base_url"
            && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn duplicate_provider_ids_is_warning() {
        let mut cfg = Config::default();
        cfg.providers.cli = Some(CliProviderConfig {
            id: "claude".into(),
            command: "claude".into(),
            model: None,
            append_system_prompt: None,
            max_retries: 2,
            retry_delay_ms: 500,
        });
        cfg.providers.http.push(HttpProviderConfig {
            id: "claude".into(),
            kind: HttpProviderKind::Claude,
            base_url: "https://api.anthropic.com".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            model: None,
        });
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.message.contains("duplicate provider id")));
    }

    #[test]
    fn empty_yaml_document_uses_all_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.server.port, 8787);
        assert_eq!(cfg.queue.workers, 5);
    }
}

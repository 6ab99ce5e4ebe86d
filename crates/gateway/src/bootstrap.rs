//! Builds a [`PolicyEngine`] (and everything it depends on) from a
//! [`Config`], shared by the `serve`, `advise`, and `mcp` entry points.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sha2::{Digest, Sha256};
use sp_domain::config::{CliProviderConfig, Config, HttpProviderConfig, StartupPolicy};
use sp_pattern::PatternEngine;
use sp_policy::PolicyEngine;
use sp_providers::{CliProvider, FallbackProvider, HttpProvider, InferenceManager, InferenceProvider};
use sp_resilience::{CircuitBreaker, RequestQueue, ResponseCache};
use sp_rules::{FileWatcher, RuleStore};

use crate::state::AppState;

pub struct Bootstrapped {
    pub state: AppState,
    pub watcher: Option<Arc<FileWatcher>>,
}

/// Build the full dependency graph and start its background tasks
/// (queue workers, cache-invalidation listener, and — when `watch_rules`
/// is set — the rule-file watcher).
pub async fn bootstrap(
    config: Arc<Config>,
    config_path: PathBuf,
    watch_rules: bool,
) -> anyhow::Result<Bootstrapped> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            sp_domain::config::ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            sp_domain::config::ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues
        .iter()
        .any(|i| i.severity == sp_domain::config::ConfigSeverity::Error)
    {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == sp_domain::config::ConfigSeverity::Error)
                .count()
        );
    }

    let pattern_engine = Arc::new(PatternEngine::new());
    tracing::info!("pattern engine ready");

    let rule_store = Arc::new(
        RuleStore::load(&config.rules.path, pattern_engine.clone())
            .context("loading rule file")?,
    );
    tracing::info!(
        path = %config.rules.path.display(),
        rules = rule_store.get_all().len(),
        "rule store ready"
    );

    let watcher = if watch_rules && config.rules.watch && rule_store.path().exists() {
        let w = Arc::new(FileWatcher::new(
            rule_store.clone(),
            Duration::from_millis(config.rules.debounce_ms),
        ));
        w.start().context("starting rule file watcher")?;
        Some(w)
    } else {
        None
    };

    let cache = ResponseCache::new(config.cache.capacity, Duration::from_secs(config.cache.ttl_secs));
    tracing::info!(capacity = config.cache.capacity, ttl_secs = config.cache.ttl_secs, "response cache ready");

    let circuit_breaker = CircuitBreaker::new(config.circuit_breaker);
    tracing::info!("circuit breaker ready");

    let inference = Arc::new(build_inference_manager(&config)?);
    tracing::info!(providers = %inference.health_check().await.total, "inference providers ready");

    let queue = Arc::new(RequestQueue::new(config.queue));
    tracing::info!(workers = config.queue.workers, "request queue ready");

    let engine = Arc::new(PolicyEngine::new(
        rule_store.clone(),
        pattern_engine,
        cache,
        circuit_breaker,
        Some(queue.clone()),
        inference,
        1_000,
        Duration::from_secs(config.queue.default_timeout_secs),
    ));
    engine.start_queue();
    engine.spawn_cache_invalidation();
    tracing::info!("policy engine ready");

    let api_token_hash = {
        let env_var = &config.server.api_token_env;
        match std::env::var(env_var) {
            Ok(token) if !token.is_empty() => {
                tracing::info!(env_var = %env_var, "API bearer-token auth enabled");
                Some(Sha256::digest(token.as_bytes()).to_vec())
            }
            _ => {
                tracing::warn!(env_var = %env_var, "API bearer-token auth DISABLED — set {env_var} to enable");
                None
            }
        }
    };

    let state = AppState {
        config,
        config_path,
        rule_store,
        engine,
        queue,
        api_token_hash,
        shutdown: Arc::new(tokio::sync::Notify::new()),
    };

    Ok(Bootstrapped { state, watcher })
}

/// Build every configured provider plus the always-available rule-based
/// fallback, honoring `StartupPolicy` (§4.7/§4.8).
fn build_inference_manager(config: &Config) -> anyhow::Result<InferenceManager> {
    let mut providers: Vec<Arc<dyn InferenceProvider>> = Vec::new();
    let mut configured_ok = 0usize;

    if let Some(cli_cfg) = &config.providers.cli {
        providers.push(try_build_cli(cli_cfg));
        configured_ok += 1;
    }
    for http_cfg in &config.providers.http {
        match try_build_http(http_cfg) {
            Ok(p) => {
                providers.push(p);
                configured_ok += 1;
            }
            Err(e) => tracing::warn!(provider = %http_cfg.id, error = %e, "HTTP provider failed to initialize"),
        }
    }

    if configured_ok == 0 && config.providers.startup_policy == StartupPolicy::RequireOne {
        anyhow::bail!("providers.startup_policy is require_one but no CLI/HTTP provider initialized");
    }

    let fallback: Arc<dyn InferenceProvider> = Arc::new(FallbackProvider::new(&config.providers.fallback));
    providers.push(fallback);

    Ok(InferenceManager::new(providers, config.providers.preference.clone()))
}

fn try_build_cli(cfg: &CliProviderConfig) -> Arc<dyn InferenceProvider> {
    Arc::new(CliProvider::new(cfg))
}

fn try_build_http(cfg: &HttpProviderConfig) -> sp_domain::Result<Arc<dyn InferenceProvider>> {
    Ok(Arc::new(HttpProvider::new(cfg)?))
}

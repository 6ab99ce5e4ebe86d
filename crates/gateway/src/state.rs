//! Shared server state, handed to every axum handler via `State<AppState>`.

use std::path::PathBuf;
use std::sync::Arc;

use sp_domain::config::Config;
use sp_domain::{InferenceDecision, InferenceRequest};
use sp_policy::PolicyEngine;
use sp_resilience::RequestQueue;
use sp_rules::RuleStore;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub config_path: PathBuf,
    pub rule_store: Arc<RuleStore>,
    pub engine: Arc<PolicyEngine>,
    pub queue: Arc<RequestQueue<InferenceRequest, InferenceDecision>>,
    /// SHA-256 of the configured bearer token; `None` disables auth (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
    pub shutdown: Arc<Notify>,
}

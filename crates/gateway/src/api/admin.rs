//! `GET /v1/health`, `GET /v1/config/rules`, `GET /v1/audit/recent`,
//! `GET /v1/metrics`.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::state::AppState;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn config_rules(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "path": state.rule_store.path().display().to_string(),
        "rules": state.rule_store.get_all(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    n: usize,
}

fn default_audit_limit() -> usize {
    50
}

pub async fn audit_recent(State(state): State<AppState>, Query(q): Query<AuditQuery>) -> impl IntoResponse {
    Json(serde_json::json!({ "entries": state.engine.audit().recent(q.n) }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let (cache_len, cache_empty) = state.engine.cache_stats();
    let queue = state.engine.queue_stats();

    Json(serde_json::json!({
        "cache": {
            "entries": cache_len,
            "is_empty": cache_empty,
        },
        "queue": queue,
        "rules": {
            "total": state.rule_store.get_all().len(),
            "active": state.rule_store.get_active().len(),
        },
        "audit": {
            "entries": state.engine.audit().len(),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_query_defaults_to_50_when_absent() {
        let q: AuditQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(q.n, 50);
    }

    #[test]
    fn audit_query_honors_explicit_n() {
        let q: AuditQuery = serde_json::from_value(serde_json::json!({ "n": 5 })).unwrap();
        assert_eq!(q.n, 5);
    }
}

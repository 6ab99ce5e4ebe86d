//! Inference Strategy Manager (§4.8): holds a map of providers and a
//! default preference order, trying each in turn until one succeeds.
//! Adapted from `LlmRouter::chat_for_role`'s fallback loop (`router.rs`),
//! simplified since every provider here already wraps its own call in
//! `request.timeout`.

use crate::provider::{HealthSummary, InferenceProvider, ProviderHealth};
use sp_domain::{Error, InferenceDecision, InferenceRequest, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub struct InferenceManager {
    providers: HashMap<String, Arc<dyn InferenceProvider>>,
    preference: Vec<String>,
}

impl InferenceManager {
    pub fn new(providers: Vec<Arc<dyn InferenceProvider>>, preference: Vec<String>) -> Self {
        let providers = providers.into_iter().map(|p| (p.provider_id().to_string(), p)).collect();
        Self { providers, preference }
    }

    /// Preferred-provider-first, then the configured preference list minus
    /// that provider, de-duplicated, dropping unknown names.
    fn order(&self, preferred: Option<&str>) -> Vec<String> {
        let mut order = Vec::new();
        if let Some(name) = preferred {
            if self.providers.contains_key(name) {
                order.push(name.to_string());
            }
        }
        for name in &self.preference {
            if !order.contains(name) && self.providers.contains_key(name) {
                order.push(name.clone());
            }
        }
        order
    }

    pub async fn evaluate(&self, request: &InferenceRequest) -> Result<InferenceDecision> {
        let order = self.order(request.preferred_provider.as_deref());
        let mut last_err: Option<Error> = None;
        for name in &order {
            let provider = &self.providers[name];
            match provider.evaluate(request).await {
                Ok(decision) => return Ok(decision),
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "inference provider failed, trying next");
                    last_err = Some(e);
                }
            }
        }
        Err(Error::AIServiceUnavailable(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "no inference providers configured".to_string()),
        ))
    }

    pub async fn health_check(&self) -> HealthSummary {
        let mut providers = Vec::with_capacity(self.providers.len());
        for (id, provider) in &self.providers {
            providers.push(ProviderHealth { provider_id: id.clone(), healthy: provider.health_check().await });
        }
        let total = providers.len();
        let healthy = providers.iter().filter(|p| p.healthy).count();
        HealthSummary { providers, total, healthy, overall_healthy: healthy > 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sp_domain::{DecisionAction, Priority, ToolRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        id: &'static str,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InferenceProvider for StubProvider {
        fn provider_id(&self) -> &str {
            self.id
        }

        async fn evaluate(&self, _request: &InferenceRequest) -> Result<InferenceDecision> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::Provider { provider: self.id.to_string(), message: "boom".into() })
            } else {
                Ok(InferenceDecision {
                    action: DecisionAction::Allow,
                    reason: "ok".into(),
                    confidence: 1.0,
                    risk_factors: vec![],
                    provider: self.id.to_string(),
                    model: None,
                    response_time_ms: 1,
                })
            }
        }
    }

    fn request(preferred: Option<&str>) -> InferenceRequest {
        InferenceRequest {
            request: ToolRequest::new("Bash", serde_json::json!({}), "sess", "agent", "/home", Utc::now()),
            prompt: "p".into(),
            rule_id: "r1".into(),
            preferred_provider: preferred.map(str::to_string),
            priority: Priority::Normal,
            timeout: std::time::Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn falls_through_to_next_provider_on_failure() {
        let primary = Arc::new(StubProvider { id: "primary", fail: true, calls: AtomicUsize::new(0) });
        let fallback = Arc::new(StubProvider { id: "fallback", fail: false, calls: AtomicUsize::new(0) });
        let manager = InferenceManager::new(
            vec![primary.clone(), fallback.clone()],
            vec!["primary".into(), "fallback".into()],
        );
        let decision = manager.evaluate(&request(None)).await.unwrap();
        assert_eq!(decision.provider, "fallback");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preferred_provider_is_tried_first() {
        let a = Arc::new(StubProvider { id: "a", fail: false, calls: AtomicUsize::new(0) });
        let b = Arc::new(StubProvider { id: "b", fail: false, calls: AtomicUsize::new(0) });
        let manager = InferenceManager::new(vec![a, b], vec!["b".into()]);
        let decision = manager.evaluate(&request(Some("a"))).await.unwrap();
        assert_eq!(decision.provider, "a");
    }

    #[tokio::test]
    async fn all_providers_failing_raises_unavailable() {
        let a = Arc::new(StubProvider { id: "a", fail: true, calls: AtomicUsize::new(0) });
        let manager = InferenceManager::new(vec![a], vec!["a".into()]);
        let err = manager.evaluate(&request(None)).await.unwrap_err();
        assert!(matches!(err, Error::AIServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn health_check_summarizes_across_providers() {
        let a = Arc::new(StubProvider { id: "a", fail: false, calls: AtomicUsize::new(0) });
        let manager = InferenceManager::new(vec![a], vec!["a".into()]);
        let summary = manager.health_check().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.healthy, 1);
        assert!(summary.overall_healthy);
    }
}

//! Policy Engine orchestrator (§4.9), grounded on
//! `security_policy_optimized.py::OptimizedSecurityPolicyEngine.evaluate`:
//! cache lookup, rule-snapshot walk, allow/deny/sample branching, and the
//! exact fail-open/fail-closed semantics of `_handle_sampling_optimized`.

use crate::audit::AuditLog;
use crate::prompt::PromptBuilder;
use sp_domain::{Decision, DecisionAction, InferenceRequest, Priority, RuleAction, SecurityRule, ToolRequest};
use sp_pattern::PatternEngine;
use sp_providers::InferenceManager;
use sp_resilience::{CircuitBreaker, Processor, QueueStats, RequestQueue, ResponseCache};
use sp_rules::{RuleStore, RuleStoreEvent};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct PolicyEngine {
    rule_store: Arc<RuleStore>,
    pattern_engine: Arc<PatternEngine>,
    cache: ResponseCache,
    circuit_breaker: CircuitBreaker,
    queue: Option<Arc<RequestQueue<InferenceRequest, sp_domain::InferenceDecision>>>,
    inference: Arc<InferenceManager>,
    prompt_builder: PromptBuilder,
    audit: AuditLog,
    default_timeout: Duration,
}

impl PolicyEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rule_store: Arc<RuleStore>,
        pattern_engine: Arc<PatternEngine>,
        cache: ResponseCache,
        circuit_breaker: CircuitBreaker,
        queue: Option<Arc<RequestQueue<InferenceRequest, sp_domain::InferenceDecision>>>,
        inference: Arc<InferenceManager>,
        audit_capacity: usize,
        default_timeout: Duration,
    ) -> Self {
        Self {
            rule_store,
            pattern_engine,
            cache,
            circuit_breaker,
            queue,
            inference,
            prompt_builder: PromptBuilder::new(),
            audit: AuditLog::new(audit_capacity),
            default_timeout,
        }
    }

    /// Start the queue's worker pool, wiring the Inference Manager in as
    /// the processor (§4.8 is the strategy the queue's workers execute).
    pub fn start_queue(&self) {
        if let Some(queue) = &self.queue {
            let inference = self.inference.clone();
            let processor: Processor<InferenceRequest, sp_domain::InferenceDecision> =
                Arc::new(move |req: InferenceRequest| {
                    let inference = inference.clone();
                    Box::pin(async move { inference.evaluate(&req).await })
                });
            queue.start(processor);
        }
    }

    /// Subscribe to rule-store reload events and clear the response cache
    /// on each reload (Open Question (b): a rule change is a policy
    /// change, so stale cached decisions must not survive a reload).
    pub fn spawn_cache_invalidation(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut rx = self.rule_store.subscribe();
        let engine = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(RuleStoreEvent::Reloaded) => {
                        engine.cache.clear();
                        tracing::info!("rule store reloaded, response cache cleared");
                    }
                    Ok(RuleStoreEvent::Mutated) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        })
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn queue_stats(&self) -> Option<QueueStats> {
        self.queue.as_ref().map(|q| q.stats())
    }

    pub fn cache_stats(&self) -> (usize, bool) {
        (self.cache.len(), self.cache.is_empty())
    }

    pub async fn evaluate(&self, request: ToolRequest) -> Decision {
        let start = Instant::now();
        let cache_key = ResponseCache::fingerprint(&request.tool_name, &request.parameters, &request.agent_id, &request.cwd);

        if let Some(decision) = self.cache.get(&cache_key) {
            return decision.with_processing_time(start.elapsed().as_millis() as u64);
        }

        let (decision, rule_matches) = self.evaluate_uncached(&request, start).await;
        self.cache.put(cache_key, decision.clone());
        self.audit.record(request, decision.clone(), rule_matches);
        decision
    }

    async fn evaluate_uncached(&self, request: &ToolRequest, start: Instant) -> (Decision, Vec<String>) {
        let elapsed_ms = |i: &Instant| i.elapsed().as_millis() as u64;

        let snapshot = self.rule_store.get_active();
        let matched = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            find_matching_rule(&self.pattern_engine, &snapshot, request)
        })) {
            Ok(m) => m,
            Err(_) => {
                return (
                    Decision {
                        action: DecisionAction::Deny,
                        reason: "Rule evaluation failed — failing closed".to_string(),
                        rule_id: None,
                        confidence: 0.8,
                        processing_time_ms: elapsed_ms(&start).max(1),
                        risk_factors: vec![],
                        ai_provider: None,
                        ai_model: None,
                    },
                    vec![],
                );
            }
        };

        let Some(rule) = matched else {
            return (
                Decision {
                    action: DecisionAction::Allow,
                    reason: "No security rules matched".to_string(),
                    rule_id: None,
                    confidence: 0.5,
                    processing_time_ms: elapsed_ms(&start).max(1),
                    risk_factors: vec![],
                    ai_provider: None,
                    ai_model: None,
                },
                vec![],
            );
        };

        let rule_matches = vec![rule.id.clone()];

        match rule.action {
            RuleAction::Allow | RuleAction::Deny => {
                let action = if rule.action == RuleAction::Allow { DecisionAction::Allow } else { DecisionAction::Deny };
                let decision = Decision {
                    action,
                    reason: rule.reason.clone().unwrap_or_else(|| format!("Rule {} matched", rule.id)),
                    rule_id: Some(rule.id.clone()),
                    confidence: 1.0,
                    processing_time_ms: elapsed_ms(&start).max(1),
                    risk_factors: vec![],
                    ai_provider: None,
                    ai_model: None,
                };
                (decision, rule_matches)
            }
            RuleAction::Sample => {
                let decision = self.handle_sampling(request, &rule, start).await;
                (decision, rule_matches)
            }
        }
    }

    async fn handle_sampling(&self, request: &ToolRequest, rule: &SecurityRule, start: Instant) -> Decision {
        let elapsed_ms = || start.elapsed().as_millis().max(1) as u64;

        let prompt = match self.prompt_builder.build_evaluation_prompt(request, rule) {
            Ok(p) => p,
            Err(e) => {
                return Decision {
                    action: DecisionAction::Deny,
                    reason: format!("unexpected error building prompt: {e}"),
                    rule_id: Some(rule.id.clone()),
                    confidence: 0.9,
                    processing_time_ms: elapsed_ms(),
                    risk_factors: vec![],
                    ai_provider: None,
                    ai_model: None,
                };
            }
        };

        let inference_request = InferenceRequest {
            request: request.clone(),
            prompt,
            rule_id: rule.id.clone(),
            preferred_provider: rule.inference_provider.clone(),
            priority: Priority::Normal,
            timeout: self.default_timeout,
        };

        let result = self
            .circuit_breaker
            .call(move || async move {
                if let Some(queue) = &self.queue {
                    queue.enqueue(inference_request, Priority::Normal, Some(self.default_timeout)).await
                } else {
                    self.inference.evaluate(&inference_request).await
                }
            })
            .await;

        match result {
            Ok(inference_decision) => Decision {
                action: inference_decision.action,
                reason: inference_decision.reason,
                rule_id: Some(rule.id.clone()),
                confidence: inference_decision.confidence,
                processing_time_ms: elapsed_ms(),
                risk_factors: inference_decision.risk_factors,
                ai_provider: Some(inference_decision.provider),
                ai_model: inference_decision.model,
            },
            Err(e) if e.is_unavailable() => Decision {
                action: DecisionAction::Allow,
                reason: format!("AI sampling unavailable - failing open: {e}"),
                rule_id: Some(rule.id.clone()),
                confidence: 0.3,
                processing_time_ms: elapsed_ms(),
                risk_factors: vec![],
                ai_provider: None,
                ai_model: None,
            },
            Err(e) => Decision {
                action: DecisionAction::Deny,
                reason: format!("AI sampling error - failing closed: {e}"),
                rule_id: Some(rule.id.clone()),
                confidence: 0.8,
                processing_time_ms: elapsed_ms(),
                risk_factors: vec![],
                ai_provider: None,
                ai_model: None,
            },
        }
    }
}

fn find_matching_rule(engine: &PatternEngine, rules: &[SecurityRule], request: &ToolRequest) -> Option<SecurityRule> {
    rules.iter().find(|rule| engine.evaluate(&rule.conditions, request)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sp_domain::CircuitBreakerConfig;
    use sp_providers::FallbackProvider;
    use std::io::Write;

    fn write_rules(yaml: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f
    }

    fn engine_with_rules(yaml: &str) -> PolicyEngine {
        let pattern_engine = Arc::new(PatternEngine::new());
        let file = write_rules(yaml);
        let rule_store = Arc::new(RuleStore::load(file.path(), pattern_engine.clone()).unwrap());
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::default());
        let fallback: Arc<dyn sp_providers::InferenceProvider> =
            Arc::new(FallbackProvider::new(&sp_domain::FallbackProviderConfig::default()));
        let inference = Arc::new(InferenceManager::new(vec![fallback], vec!["mock_inference".into()]));
        PolicyEngine::new(rule_store, pattern_engine, cache, circuit_breaker, None, inference, 100, Duration::from_secs(5))
    }

    fn req(tool_name: &str, params: serde_json::Value) -> ToolRequest {
        ToolRequest::new(tool_name, params, "s1", "a1", "/home", chrono::Utc::now())
    }

    #[tokio::test]
    async fn no_rules_match_defaults_to_allow() {
        let engine = engine_with_rules("rules: []\n");
        let decision = engine.evaluate(req("Read", serde_json::json!({}))).await;
        assert_eq!(decision.action, DecisionAction::Allow);
        assert_eq!(decision.reason, "No security rules matched");
        assert_eq!(decision.confidence, 0.5);
    }

    #[tokio::test]
    async fn deny_rule_matches_at_full_confidence() {
        let yaml = r#"
rules:
  - id: R1
    priority: 1
    action: deny
    reason: "no bash allowed"
    conditions:
      tool_name: "Bash"
"#;
        let engine = engine_with_rules(yaml);
        let decision = engine.evaluate(req("Bash", serde_json::json!({"command": "ls"}))).await;
        assert_eq!(decision.action, DecisionAction::Deny);
        assert_eq!(decision.rule_id, Some("R1".to_string()));
        assert_eq!(decision.confidence, 1.0);
    }

    #[tokio::test]
    async fn sample_rule_falls_through_to_rule_based_fallback_provider() {
        let yaml = r#"
rules:
  - id: R2
    priority: 1
    action: sample
    sampling_guidance: "check carefully"
    conditions:
      tool_name: "Bash"
"#;
        let engine = engine_with_rules(yaml);
        let decision = engine.evaluate(req("Bash", serde_json::json!({"command": "sudo rm -rf /"}))).await;
        assert_eq!(decision.action, DecisionAction::Deny);
        assert_eq!(decision.ai_provider, Some("mock_inference".to_string()));
        assert_eq!(decision.rule_id, Some("R2".to_string()));
    }

    #[tokio::test]
    async fn second_identical_request_is_served_from_cache() {
        let yaml = "rules: []\n";
        let engine = engine_with_rules(yaml);
        let first = engine.evaluate(req("Read", serde_json::json!({"x": 1}))).await;
        let second = engine.evaluate(req("Read", serde_json::json!({"x": 1}))).await;
        assert_eq!(first.reason, second.reason);
        assert_eq!(engine.cache_stats().0, 1);
    }
}

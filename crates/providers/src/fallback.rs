//! Rule-Based Fallback Provider (§4.7.3): an offline predictor for tests
//! and standalone CLI mode. Always available, needs no credentials, and
//! is the default (and often only) entry in the provider preference list.

use crate::provider::InferenceProvider;
use async_trait::async_trait;
use sp_domain::{DecisionAction, FallbackProviderConfig, InferenceDecision, InferenceRequest, Result};
use std::time::Instant;

pub struct FallbackProvider {
    dangerous_patterns: Vec<String>,
    protected_paths: Vec<String>,
}

impl FallbackProvider {
    pub fn new(config: &FallbackProviderConfig) -> Self {
        Self {
            dangerous_patterns: config.dangerous_patterns.iter().map(|s| s.to_ascii_lowercase()).collect(),
            protected_paths: config.protected_paths.clone(),
        }
    }
}

#[async_trait]
impl InferenceProvider for FallbackProvider {
    fn provider_id(&self) -> &str {
        "mock_inference"
    }

    async fn evaluate(&self, request: &InferenceRequest) -> Result<InferenceDecision> {
        let start = Instant::now();
        let blob = format!(
            "{} | {} | {}",
            request.prompt, request.request.tool_name, request.request.parameters
        )
        .to_ascii_lowercase();

        let (action, reason, confidence, risk_factors) = if let Some(pat) =
            self.dangerous_patterns.iter().find(|p| blob.contains(p.as_str()))
        {
            (
                DecisionAction::Deny,
                format!("matched dangerous pattern '{pat}'"),
                0.9,
                vec!["dangerous_command".to_string(), "security_risk".to_string()],
            )
        } else if let Some(path) = self.protected_paths.iter().find(|p| blob.contains(p.to_ascii_lowercase().as_str())) {
            (
                DecisionAction::Deny,
                format!("references protected path '{path}'"),
                0.8,
                vec!["protected_path_access".to_string(), "system_modification".to_string()],
            )
        } else {
            (DecisionAction::Allow, "no dangerous pattern or protected path matched".to_string(), 0.7, Vec::new())
        };

        Ok(InferenceDecision {
            action,
            reason,
            confidence,
            risk_factors,
            provider: "mock_inference".to_string(),
            model: Some("pattern-matcher-v1".to_string()),
            response_time_ms: start.elapsed().as_millis().max(1) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sp_domain::{Priority, ToolRequest};

    fn request(prompt: &str, tool_name: &str, params: serde_json::Value) -> InferenceRequest {
        InferenceRequest {
            request: ToolRequest::new(tool_name, params, "sess", "agent", "/home", Utc::now()),
            prompt: prompt.to_string(),
            rule_id: "r1".into(),
            preferred_provider: None,
            priority: Priority::Normal,
            timeout: std::time::Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn denies_on_dangerous_pattern_at_high_confidence() {
        let provider = FallbackProvider::new(&FallbackProviderConfig::default());
        let req = request("please run", "Bash", serde_json::json!({"command": "sudo rm -rf /"}));
        let decision = provider.evaluate(&req).await.unwrap();
        assert_eq!(decision.action, DecisionAction::Deny);
        assert_eq!(decision.confidence, 0.9);
        assert_eq!(decision.provider, "mock_inference");
        assert_eq!(decision.model.as_deref(), Some("pattern-matcher-v1"));
        assert_eq!(decision.risk_factors, vec!["dangerous_command", "security_risk"]);
    }

    #[tokio::test]
    async fn denies_on_protected_path_at_medium_confidence_when_no_dangerous_pattern() {
        let provider = FallbackProvider::new(&FallbackProviderConfig::default());
        let req = request("write", "Write", serde_json::json!({"file_path": "/etc/shadow"}));
        let decision = provider.evaluate(&req).await.unwrap();
        assert_eq!(decision.action, DecisionAction::Deny);
        assert_eq!(decision.confidence, 0.8);
        assert_eq!(decision.provider, "mock_inference");
        assert_eq!(decision.model.as_deref(), Some("pattern-matcher-v1"));
        assert_eq!(decision.risk_factors, vec!["protected_path_access", "system_modification"]);
    }

    #[tokio::test]
    async fn allows_when_nothing_matches() {
        let provider = FallbackProvider::new(&FallbackProviderConfig::default());
        let req = request("read", "Read", serde_json::json!({"file_path": "/home/user/notes.txt"}));
        let decision = provider.evaluate(&req).await.unwrap();
        assert_eq!(decision.action, DecisionAction::Allow);
        assert_eq!(decision.confidence, 0.7);
        assert!(decision.risk_factors.is_empty());
    }

    #[tokio::test]
    async fn dangerous_pattern_takes_precedence_over_protected_path() {
        let provider = FallbackProvider::new(&FallbackProviderConfig::default());
        let req = request("run", "Bash", serde_json::json!({"command": "rm -rf /etc/passwd"}));
        let decision = provider.evaluate(&req).await.unwrap();
        assert!(decision.reason.contains("dangerous pattern"));
    }
}

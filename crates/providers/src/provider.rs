//! The common inference-provider contract (§4.7), narrowed from the
//! `LlmProvider` trait shape to a single-call verdict instead of a
//! chat/streaming/embeddings surface.

use async_trait::async_trait;
use sp_domain::{InferenceDecision, InferenceRequest, Result};

#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Stable id used in rule `inference_provider` fields and provider
    /// preference lists (e.g. `"claude-cli"`, `"openai"`, `"mock_inference"`).
    fn provider_id(&self) -> &str;

    async fn evaluate(&self, request: &InferenceRequest) -> Result<InferenceDecision>;

    /// Lightweight liveness probe for `/v1/health` and the startup policy
    /// check. Default: always healthy (the rule-based fallback needs no
    /// external dependency to be reachable).
    async fn health_check(&self) -> bool {
        true
    }
}

/// Summary returned by the Inference Strategy Manager's `health_check`
/// fan-out (§4.8).
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    pub provider_id: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSummary {
    pub providers: Vec<ProviderHealth>,
    pub total: usize,
    pub healthy: usize,
    pub overall_healthy: bool,
}

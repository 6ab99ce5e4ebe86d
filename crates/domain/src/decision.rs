//! The output side of the data model (§3): `Decision`, its internal
//! `InferenceRequest`/`InferenceDecision` analogs, and the audit ring entry.

use crate::request::ToolRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Allow,
    Deny,
}

/// The engine's externally-observable verdict. `sample` is never observed
/// here — it is always resolved to `allow`/`deny` via inference before a
/// `Decision` is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reason: String,
    pub rule_id: Option<String>,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Minimum 1 (clamp floor for deterministic log ordering).
    pub processing_time_ms: u64,
    pub risk_factors: Vec<String>,
    pub ai_provider: Option<String>,
    pub ai_model: Option<String>,
}

impl Decision {
    /// Clamp `processing_time_ms` to the invariant floor of 1.
    pub fn with_processing_time(mut self, elapsed_ms: u64) -> Self {
        self.processing_time_ms = elapsed_ms.max(1);
        self
    }
}

/// Request priority for the Request Queue (§4.6). Ordering: by priority,
/// then enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    High = 0,
    Normal = 1,
    Low = 2,
}

/// Internal analog of `ToolRequest` + rule guidance, used between the
/// Policy Engine and inference providers.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub request: ToolRequest,
    pub prompt: String,
    pub rule_id: String,
    pub preferred_provider: Option<String>,
    pub priority: Priority,
    pub timeout: std::time::Duration,
}

/// Internal analog of `Decision`, with `response_time_ms` added.
#[derive(Debug, Clone)]
pub struct InferenceDecision {
    pub action: DecisionAction,
    pub reason: String,
    pub confidence: f64,
    pub risk_factors: Vec<String>,
    pub provider: String,
    pub model: Option<String>,
    pub response_time_ms: u64,
}

/// A single entry in the bounded in-memory audit ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request: ToolRequest,
    pub decision: Decision,
    pub rule_matches: Vec<String>,
}

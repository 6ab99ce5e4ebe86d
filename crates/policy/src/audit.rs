//! In-memory audit ring buffer (§6: `GET /v1/audit/recent`). Persistence
//! beyond this ring is an explicit Non-goal.

use parking_lot::Mutex;
use sp_domain::{AuditEntry, Decision, ToolRequest};
use std::collections::VecDeque;
use uuid::Uuid;

pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self { entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))), capacity: capacity.max(1) }
    }

    pub fn record(&self, request: ToolRequest, decision: Decision, rule_matches: Vec<String>) {
        tracing::info!(
            tool_name = %request.tool_name,
            action = ?decision.action,
            rule_id = ?decision.rule_id,
            confidence = decision.confidence,
            "policy decision"
        );
        let entry = AuditEntry {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            request,
            decision,
            rule_matches,
        };
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        entries.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sp_domain::DecisionAction;

    fn decision() -> Decision {
        Decision {
            action: DecisionAction::Allow,
            reason: "ok".into(),
            rule_id: None,
            confidence: 1.0,
            processing_time_ms: 1,
            risk_factors: vec![],
            ai_provider: None,
            ai_model: None,
        }
    }

    fn request() -> ToolRequest {
        ToolRequest::new("Bash", serde_json::json!({}), "s", "a", "/home", Utc::now())
    }

    #[test]
    fn recent_returns_newest_first() {
        let log = AuditLog::new(10);
        log.record(request(), decision(), vec!["R1".into()]);
        log.record(request(), decision(), vec!["R2".into()]);
        let recent = log.recent(10);
        assert_eq!(recent[0].rule_matches, vec!["R2"]);
        assert_eq!(recent[1].rule_matches, vec!["R1"]);
    }

    #[test]
    fn ring_evicts_oldest_past_capacity() {
        let log = AuditLog::new(2);
        log.record(request(), decision(), vec!["R1".into()]);
        log.record(request(), decision(), vec!["R2".into()]);
        log.record(request(), decision(), vec!["R3".into()]);
        assert_eq!(log.len(), 2);
        let recent = log.recent(10);
        assert_eq!(recent.iter().map(|e| e.rule_matches[0].clone()).collect::<Vec<_>>(), vec!["R3", "R2"]);
    }
}

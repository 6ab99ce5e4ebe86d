//! Response Cache (§4.5): bounded LRU keyed by a 16-hex-char fingerprint
//! of the decision-relevant request fields, with absolute TTL expiry.

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sp_domain::Decision;
use std::num::NonZeroUsize;
use std::time::Duration;

struct Entry {
    decision: Decision,
    expires_at: DateTime<Utc>,
}

pub struct ResponseCache {
    inner: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { inner: Mutex::new(LruCache::new(cap)), ttl }
    }

    /// `SHA-256(tool_name | sorted(parameters) | agent_id | cwd)`,
    /// truncated to the first 16 hex chars.
    pub fn fingerprint(tool_name: &str, parameters: &Value, agent_id: &str, cwd: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(tool_name.as_bytes());
        hasher.update(b"|");
        hasher.update(canonical_json(parameters).as_bytes());
        hasher.update(b"|");
        hasher.update(agent_id.as_bytes());
        hasher.update(b"|");
        hasher.update(cwd.as_bytes());
        let digest = hasher.finalize();
        hex::encode(digest)[..16].to_string()
    }

    pub fn get(&self, key: &str) -> Option<Decision> {
        let mut guard = self.inner.lock();
        let expired = match guard.get(key) {
            Some(entry) => entry.expires_at <= Utc::now(),
            None => return None,
        };
        if expired {
            guard.pop(key);
            return None;
        }
        guard.get(key).map(|e| e.decision.clone())
    }

    pub fn put(&self, key: String, decision: Decision) {
        let expires_at = Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero());
        self.inner.lock().put(key, Entry { decision, expires_at });
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters with keys sorted recursively, so semantically identical
/// requests with differently-ordered JSON object keys fingerprint the
/// same way.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{k}:{}", canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sp_domain::DecisionAction;

    fn decision() -> Decision {
        Decision {
            action: DecisionAction::Allow,
            reason: "ok".into(),
            rule_id: Some("R1".into()),
            confidence: 1.0,
            processing_time_ms: 1,
            risk_factors: vec![],
            ai_provider: None,
            ai_model: None,
        }
    }

    #[test]
    fn fingerprint_is_order_independent_over_keys() {
        let a = ResponseCache::fingerprint("Bash", &json!({"x": 1, "y": 2}), "agent", "/home");
        let b = ResponseCache::fingerprint("Bash", &json!({"y": 2, "x": 1}), "agent", "/home");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_differs_on_any_field() {
        let a = ResponseCache::fingerprint("Bash", &json!({}), "agent", "/home");
        let b = ResponseCache::fingerprint("Read", &json!({}), "agent", "/home");
        assert_ne!(a, b);
    }

    #[test]
    fn put_then_get_hits() {
        let cache = ResponseCache::new(10, Duration::from_secs(60));
        cache.put("k1".into(), decision());
        assert!(cache.get("k1").is_some());
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_evicted() {
        let cache = ResponseCache::new(10, Duration::from_millis(0));
        cache.put("k1".into(), decision());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get("k1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_enforcement_evicts_lru() {
        let cache = ResponseCache::new(2, Duration::from_secs(60));
        cache.put("a".into(), decision());
        cache.put("b".into(), decision());
        cache.put("c".into(), decision());
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
    }
}

//! Pattern Engine (§4.1): evaluates a rule's `conditions` tree against a
//! `ToolRequest`.

use crate::cache::PatternCache;
use crate::predicate::{eval_pattern_config, eval_predicate_json, eval_predicate_text};
use crate::time_range;
use chrono::Utc;
use sp_domain::{Condition, Conditions, ParametersCondition, Predicate, ToolNameCondition, ToolRequest};

pub struct PatternEngine {
    cache: PatternCache,
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self { cache: PatternCache::default() }
    }
}

impl PatternEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&self, conditions: &Conditions, request: &ToolRequest) -> bool {
        let direct_ok = if conditions.direct.is_empty() {
            true
        } else {
            self.evaluate_condition(&conditions.direct, request)
        };
        let and_ok = conditions.and.iter().all(|c| self.evaluate_condition(c, request));
        let or_ok = conditions.or.is_empty() || conditions.or.iter().any(|c| self.evaluate_condition(c, request));
        direct_ok && and_ok && or_ok
    }

    fn evaluate_condition(&self, cond: &Condition, request: &ToolRequest) -> bool {
        if let Some(tn) = &cond.tool_name {
            if !self.evaluate_tool_name(tn, &request.tool_name) {
                return false;
            }
        }
        if let Some(params) = &cond.parameters {
            if !self.evaluate_parameters(params, &request.parameters) {
                return false;
            }
        }
        if let Some(cwd) = &cond.cwd {
            if !eval_pattern_config(&self.cache, cwd, &request.cwd) {
                return false;
            }
        }
        if let Some(pattern) = &cond.cwd_pattern {
            let pred = Predicate::Regex { pattern: pattern.clone() };
            if !eval_predicate_text(&self.cache, &pred, &request.cwd) {
                return false;
            }
        }
        if let Some(tr) = &cond.time_range {
            if !time_range::matches(tr, Utc::now()) {
                return false;
            }
        }
        true
    }

    fn evaluate_tool_name(&self, cond: &ToolNameCondition, tool_name: &str) -> bool {
        match cond {
            ToolNameCondition::List(names) => names.iter().any(|n| n.eq_ignore_ascii_case(tool_name)),
            ToolNameCondition::Pattern(pc) => eval_pattern_config(&self.cache, pc, tool_name),
        }
    }

    fn evaluate_parameters(&self, cond: &ParametersCondition, params: &serde_json::Value) -> bool {
        match cond {
            ParametersCondition::Whole(pred) => eval_predicate_json(&self.cache, pred, params),
            ParametersCondition::PerKey(map) => map.iter().all(|(key, pc)| {
                let Some(value) = params.get(key) else {
                    return false;
                };
                if let sp_domain::PatternConfig::Typed(pred @ Predicate::Jsonpath { .. }) = pc {
                    eval_predicate_json(&self.cache, pred, value)
                } else {
                    let text = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    eval_pattern_config(&self.cache, pc, &text)
                }
            }),
        }
    }

    /// Compile (but don't execute) a predicate, for config validation.
    pub fn validate_predicate(&self, pred: &Predicate) -> sp_domain::Result<()> {
        match pred {
            Predicate::String { .. } => Ok(()),
            Predicate::Regex { pattern } => self
                .cache
                .get_or_compile_regex(pattern)
                .map(|_| ())
                .ok_or_else(|| sp_domain::Error::InvalidConfiguration(format!("invalid regex: {pattern}"))),
            Predicate::Glob { pattern } => glob::Pattern::new(pattern)
                .map(|_| ())
                .map_err(|e| sp_domain::Error::InvalidConfiguration(format!("invalid glob \"{pattern}\": {e}"))),
            Predicate::Jsonpath { pattern, .. } => {
                if self.cache.validate_jsonpath(pattern) {
                    Ok(())
                } else {
                    Err(sp_domain::Error::InvalidConfiguration(format!("invalid jsonpath: {pattern}")))
                }
            }
        }
    }

    pub fn cache_stats(&self) -> (usize, usize) {
        (self.cache.len(), self.cache.capacity())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use sp_domain::{PatternConfig, ToolRequest};

    fn req(tool_name: &str, params: serde_json::Value, cwd: &str) -> ToolRequest {
        ToolRequest::new(tool_name, params, "s1", "a1", cwd, Utc::now())
    }

    #[test]
    fn direct_tool_name_match() {
        let engine = PatternEngine::new();
        let conditions = Conditions {
            direct: Condition { tool_name: Some(ToolNameCondition::Pattern(PatternConfig::Bare("Bash".into()))), ..Default::default() },
            ..Default::default()
        };
        assert!(engine.evaluate(&conditions, &req("Bash", json!({}), "/home")));
        assert!(!engine.evaluate(&conditions, &req("Read", json!({}), "/home")));
    }

    #[test]
    fn and_requires_all_children() {
        let engine = PatternEngine::new();
        let c1 = Condition { tool_name: Some(ToolNameCondition::Pattern(PatternConfig::Bare("Bash".into()))), ..Default::default() };
        let c2 = Condition {
            parameters: Some(ParametersCondition::Whole(Predicate::Regex { pattern: "rm -rf".into() })),
            ..Default::default()
        };
        let conditions = Conditions { and: vec![c1, c2], ..Default::default() };
        assert!(engine.evaluate(&conditions, &req("Bash", json!({"command": "rm -rf /"}), "/home")));
        assert!(!engine.evaluate(&conditions, &req("Bash", json!({"command": "ls"}), "/home")));
    }

    #[test]
    fn or_requires_one_child() {
        let engine = PatternEngine::new();
        let c1 = Condition { tool_name: Some(ToolNameCondition::List(vec!["Write".into()])), ..Default::default() };
        let c2 = Condition { tool_name: Some(ToolNameCondition::List(vec!["Edit".into()])), ..Default::default() };
        let conditions = Conditions { or: vec![c1, c2], ..Default::default() };
        assert!(engine.evaluate(&conditions, &req("Edit", json!({}), "/home")));
        assert!(!engine.evaluate(&conditions, &req("Bash", json!({}), "/home")));
    }

    #[test]
    fn per_key_parameters_requires_all_named_keys() {
        let engine = PatternEngine::new();
        let mut map = std::collections::HashMap::new();
        map.insert("file_path".to_string(), PatternConfig::Typed(Predicate::Glob { pattern: "/etc/*".into() }));
        let conditions = Conditions {
            direct: Condition { parameters: Some(ParametersCondition::PerKey(map)), ..Default::default() },
            ..Default::default()
        };
        assert!(engine.evaluate(&conditions, &req("Write", json!({"file_path": "/etc/passwd"}), "/home")));
        assert!(!engine.evaluate(&conditions, &req("Write", json!({"file_path": "/home/x"}), "/home")));
        assert!(!engine.evaluate(&conditions, &req("Write", json!({}), "/home")));
    }

    #[test]
    fn empty_conditions_match_everything() {
        let engine = PatternEngine::new();
        assert!(engine.evaluate(&Conditions::default(), &req("Bash", json!({}), "/home")));
    }
}

//! `SecurityRule` and its condition tree (§3, §4.1, §6). The predicate
//! *data shape* lives here because both the Rule Store (validates it) and
//! the Pattern Engine (evaluates it) need it; evaluation logic itself
//! lives in `sp-pattern`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
    Sample,
}

/// A priority-carrying predicate-to-action mapping. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRule {
    pub id: String,
    /// 0-999, lower number = higher priority.
    pub priority: u16,
    #[serde(default = "d_true")]
    pub enabled: bool,
    pub action: RuleAction,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub sampling_guidance: Option<String>,
    #[serde(default)]
    pub inference_provider: Option<String>,
    pub conditions: Conditions,
}

fn d_true() -> bool {
    true
}

/// Either a bare pattern string (legacy shorthand for `string`) or a
/// typed predicate object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternConfig {
    Bare(String),
    Typed(Predicate),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Predicate {
    String {
        pattern: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Regex {
        pattern: String,
    },
    Glob {
        pattern: String,
    },
    Jsonpath {
        pattern: String,
        #[serde(default = "d_exists")]
        comparison: JsonPathComparison,
        #[serde(default)]
        threshold: Option<serde_json::Value>,
    },
}

fn d_exists() -> JsonPathComparison {
    JsonPathComparison::Exists
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonPathComparison {
    Exists,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// `tool_name` accepts a bare string, a predicate object, or (legacy) a
/// list of strings treated as set membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolNameCondition {
    List(Vec<String>),
    Pattern(PatternConfig),
}

/// `parameters` is either a predicate applied to the whole tree, or a map
/// of `key -> predicate` where every named key must be present and match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParametersCondition {
    Whole(Predicate),
    PerKey(HashMap<String, PatternConfig>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
    #[serde(default = "d_utc")]
    pub timezone: String,
}

fn d_utc() -> String {
    "UTC".to_string()
}

/// One leaf condition — the direct (non-AND/OR) keys of a `conditions` map,
/// and the element type of `AND`/`OR` lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub tool_name: Option<ToolNameCondition>,
    #[serde(default)]
    pub parameters: Option<ParametersCondition>,
    #[serde(default)]
    pub cwd: Option<PatternConfig>,
    /// Legacy: treated as a regex against `cwd`.
    #[serde(default)]
    pub cwd_pattern: Option<String>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.tool_name.is_none()
            && self.parameters.is_none()
            && self.cwd.is_none()
            && self.cwd_pattern.is_none()
            && self.time_range.is_none()
    }
}

/// The top-level `conditions` map: `AND`/`OR` keys plus direct sibling
/// keys, which are implicitly ANDed with the composite results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(rename = "AND", default)]
    pub and: Vec<Condition>,
    #[serde(rename = "OR", default)]
    pub or: Vec<Condition>,
    #[serde(flatten)]
    pub direct: Condition,
}

impl Conditions {
    /// A rule's `conditions` must contain at least one recognized
    /// predicate key (`tool_name`, `parameters`, `cwd`, `cwd_pattern`,
    /// `time_range`, `AND`, `OR`).
    pub fn has_recognized_key(&self) -> bool {
        !self.and.is_empty() || !self.or.is_empty() || !self.direct.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_deserializes_from_yaml() {
        let yaml = r#"
id: R1
priority: 10
action: allow
conditions:
  tool_name: "Bash"
"#;
        let rule: SecurityRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.id, "R1");
        assert_eq!(rule.priority, 10);
        assert!(rule.enabled);
        assert_eq!(rule.action, RuleAction::Allow);
        assert!(rule.conditions.has_recognized_key());
    }

    #[test]
    fn rule_with_regex_condition_and_and_or() {
        let yaml = r#"
id: R2
priority: 5
action: deny
conditions:
  AND:
    - parameters:
        command:
          type: regex
          pattern: "rm -rf"
  tool_name: "Bash"
"#;
        let rule: SecurityRule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.conditions.and.len(), 1);
        assert!(rule.conditions.direct.tool_name.is_some());
    }

    #[test]
    fn conditions_empty_has_no_recognized_key() {
        let c = Conditions::default();
        assert!(!c.has_recognized_key());
    }
}

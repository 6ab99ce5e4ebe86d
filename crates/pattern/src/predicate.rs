//! Evaluates a single [`Predicate`] or [`PatternConfig`] against request
//! data. Never panics: a predicate that raises during evaluation is
//! treated as `false` and logged (§4.1 "Failure mode").

use crate::cache::PatternCache;
use serde_json::Value;
use sp_domain::{JsonPathComparison, PatternConfig, Predicate};

/// Bare-string shorthand is exact, case-insensitive equality — the same
/// default as `Predicate::String { case_sensitive: false, .. }`.
pub fn eval_pattern_config(cache: &PatternCache, pc: &PatternConfig, text: &str) -> bool {
    match pc {
        PatternConfig::Bare(pattern) => eq_text(pattern, text, false),
        PatternConfig::Typed(pred) => eval_predicate_text(cache, pred, text),
    }
}

fn eq_text(pattern: &str, text: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        pattern == text
    } else {
        pattern.eq_ignore_ascii_case(text)
    }
}

/// Evaluate a text-bearing predicate (`string`, `regex`, `glob`) against a
/// single string value. `jsonpath` predicates don't apply here — see
/// [`eval_predicate_json`].
pub fn eval_predicate_text(cache: &PatternCache, pred: &Predicate, text: &str) -> bool {
    match pred {
        Predicate::String { pattern, case_sensitive } => eq_text(pattern, text, *case_sensitive),
        Predicate::Regex { pattern } => match cache.get_or_compile_regex(pattern) {
            Some(re) => re.is_match(text),
            None => false,
        },
        Predicate::Glob { pattern } => match glob::Pattern::new(pattern) {
            Ok(p) => p.matches(text),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid glob pattern");
                false
            }
        },
        Predicate::Jsonpath { .. } => {
            tracing::warn!("jsonpath predicate used against a plain string field");
            false
        }
    }
}

/// Evaluate any predicate against a JSON value tree — the `parameters`
/// condition's "whole tree" form.
pub fn eval_predicate_json(cache: &PatternCache, pred: &Predicate, value: &Value) -> bool {
    match pred {
        Predicate::Jsonpath { pattern, comparison, threshold } => {
            eval_jsonpath(cache, pattern, *comparison, threshold.as_ref(), value)
        }
        // String/regex/glob against a JSON tree only make sense on string
        // leaves; stringify non-string values for a best-effort match.
        other => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            eval_predicate_text(cache, other, &text)
        }
    }
}

fn eval_jsonpath(
    cache: &PatternCache,
    pattern: &str,
    comparison: JsonPathComparison,
    threshold: Option<&Value>,
    value: &Value,
) -> bool {
    if !cache.validate_jsonpath(pattern) {
        return false;
    }
    let matches = match jsonpath_lib::select(value, pattern) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(pattern, error = %e, "jsonpath evaluation failed");
            return false;
        }
    };
    match comparison {
        JsonPathComparison::Exists => !matches.is_empty(),
        JsonPathComparison::Eq => matches.iter().any(|v| Some(*v) == threshold),
        JsonPathComparison::Gt => numeric_cmp(&matches, threshold, |a, b| a > b),
        JsonPathComparison::Gte => numeric_cmp(&matches, threshold, |a, b| a >= b),
        JsonPathComparison::Lt => numeric_cmp(&matches, threshold, |a, b| a < b),
        JsonPathComparison::Lte => numeric_cmp(&matches, threshold, |a, b| a <= b),
    }
}

fn numeric_cmp(matches: &[&Value], threshold: Option<&Value>, op: impl Fn(f64, f64) -> bool) -> bool {
    let Some(t) = threshold.and_then(Value::as_f64) else {
        tracing::warn!("numeric jsonpath comparison requires a numeric threshold");
        return false;
    };
    matches.iter().filter_map(|v| v.as_f64()).any(|n| op(n, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string_is_case_insensitive_equality() {
        let cache = PatternCache::default();
        let pc = PatternConfig::Bare("Bash".into());
        assert!(eval_pattern_config(&cache, &pc, "bash"));
        assert!(!eval_pattern_config(&cache, &pc, "bash2"));
    }

    #[test]
    fn regex_predicate_matches() {
        let cache = PatternCache::default();
        let pred = Predicate::Regex { pattern: "rm\\s+-rf".into() };
        assert!(eval_predicate_text(&cache, &pred, "sudo rm -rf /"));
    }

    #[test]
    fn glob_predicate_matches_path() {
        let cache = PatternCache::default();
        let pred = Predicate::Glob { pattern: "/etc/*".into() };
        assert!(eval_predicate_text(&cache, &pred, "/etc/passwd"));
        assert!(!eval_predicate_text(&cache, &pred, "/home/user/file"));
    }

    #[test]
    fn jsonpath_exists() {
        let cache = PatternCache::default();
        let pred = Predicate::Jsonpath {
            pattern: "$.command".into(),
            comparison: JsonPathComparison::Exists,
            threshold: None,
        };
        assert!(eval_predicate_json(&cache, &pred, &json!({"command": "ls"})));
        assert!(!eval_predicate_json(&cache, &pred, &json!({"other": "x"})));
    }

    #[test]
    fn jsonpath_numeric_gt() {
        let cache = PatternCache::default();
        let pred = Predicate::Jsonpath {
            pattern: "$.count".into(),
            comparison: JsonPathComparison::Gt,
            threshold: Some(json!(10)),
        };
        assert!(eval_predicate_json(&cache, &pred, &json!({"count": 20})));
        assert!(!eval_predicate_json(&cache, &pred, &json!({"count": 5})));
    }

    #[test]
    fn invalid_regex_never_panics_just_false() {
        let cache = PatternCache::default();
        let pred = Predicate::Regex { pattern: "[unterminated".into() };
        assert!(!eval_predicate_text(&cache, &pred, "anything"));
    }
}

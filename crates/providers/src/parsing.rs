//! Shared output parsing for the CLI and HTTP providers (§4.7.1/§4.7.2):
//! extract a JSON `{...}` block from free-form assistant text, falling
//! back to line-oriented `DECISION:`/`REASON:`/`CONFIDENCE:` parsing.

use serde_json::Value;
use sp_domain::DecisionAction;

/// A provider's raw parsed verdict before it's wrapped into an
/// `InferenceDecision` (provider id / model / timing added by the caller).
pub struct ParsedVerdict {
    pub action: DecisionAction,
    pub reason: String,
    pub confidence: f64,
    pub risk_factors: Vec<String>,
}

/// Find the first balanced `{...}` substring and try to JSON-decode it.
/// Returns `None` if no balanced brace block parses as an object.
pub fn extract_json_block(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=i];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse provider output text into a verdict, defaulting to `default_action`
/// at `default_confidence` on any parse failure, per §4.7.1/§4.7.2.
pub fn parse_verdict(text: &str, default_action: DecisionAction, default_confidence: f64) -> ParsedVerdict {
    if let Some(json) = extract_json_block(text) {
        if let Some(v) = verdict_from_json(&json) {
            return v;
        }
    }
    if let Some(v) = verdict_from_lines(text) {
        return v;
    }
    ParsedVerdict {
        action: default_action,
        reason: text.chars().take(500).collect(),
        confidence: default_confidence,
        risk_factors: Vec::new(),
    }
}

fn verdict_from_json(json: &Value) -> Option<ParsedVerdict> {
    let action = json
        .get("decision")
        .or_else(|| json.get("action"))
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)?;
    let action = match action.as_str() {
        "allow" => DecisionAction::Allow,
        "deny" => DecisionAction::Deny,
        _ => return None,
    };
    let reason = json
        .get("reason")
        .or_else(|| json.get("reasoning"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let confidence = json.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);
    let risk_factors = json
        .get("risk_factors")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    Some(ParsedVerdict { action, reason, confidence, risk_factors })
}

fn verdict_from_lines(text: &str) -> Option<ParsedVerdict> {
    let mut action = None;
    let mut reason = String::new();
    let mut confidence = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = strip_prefix_ci(line, "DECISION:") {
            action = match rest.trim().to_ascii_lowercase().as_str() {
                "allow" => Some(DecisionAction::Allow),
                "deny" => Some(DecisionAction::Deny),
                _ => None,
            };
        } else if let Some(rest) = strip_prefix_ci(line, "REASONING:") {
            reason = rest.trim().to_string();
        } else if let Some(rest) = strip_prefix_ci(line, "REASON:") {
            reason = rest.trim().to_string();
        } else if let Some(rest) = strip_prefix_ci(line, "CONFIDENCE:") {
            confidence = rest.trim().parse::<f64>().ok();
        }
    }
    let action = action?;
    Some(ParsedVerdict {
        action,
        reason,
        confidence: confidence.unwrap_or(0.5),
        risk_factors: Vec::new(),
    })
}

fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

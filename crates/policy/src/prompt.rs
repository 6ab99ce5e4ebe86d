//! Prompt Builder (§4.10), grounded line-for-line on
//! `infrastructure/prompt_builder.py`'s `SecurePromptBuilder`: same
//! truncation lengths, same path-like-key denylist, same traversal
//! stripping. The template has no conditional/loop logic so a small
//! in-crate `format!` stands in for the original's Jinja template —
//! no pack repo pulls in a templating crate for this purpose.

use chrono::SecondsFormat;
use serde_json::Value;
use sp_domain::{sanitize_text, Error, Result, SecurityRule, ToolRequest};

const TEMPLATE: &str = r#"
You are a security evaluation system analyzing tool execution requests.

REQUEST DETAILS:
- Tool: {tool_name}
- Parameters: {parameters}
- Working Directory: {cwd}
- Agent: {agent_id}
- Session: {session_id}
- Timestamp: {timestamp}

RULE CONTEXT:
- Rule ID: {rule_id}
- Guidance: {guidance}

INSTRUCTIONS:
Evaluate if this tool request should be ALLOWED or DENIED based on:
1. Security implications of the tool and parameters
2. Potential for system damage or data exposure
3. Context provided in the rule guidance
4. Working directory and file access patterns

Respond with EXACTLY this format:
DECISION: [ALLOW|DENY]
REASON: [Brief explanation in one sentence]
CONFIDENCE: [0.0-1.0 numeric confidence score]

Your evaluation:
"#;

#[derive(Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds the evaluation prompt for a `sample` rule. Fails loudly
    /// (`ParameterValidation`) if `request.tool_name` isn't a valid
    /// identifier — a tool name is an identifier, not a string payload.
    pub fn build_evaluation_prompt(&self, request: &ToolRequest, rule: &SecurityRule) -> Result<String> {
        if !ToolRequest::is_valid_tool_name(&request.tool_name) {
            return Err(Error::ParameterValidation(format!("invalid tool name: {}", request.tool_name)));
        }

        let rendered = TEMPLATE
            .replacen("{tool_name}", &request.tool_name, 1)
            .replacen("{parameters}", &Self::sanitize_parameters(&request.parameters), 1)
            .replacen("{cwd}", &Self::sanitize_path(&request.cwd), 1)
            .replacen("{agent_id}", &Self::sanitize_identifier(&request.agent_id), 1)
            .replacen("{session_id}", &Self::sanitize_identifier(&request.session_id), 1)
            .replacen("{timestamp}", &request.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true), 1)
            .replacen("{rule_id}", &rule.id, 1)
            .replacen("{guidance}", &Self::sanitize_text(rule.sampling_guidance.as_deref().unwrap_or("")), 1);
        Ok(rendered)
    }

    fn is_path_like_key(key: &str) -> bool {
        matches!(
            key.to_ascii_lowercase().as_str(),
            "path" | "file" | "filename" | "filepath" | "directory" | "dir" | "cwd"
        )
    }

    /// Recursively stringify + sanitize a parameter tree, truncated to
    /// 1000 chars (matching `_sanitize_parameters`'s outer cap).
    fn sanitize_parameters(params: &Value) -> String {
        let rendered = Self::render_value(params);
        rendered.chars().take(1000).collect()
    }

    fn render_value(value: &Value) -> String {
        match value {
            Value::Object(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| {
                        let clean_key: String = k.chars().filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-').take(100).collect();
                        let clean_value = if Self::is_path_like_key(&clean_key) {
                            Self::sanitize_path(&Self::stringify(v))
                        } else {
                            Self::render_value(v)
                        };
                        format!("{clean_key}: {clean_value}")
                    })
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| Self::sanitize_text(&Self::stringify(v))).collect();
                format!("[{}]", parts.join(", "))
            }
            other => Self::sanitize_text(&Self::stringify(other)),
        }
    }

    fn stringify(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// `\.\./?` traversal stripped, control chars removed, capped at 500.
    fn sanitize_path(path: &str) -> String {
        let stripped = path.replace("../", "").replace("..", "");
        let clean = sanitize_text(&stripped);
        clean.chars().take(500).collect()
    }

    /// Alphanumeric/hyphen/underscore only, capped at 50.
    fn sanitize_identifier(identifier: &str) -> String {
        identifier.chars().filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-').take(50).collect()
    }

    /// HTML-escaped, control chars stripped, capped at 2000.
    fn sanitize_text(text: &str) -> String {
        let escaped = html_escape(text);
        let clean = sanitize_text_chars(&escaped);
        clean.chars().take(2000).collect()
    }
}

fn sanitize_text_chars(s: &str) -> String {
    s.chars().filter(|&c| c == '\n' || c == '\t' || !c.is_control()).collect()
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sp_domain::{Conditions, RuleAction};

    fn rule() -> SecurityRule {
        SecurityRule {
            id: "R1".into(),
            priority: 10,
            enabled: true,
            action: RuleAction::Sample,
            reason: None,
            sampling_guidance: Some("<script>check carefully</script>".into()),
            inference_provider: None,
            conditions: Conditions::default(),
        }
    }

    #[test]
    fn rejects_invalid_tool_name() {
        let builder = PromptBuilder::new();
        let req = ToolRequest::new("9Bash", serde_json::json!({}), "s", "a", "/home", Utc::now());
        let err = builder.build_evaluation_prompt(&req, &rule()).unwrap_err();
        assert!(matches!(err, Error::ParameterValidation(_)));
    }

    #[test]
    fn html_escapes_guidance_and_includes_rule_id() {
        let builder = PromptBuilder::new();
        let req = ToolRequest::new("Bash", serde_json::json!({"command": "ls"}), "s", "a", "/home", Utc::now());
        let prompt = builder.build_evaluation_prompt(&req, &rule()).unwrap();
        assert!(prompt.contains("&lt;script&gt;"));
        assert!(prompt.contains("Rule ID: R1"));
        assert!(prompt.contains("Tool: Bash"));
    }

    #[test]
    fn path_like_parameter_is_traversal_stripped() {
        let builder = PromptBuilder::new();
        let req = ToolRequest::new(
            "Read",
            serde_json::json!({"file_path": "../../etc/passwd"}),
            "s",
            "a",
            "/home",
            Utc::now(),
        );
        let prompt = builder.build_evaluation_prompt(&req, &rule()).unwrap();
        assert!(!prompt.contains(".."));
    }
}

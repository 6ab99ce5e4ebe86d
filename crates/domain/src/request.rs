//! The request side of the data model (§3): an immutable value created per
//! evaluation, sanitized at construction so nothing downstream needs to
//! re-sanitize raw input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// An agent's intent to invoke a named operation with parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_name: String,
    pub parameters: Value,
    pub session_id: String,
    pub agent_id: String,
    pub cwd: String,
    pub timestamp: DateTime<Utc>,
}

fn tool_name_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

impl ToolRequest {
    /// Build a request, sanitizing `parameters`, `cwd`, `session_id`, and
    /// `agent_id` in place. Does not validate `tool_name` — callers that
    /// need the identifier invariant enforced (e.g. the Prompt Builder)
    /// check it themselves, since some callers (e.g. the hook adapter)
    /// want to surface a `ParameterValidation` error rather than silently
    /// truncate the name.
    pub fn new(
        tool_name: impl Into<String>,
        parameters: Value,
        session_id: impl Into<String>,
        agent_id: impl Into<String>,
        cwd: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: sanitize_value(&parameters, false),
            session_id: sanitize_text(&session_id.into()),
            agent_id: sanitize_text(&agent_id.into()),
            cwd: sanitize_path(&cwd.into()),
            timestamp,
        }
    }

    /// `^[A-Za-z_][A-Za-z0-9_]*$` — a tool name is an identifier, not a
    /// string payload.
    pub fn is_valid_tool_name(name: &str) -> bool {
        tool_name_re().is_match(name)
    }
}

/// NUL stripped, CRLF→LF, non-printable control chars removed except
/// `\n`/`\t`.
pub fn sanitize_text(s: &str) -> String {
    let s = s.replace('\0', "").replace("\r\n", "\n").replace('\r', "\n");
    s.chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

/// Same as [`sanitize_text`], plus `..` and path separators scrubbed — for
/// path-like keys/values.
pub fn sanitize_path(s: &str) -> String {
    let s = sanitize_text(s);
    s.replace("..", "").replace(['/', '\\'], "")
}

fn is_path_like_key(key: &str) -> bool {
    matches!(
        key.to_ascii_lowercase().as_str(),
        "path" | "file" | "filename" | "filepath" | "directory" | "dir" | "cwd"
    )
}

/// Recursively sanitize a JSON value tree: keys and string leaves get
/// [`sanitize_text`]; path-like keys additionally get [`sanitize_path`]
/// applied to their string values.
fn sanitize_value(value: &Value, parent_is_path_like: bool) -> Value {
    match value {
        Value::String(s) => {
            if parent_is_path_like {
                Value::String(sanitize_path(s))
            } else {
                Value::String(sanitize_text(s))
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| sanitize_value(v, parent_is_path_like))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let clean_key = sanitize_text(k);
                let path_like = is_path_like_key(&clean_key);
                out.insert(clean_key, sanitize_value(v, path_like));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_nul_and_normalizes_crlf() {
        assert_eq!(sanitize_text("a\0b\r\nc\rd"), "ab\nc\nd");
    }

    #[test]
    fn strips_control_chars_but_keeps_newline_tab() {
        let s = "a\x07b\nc\td";
        assert_eq!(sanitize_text(s), "ab\nc\td");
    }

    #[test]
    fn path_sanitization_scrubs_traversal_and_separators() {
        assert_eq!(sanitize_path("../../etc/passwd"), "etcpasswd");
    }

    #[test]
    fn valid_tool_names() {
        assert!(ToolRequest::is_valid_tool_name("Bash"));
        assert!(ToolRequest::is_valid_tool_name("_private9"));
        assert!(!ToolRequest::is_valid_tool_name("9Bash"));
        assert!(!ToolRequest::is_valid_tool_name("bash-tool"));
        assert!(!ToolRequest::is_valid_tool_name(""));
    }

    #[test]
    fn path_like_keys_get_path_sanitization_recursively() {
        let params = json!({
            "file_path": "../../etc/passwd",
            "nested": { "directory": "../secret" },
            "content": "../not/a/path/key"
        });
        let req = ToolRequest::new(
            "Write",
            params,
            "sess",
            "agent",
            "/home/user",
            Utc::now(),
        );
        assert_eq!(req.parameters["file_path"], "etcpasswd");
        assert_eq!(req.parameters["nested"]["directory"], "secret");
        // "content" is not a path-like key: `..` is preserved by text sanitization.
        assert_eq!(req.parameters["content"], "../not/a/path/key");
    }
}

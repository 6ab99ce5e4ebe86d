//! CLI Provider (§4.7.1): shells out to an external agent binary in
//! non-interactive streaming-JSON mode. No shell is ever invoked; the
//! command and its arguments are always passed as an argv vector.

use crate::parsing::parse_verdict;
use crate::provider::InferenceProvider;
use async_trait::async_trait;
use serde_json::Value;
use sp_domain::{sanitize_text, DecisionAction, Error, InferenceDecision, InferenceRequest, Result};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const MAX_PROMPT_CHARS: usize = 10_000;
const TRUNCATION_MARKER: &str = "...[truncated]";
const ENV_BLACKLIST: &[&str] = &["LD_PRELOAD", "LD_LIBRARY_PATH", "PYTHON_PATH"];

fn model_name_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9._-]+$").unwrap())
}

pub struct CliProvider {
    id: String,
    command: String,
    model: Option<String>,
    append_system_prompt: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
}

impl CliProvider {
    pub fn new(config: &sp_domain::CliProviderConfig) -> Self {
        Self {
            id: config.id.clone(),
            command: config.command.clone(),
            model: config.model.clone(),
            append_system_prompt: config.append_system_prompt.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// NUL stripped, CRLF→LF, control chars removed, capped at 10000
    /// chars with a truncation marker suffix.
    fn sanitize_prompt(prompt: &str) -> String {
        let cleaned = sanitize_text(prompt);
        if cleaned.chars().count() <= MAX_PROMPT_CHARS {
            cleaned
        } else {
            let keep = MAX_PROMPT_CHARS.saturating_sub(TRUNCATION_MARKER.len());
            let mut truncated: String = cleaned.chars().take(keep).collect();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
    }

    fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(model) = &self.model {
            if model_name_re().is_match(model) && model.len() < 100 {
                args.push("--model".to_string());
                args.push(model.clone());
            }
        }
        if let Some(sp) = &self.append_system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(Self::sanitize_prompt(sp));
        }
        args
    }

    fn envelope(prompt: &str) -> Value {
        serde_json::json!({
            "type": "user",
            "message": { "role": "user", "content": [{"type": "text", "text": prompt}] },
        })
    }

    async fn run_once(&self, prompt: &str, timeout: Duration) -> Result<String> {
        let mut cmd = Command::new(&self.command);
        cmd.args(self.build_args());
        for var in ENV_BLACKLIST {
            cmd.env_remove(var);
        }
        for (key, _) in std::env::vars() {
            if key.starts_with("DYLD_") {
                cmd.env_remove(&key);
            }
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            Error::Provider { provider: self.id.clone(), message: format!("spawn failed: {e}") }
        })?;

        let line = serde_json::to_string(&Self::envelope(prompt)).map_err(Error::Json)?;
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(line.as_bytes()).await;
            let _ = stdin.write_all(b"\n").await;
            let _ = stdin.shutdown().await;
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::AIServiceTimeout(format!("CLI provider '{}' timed out", self.id)))?
            .map_err(|e| Error::Provider { provider: self.id.clone(), message: format!("wait failed: {e}") })?;

        if !output.status.success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("CLI exited with {}", output.status),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(Error::Provider { provider: self.id.clone(), message: "empty stdout".into() });
        }
        Ok(stdout)
    }

    /// Find the `type == "result"` object (falling back to the last
    /// `type == "assistant"`), then extract its text.
    fn extract_text(stdout: &str) -> Option<String> {
        let mut last_assistant: Option<Value> = None;
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(obj): std::result::Result<Value, _> = serde_json::from_str(line) else {
                continue;
            };
            match obj.get("type").and_then(Value::as_str) {
                Some("result") => return Some(text_from_object(&obj)),
                Some("assistant") => last_assistant = Some(obj),
                _ => {}
            }
        }
        last_assistant.map(|obj| text_from_object(&obj))
    }
}

fn text_from_object(obj: &Value) -> String {
    if let Some(content) = obj.pointer("/message/content").and_then(Value::as_array) {
        let joined: String = content
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        if !joined.is_empty() {
            return joined;
        }
    }
    if let Some(result) = obj.get("result").and_then(Value::as_str) {
        return result.to_string();
    }
    if let Some(content) = obj.get("content").and_then(Value::as_str) {
        return content.to_string();
    }
    String::new()
}

#[async_trait]
impl InferenceProvider for CliProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn evaluate(&self, request: &InferenceRequest) -> Result<InferenceDecision> {
        let start = Instant::now();
        let prompt = Self::sanitize_prompt(&request.prompt);
        let timeout = request.timeout.min(Duration::from_secs(30));

        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.run_once(&prompt, timeout).await {
                Ok(stdout) => {
                    let text = Self::extract_text(&stdout).unwrap_or_default();
                    let verdict = parse_verdict(&text, DecisionAction::Deny, 0.5);
                    return Ok(InferenceDecision {
                        action: verdict.action,
                        reason: verdict.reason,
                        confidence: verdict.confidence,
                        risk_factors: verdict.risk_factors,
                        provider: self.id.clone(),
                        model: self.model.clone(),
                        response_time_ms: start.elapsed().as_millis() as u64,
                    });
                }
                Err(e) => {
                    let is_timeout = matches!(e, Error::AIServiceTimeout(_));
                    last_err = Some(e);
                    if is_timeout || attempt == self.max_retries {
                        break;
                    }
                    tracing::warn!(provider = %self.id, attempt, "CLI provider failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Provider { provider: self.id.clone(), message: "unknown failure".into() }))
    }

    async fn health_check(&self) -> bool {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--version");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        let Ok(mut child) = cmd.spawn() else { return false };
        matches!(
            tokio::time::timeout(Duration::from_secs(5), child.wait()).await,
            Ok(Ok(status)) if status.success()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_prompt_caps_length_with_marker() {
        let long = "a".repeat(20_000);
        let out = CliProvider::sanitize_prompt(&long);
        assert_eq!(out.chars().count(), MAX_PROMPT_CHARS);
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn extract_text_prefers_result_type() {
        let stdout = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"stale"}]}}
{"type":"result","message":{"content":[{"type":"text","text":"DECISION: allow"}]}}"#;
        assert_eq!(CliProvider::extract_text(stdout).unwrap(), "DECISION: allow");
    }

    #[test]
    fn extract_text_falls_back_to_last_assistant() {
        let stdout = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}
{"type":"assistant","message":{"content":[{"type":"text","text":"last"}]}}"#;
        assert_eq!(CliProvider::extract_text(stdout).unwrap(), "last");
    }

    #[test]
    fn extract_text_falls_back_to_result_field() {
        let stdout = r#"{"type":"result","result":"DECISION: deny"}"#;
        assert_eq!(CliProvider::extract_text(stdout).unwrap(), "DECISION: deny");
    }

    #[test]
    fn model_name_validation_rejects_unsafe_chars() {
        assert!(model_name_re().is_match("claude-3-opus"));
        assert!(!model_name_re().is_match("claude; rm -rf /"));
    }
}

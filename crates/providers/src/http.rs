//! HTTP API Provider (§4.7.2): generic POST-JSON adapter with two
//! concrete variants for the `claude` and `openai` chat-completion wire
//! shapes, adapted from `OpenAiCompatProvider`'s auth-header construction
//! pattern.

use crate::parsing::parse_verdict;
use crate::provider::InferenceProvider;
use async_trait::async_trait;
use serde_json::{json, Value};
use sp_domain::{DecisionAction, Error, HttpProviderConfig, HttpProviderKind, InferenceDecision, InferenceRequest, Result};
use std::time::Instant;

pub struct HttpProvider {
    id: String,
    kind: HttpProviderKind,
    base_url: String,
    api_key: String,
    model: Option<String>,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(config: &HttpProviderConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            Error::Config(format!("env var '{}' not set for provider '{}'", config.api_key_env, config.id))
        })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            id: config.id.clone(),
            kind: config.kind,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            client,
        })
    }

    fn default_model(&self) -> &str {
        match self.kind {
            HttpProviderKind::Claude => "claude-3-5-haiku-20241022",
            HttpProviderKind::Openai => "gpt-4o-mini",
        }
    }

    fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.default_model())
    }

    fn build_request(&self, request: &InferenceRequest) -> (String, Value) {
        match self.kind {
            HttpProviderKind::Claude => {
                let url = format!("{}/v1/messages", self.base_url);
                let body = json!({
                    "model": self.effective_model(),
                    "max_tokens": 500,
                    "temperature": 0.0,
                    "system": "You are a security policy evaluator. Reply with DECISION: allow|deny, REASON: <text>, CONFIDENCE: <0-1>.",
                    "messages": [{"role": "user", "content": request.prompt}],
                });
                (url, body)
            }
            HttpProviderKind::Openai => {
                let url = format!("{}/v1/chat/completions", self.base_url);
                let body = json!({
                    "model": self.effective_model(),
                    "max_tokens": 500,
                    "temperature": 0.0,
                    "messages": [
                        {"role": "system", "content": "You are a security policy evaluator. Reply with DECISION: allow|deny, REASON: <text>, CONFIDENCE: <0-1>."},
                        {"role": "user", "content": request.prompt},
                    ],
                });
                (url, body)
            }
        }
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(url).header("Content-Type", "application/json");
        match self.kind {
            HttpProviderKind::Claude => req.header("x-api-key", &self.api_key).header("anthropic-version", "2023-06-01"),
            HttpProviderKind::Openai => req.header("Authorization", format!("Bearer {}", self.api_key)),
        }
    }

    fn extract_text(&self, body: &Value) -> String {
        match self.kind {
            HttpProviderKind::Claude => body
                .get("content")
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default(),
            HttpProviderKind::Openai => body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

#[async_trait]
impl InferenceProvider for HttpProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn evaluate(&self, request: &InferenceRequest) -> Result<InferenceDecision> {
        let start = Instant::now();
        let (url, body) = self.build_request(request);
        let resp = self
            .authed_post(&url)
            .json(&body)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| Error::Provider { provider: self.id.clone(), message: format!("request failed: {e}") })?;

        if resp.status().is_client_error() || resp.status().is_server_error() {
            return Err(Error::AIServiceUnavailable(format!(
                "provider '{}' returned HTTP {}",
                self.id,
                resp.status()
            )));
        }
        let json_body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Provider { provider: self.id.clone(), message: format!("bad JSON body: {e}") })?;
        let text = self.extract_text(&json_body);
        let verdict = parse_verdict(&text, DecisionAction::Deny, 0.3);
        Ok(InferenceDecision {
            action: verdict.action,
            reason: verdict.reason,
            confidence: verdict.confidence,
            risk_factors: verdict.risk_factors,
            provider: self.id.clone(),
            model: Some(self.effective_model().to_string()),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claude_cfg() -> HttpProviderConfig {
        HttpProviderConfig {
            id: "claude-http".into(),
            kind: HttpProviderKind::Claude,
            base_url: "https://api.anthropic.com".into(),
            api_key_env: "SP_TEST_CLAUDE_KEY".into(),
            model: None,
        }
    }

    #[test]
    fn missing_api_key_env_is_a_config_error() {
        std::env::remove_var("SP_TEST_CLAUDE_KEY");
        let err = HttpProvider::new(&claude_cfg()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn claude_extracts_content_blocks() {
        std::env::set_var("SP_TEST_CLAUDE_KEY", "k");
        let provider = HttpProvider::new(&claude_cfg()).unwrap();
        let body = json!({"content": [{"type": "text", "text": "DECISION: allow"}]});
        assert_eq!(provider.extract_text(&body), "DECISION: allow");
        std::env::remove_var("SP_TEST_CLAUDE_KEY");
    }

    #[test]
    fn openai_extracts_message_content() {
        std::env::set_var("SP_TEST_OPENAI_KEY", "k");
        let cfg = HttpProviderConfig {
            id: "openai-http".into(),
            kind: HttpProviderKind::Openai,
            base_url: "https://api.openai.com".into(),
            api_key_env: "SP_TEST_OPENAI_KEY".into(),
            model: None,
        };
        let provider = HttpProvider::new(&cfg).unwrap();
        let body = json!({"choices": [{"message": {"content": "DECISION: deny"}}]});
        assert_eq!(provider.extract_text(&body), "DECISION: deny");
        std::env::remove_var("SP_TEST_OPENAI_KEY");
    }
}

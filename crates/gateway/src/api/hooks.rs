//! `POST /v1/hooks` — the Claude Code `PreToolUse` hook wire format (§6).

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sp_domain::{Decision, DecisionAction, ToolRequest};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HookRequest {
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: Option<String>,
    pub cwd: String,
    #[serde(default)]
    pub hook_event_name: Option<String>,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Value,
}

#[derive(Debug, Serialize)]
pub struct HookSpecificOutput {
    #[serde(rename = "hookEventName")]
    pub hook_event_name: &'static str,
    #[serde(rename = "permissionDecision")]
    pub permission_decision: &'static str,
    #[serde(rename = "permissionDecisionReason")]
    pub permission_decision_reason: String,
}

#[derive(Debug, Serialize)]
pub struct HookResponse {
    #[serde(rename = "hookSpecificOutput")]
    pub hook_specific_output: HookSpecificOutput,
    pub decision: &'static str,
    pub reason: String,
}

pub async fn handle_hook(State(state): State<AppState>, Json(hook): Json<HookRequest>) -> Json<HookResponse> {
    match hook.hook_event_name.as_deref() {
        Some("PreToolUse") | None => {}
        Some(other) => tracing::warn!(hook_event_name = other, "unexpected hook_event_name, evaluating anyway"),
    }
    // transcript_path round-trips through deserialization but is not load-bearing.
    let _ = &hook.transcript_path;

    let request = ToolRequest::new(
        hook.tool_name,
        hook.tool_input,
        hook.session_id,
        String::new(),
        hook.cwd,
        Utc::now(),
    );
    let decision = state.engine.evaluate(request).await;
    Json(to_hook_response(&decision))
}

fn to_hook_response(decision: &Decision) -> HookResponse {
    let (permission_decision, wire_decision) = match decision.action {
        DecisionAction::Allow => ("allow", "approve"),
        DecisionAction::Deny => ("deny", "block"),
    };
    HookResponse {
        hook_specific_output: HookSpecificOutput {
            hook_event_name: "PreToolUse",
            permission_decision,
            permission_decision_reason: decision.reason.clone(),
        },
        decision: wire_decision,
        reason: decision.reason.clone(),
    }
}

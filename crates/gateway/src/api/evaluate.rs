//! `POST /v1/evaluate` — native `ToolRequest` in, `Decision` out.

use axum::extract::State;
use axum::Json;
use sp_domain::{Decision, ToolRequest};

use crate::state::AppState;

pub async fn handle_evaluate(State(state): State<AppState>, Json(request): Json<ToolRequest>) -> Json<Decision> {
    Json(state.engine.evaluate(request).await)
}

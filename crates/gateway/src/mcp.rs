//! Stdio MCP transport (§6): a newline-delimited JSON-RPC loop over
//! stdin/stdout exposing a single tool, `evaluate_tool_request`. Adapted
//! from `mcp-client`'s client-side `StdioTransport` framing to the
//! server role — read a line, decode, dispatch, write a line.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

const TOOL_NAME: &str = "evaluate_tool_request";

/// Run the loop until stdin is closed (EOF).
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);

    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = read_line(&mut reader, &mut line).await?;
        if bytes_read == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(req) => dispatch(&state, req).await,
            Err(e) => JsonRpcResponse {
                jsonrpc: "2.0",
                id: Value::Null,
                result: None,
                error: Some(JsonRpcError { code: -32700, message: format!("parse error: {e}") }),
            },
        };

        write_line(&mut stdout, &serde_json::to_string(&response)?).await?;
    }

    Ok(())
}

async fn read_line(reader: &mut BufReader<Stdin>, buf: &mut String) -> anyhow::Result<usize> {
    Ok(reader.read_line(buf).await?)
}

async fn write_line(stdout: &mut Stdout, json: &str) -> anyhow::Result<()> {
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn dispatch(state: &AppState, req: JsonRpcRequest) -> JsonRpcResponse {
    let id = req.id.unwrap_or(Value::Null);
    match req.method.as_str() {
        "initialize" => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": { "name": "security-policy-engine", "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
            })),
            error: None,
        },
        "tools/list" => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(json!({
                "tools": [{
                    "name": TOOL_NAME,
                    "description": "Evaluate a tool invocation request against the security policy and return allow/deny.",
                    "inputSchema": {
                        "type": "object",
                        "required": ["tool_name", "parameters", "session_id", "agent_id", "cwd"],
                        "properties": {
                            "tool_name": { "type": "string" },
                            "parameters": { "type": "object" },
                            "session_id": { "type": "string" },
                            "agent_id": { "type": "string" },
                            "cwd": { "type": "string" },
                        }
                    }
                }]
            })),
            error: None,
        },
        "tools/call" => handle_tool_call(state, id, req.params).await,
        other => JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code: -32601, message: format!("method not found: {other}") }),
        },
    }
}

async fn handle_tool_call(state: &AppState, id: Value, params: Option<Value>) -> JsonRpcResponse {
    let params = params.unwrap_or(Value::Null);
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    if name != TOOL_NAME {
        return JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError { code: -32602, message: format!("unknown tool: {name}") }),
        };
    }

    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
    let request: sp_domain::ToolRequest = match serde_json::from_value(arguments) {
        Ok(r) => r,
        Err(e) => {
            return JsonRpcResponse {
                jsonrpc: "2.0",
                id,
                result: None,
                error: Some(JsonRpcError { code: -32602, message: format!("invalid arguments: {e}") }),
            };
        }
    };

    let decision = state.engine.evaluate(request).await;

    JsonRpcResponse {
        jsonrpc: "2.0",
        id,
        result: Some(json!({
            "content": [{ "type": "text", "text": serde_json::to_string(&decision).unwrap_or_default() }]
        })),
        error: None,
    }
}

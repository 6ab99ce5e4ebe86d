//! `advise` subcommand — a one-shot adapter over the Policy Engine (§6).
//!
//! Exit codes: `0` decision emitted on stdout, `1` input validation error,
//! `2` evaluation error (bootstrap/config failure fed back to the host tool).

use std::io::Read;
use std::sync::Arc;

use sp_domain::ToolRequest;

use crate::bootstrap;

/// Returns the process exit code: `0` decision emitted, `1` input
/// validation error, `2` evaluation error.
pub async fn run(file: Option<String>) -> i32 {
    let raw = match read_input(file.as_deref()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error reading request: {e}");
            return 1;
        }
    };

    let request: ToolRequest = match serde_json::from_str(&raw) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("invalid ToolRequest JSON: {e}");
            return 1;
        }
    };

    let (config, config_path) = match super::load_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("evaluation error: {e}");
            return 2;
        }
    };

    let bootstrapped = match bootstrap::bootstrap(Arc::new(config), config_path, false).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("evaluation error: {e}");
            return 2;
        }
    };

    let decision = bootstrapped.state.engine.evaluate(request).await;
    match serde_json::to_string(&decision) {
        Ok(json) => {
            println!("{json}");
            0
        }
        Err(e) => {
            eprintln!("evaluation error: failed to serialize decision: {e}");
            2
        }
    }
}

fn read_input(file: Option<&str>) -> std::io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

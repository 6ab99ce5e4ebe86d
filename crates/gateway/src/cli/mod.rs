pub mod advise;

use clap::{Parser, Subcommand};

/// Security Policy Engine — a policy-enforcement gateway for AI coding agents.
#[derive(Debug, Parser)]
#[command(name = "security-policy-engine", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP + stdio-MCP server (default when no subcommand is given).
    Serve,
    /// Run the stdio MCP transport only (single tool `evaluate_tool_request`).
    Mcp,
    /// Evaluate a single `ToolRequest` and print the `Decision`, then exit.
    Advise {
        /// Read the request from this file instead of stdin.
        #[arg(long)]
        file: Option<String>,
    },
    /// Print version information.
    Version,
}

/// Load the configuration from the path named by `SP_CONFIG` (or
/// `config.yaml` by default). Returns the parsed [`Config`] and the path
/// that was used. Shared by `serve`, `mcp`, and `advise`.
pub fn load_config() -> anyhow::Result<(sp_domain::config::Config, std::path::PathBuf)> {
    let config_path = std::env::var("SP_CONFIG").unwrap_or_else(|_| "config.yaml".into());
    let config_path = std::path::PathBuf::from(config_path);

    let config = if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", config_path.display()))?;
        serde_yaml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", config_path.display()))?
    } else {
        sp_domain::config::Config::default()
    };

    Ok((config, config_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // SP_CONFIG is process-wide; serialize tests that touch it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_config_file_yields_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SP_CONFIG", "/nonexistent/config.yaml");
        let (config, path) = load_config().unwrap();
        assert_eq!(path, std::path::PathBuf::from("/nonexistent/config.yaml"));
        assert_eq!(config.server.port, 8787);
        std::env::remove_var("SP_CONFIG");
    }

    #[test]
    fn existing_yaml_file_is_parsed() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  port: 9999\n").unwrap();
        std::env::set_var("SP_CONFIG", &path);
        let (config, _) = load_config().unwrap();
        assert_eq!(config.server.port, 9999);
        std::env::remove_var("SP_CONFIG");
    }
}

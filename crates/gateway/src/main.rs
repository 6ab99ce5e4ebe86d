use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sp_gateway::api;
use sp_gateway::bootstrap;
use sp_gateway::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, config_path) = cli::load_config()?;
            run_server(Arc::new(config), config_path).await
        }
        Some(Command::Mcp) => {
            init_tracing();
            let (config, config_path) = cli::load_config()?;
            let bootstrapped = bootstrap::bootstrap(Arc::new(config), config_path, true).await?;
            sp_gateway::mcp::serve(bootstrapped.state).await
        }
        Some(Command::Advise { file }) => {
            let code = cli::advise::run(file).await;
            std::process::exit(code);
        }
        Some(Command::Version) => {
            println!("security-policy-engine {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sp_gateway=debug")))
        .json()
        .init();
}

/// Start the HTTP server with the given configuration.
async fn run_server(config: Arc<sp_domain::config::Config>, config_path: std::path::PathBuf) -> anyhow::Result<()> {
    tracing::info!("security policy engine starting");

    let bootstrapped = bootstrap::bootstrap(config.clone(), config_path, true).await?;
    let state = bootstrapped.state;

    let cors_layer = api::build_cors_layer(&state.config.server.cors);
    let max_concurrent = state.config.queue.max_concurrent.max(1);

    let app = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "security policy engine listening");

    let shutdown = state.shutdown.clone();
    let watcher = bootstrapped.watcher.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown.notified() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            tracing::info!("shutdown signal received, draining within grace period");
        })
        .await
        .context("axum server error")?;

    if let Some(w) = watcher {
        w.stop();
    }
    let grace = tokio::time::Duration::from_secs(10);
    if !state.queue.wait_for_completion(grace).await {
        tracing::warn!("request queue still draining after grace period, force-cancelling");
    }
    state.queue.stop().await;

    Ok(())
}

//! lifeline-mcp: stdio MCP server entry point.
//! Wires the Slack transport and session coordinator to the ask_human tool.

mod handler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{transport::stdio, ServiceExt};
use tracing::{error, info};

use lifeline_core::config::Config;
use lifeline_core::coordinator::{CoordinatorConfig, SessionCoordinator};
use lifeline_core::transport::SlackTransport;

use handler::LifelineHandler;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP protocol, so all logging goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config()?;
    let transport = Arc::new(SlackTransport::new(config.slack.clone())?);
    let coordinator = Arc::new(SessionCoordinator::new(
        transport,
        CoordinatorConfig::from(&config),
    ));

    let dispatcher = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = coordinator.run().await {
                error!(error = %e, "reply dispatcher exited");
            }
        })
    };

    info!(channel = %config.slack.channel_id, "starting MCP stdio server");
    let service = LifelineHandler::new(coordinator)
        .serve(stdio())
        .await
        .context("Failed to start MCP stdio server")?;

    tokio::select! {
        result = service.waiting() => {
            result.context("MCP service stopped unexpectedly")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    dispatcher.abort();
    Ok(())
}

/// Configuration comes from `LIFELINE_CONFIG`, then `./lifeline.yaml`,
/// then environment variables alone.
fn load_config() -> Result<Config> {
    if let Ok(path) = std::env::var("LIFELINE_CONFIG") {
        return Config::load(&PathBuf::from(path));
    }
    let default = PathBuf::from("lifeline.yaml");
    if default.exists() {
        return Config::load(&default);
    }
    Config::from_env()
}

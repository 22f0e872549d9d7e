//! focus-bridge MCP Server Binary
//!
//! Serves the query, mutation and analysis tools over stdio.
//!
//! ## Usage
//!
//! ```bash
//! ./target/debug/focus_mcp --config focus.yaml
//! ```
//!
//! ## Environment Variables
//!
//! - `FOCUS_CONFIG` (optional): YAML config file, when `--config` is absent
//! - `FOCUS_OSASCRIPT`, `FOCUS_SCRIPT_TIMEOUT_MS`, `FOCUS_MAX_RETRIES`,
//!   `FOCUS_CIRCUIT_THRESHOLD`, `FOCUS_CIRCUIT_COOLDOWN_MS`: per-setting overrides
//! - `RUST_LOG` (optional): log filter, default `focus_bridge=info`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use focus_bridge::mcp::McpServer;
use focus_bridge::{EngineConfig, FocusTools, OsascriptRunner};

#[cfg(feature = "cli")]
#[derive(clap::Parser, Debug)]
#[command(name = "focus_mcp")]
#[command(about = "MCP stdio server for OmniFocus automation")]
struct Args {
    /// YAML configuration file
    #[arg(long, short = 'c', env = "FOCUS_CONFIG")]
    config: Option<PathBuf>,
}

#[cfg(feature = "cli")]
fn config_path() -> Option<PathBuf> {
    use clap::Parser;
    Args::parse().config
}

#[cfg(not(feature = "cli"))]
fn config_path() -> Option<PathBuf> {
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // stdout carries the protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("focus_bridge=info")),
        )
        .init();

    let path = config_path();
    let config = EngineConfig::load(path.as_deref()).context("loading engine config")?;
    info!(
        program = %config.bridge.program,
        timeout_ms = config.bridge.timeout_ms,
        "Starting focus_mcp"
    );

    let runner = Arc::new(OsascriptRunner::from_config(&config.bridge));
    let tools = Arc::new(FocusTools::new(&config, runner));
    McpServer::new(tools).run().await
}

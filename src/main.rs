mod ado;
mod config;
mod git;
mod resources;
mod server;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use config::{Config, Transport};
use git::GitRemote;
use resources::AppContext;
use server::McpServer;

/// MCP server exposing the pull requests of Azure DevOps repositories as
/// read-only resources.
#[derive(Parser, Debug)]
#[command(name = "ado-pr-mcp", version, about)]
struct Cli {
    /// Config file (defaults to .ado-pr-mcp.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport to serve on, overriding MCP_TRANSPORT and the config file
    #[arg(short, long, value_enum)]
    transport: Option<Transport>,

    /// Directory whose git remote identifies the current repository
    #[arg(long)]
    workdir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!(?config, "loaded configuration");
    info!(transport = %config.transport, "starting ado-pr-mcp");

    let mut remote = GitRemote::new();
    if let Some(workdir) = cli.workdir {
        remote = remote.in_dir(workdir);
    }

    let transport = config.transport;
    let server = Arc::new(McpServer::new(AppContext::new(config, Box::new(remote))));
    match transport {
        Transport::Stdio => server::serve_stdio(Arc::clone(&server)).await?,
        Transport::Http => server::serve_http(Arc::clone(&server), server::HTTP_ADDR).await?,
    }

    match Arc::try_unwrap(server) {
        Ok(server) => server.into_context().close(),
        // In-flight request tasks still hold the server; the client goes with them.
        Err(_) => debug!("requests still in flight at shutdown"),
    }
    info!("shutdown complete");

    Ok(())
}

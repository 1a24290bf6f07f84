//! Package Registry MCP Server
//!
//! This binary serves the MCP server over streamable HTTP.
//!
//! Architecture:
//! - One tokio runtime runs the accept loop; each connection gets its own task
//! - A background task reaps idle sessions
//! - On SIGINT/SIGTERM the accept loop stops and live sessions are closed

use clap::{Args, Parser, Subcommand};
use package_registry_mcp::config::{
    nonzero_secs, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
    DEFAULT_SSE_KEEP_ALIVE_SECS, DEFAULT_UPSTREAM_TIMEOUT_SECS,
};
use package_registry_mcp::http::DEFAULT_MAX_BODY_BYTES;
use package_registry_mcp::{
    serve, spawn_idle_reaper, tool_registry, FrontDoor, PackageRegistryServer, RegistryCatalog,
    ServerConfig, SessionRegistry, ToolCategory, UpstreamClient,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "package-registry-mcp",
    version,
    about = "MCP server for npm, crates.io and PyPI package information"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tool catalog and exit
    Tools,
}

#[derive(Args)]
struct ServeArgs {
    /// Host to bind
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    host: String,
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Close sessions idle for this many seconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_SESSION_IDLE_TIMEOUT_SECS)]
    session_idle_timeout_secs: u64,
    /// SSE keep-alive interval in seconds (0 disables)
    #[arg(long, default_value_t = DEFAULT_SSE_KEEP_ALIVE_SECS)]
    sse_keep_alive_secs: u64,
    /// Always answer with a single JSON body, even if the client accepts SSE
    #[arg(long)]
    json_response: bool,
    /// Timeout for upstream registry requests in seconds
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECS)]
    upstream_timeout_secs: u64,
    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            session_idle_timeout: nonzero_secs(args.session_idle_timeout_secs),
            sse_keep_alive: nonzero_secs(args.sse_keep_alive_secs),
            json_response: args.json_response,
            upstream_timeout: Duration::from_secs(args.upstream_timeout_secs.max(1)),
            max_body_bytes: args.max_body_bytes,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("package_registry_mcp=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Tools) => {
            print_tools();
            Ok(())
        }
        None => run_server(cli.serve.into()).await,
    }
}

fn print_tools() {
    for &category in ToolCategory::all() {
        println!("{} - {}", category.as_str(), category.description());
        for tool in tool_registry::tools_in(category) {
            println!("  {:<16} {}", tool.name, tool.short_desc);
        }
    }
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigquit = signal(SignalKind::quit())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
            _ = sigquit.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!("Starting Package Registry MCP Server (streamable HTTP mode)");

    let bind_addr = config.bind_addr()?;
    let client = UpstreamClient::new(config.upstream_timeout)
        .map_err(|e| anyhow::anyhow!("failed to build upstream client: {e}"))?;
    let catalog = Arc::new(RegistryCatalog::new(client));
    info!(tools = catalog.len(), "Operation catalog ready");

    let engine = Arc::new(PackageRegistryServer::new(catalog));
    let registry = SessionRegistry::new(config.transport());
    let front_door = FrontDoor::new(registry.clone(), engine)
        .with_json_response(config.json_response)
        .with_max_body_bytes(config.max_body_bytes);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind failed: {e}"))?;

    let cancel = CancellationToken::new();
    let reaper = match (config.session_idle_timeout, config.sweep_interval()) {
        (Some(max_idle), Some(interval)) => Some(spawn_idle_reaper(
            registry.clone(),
            max_idle,
            interval,
            cancel.clone(),
        )),
        _ => {
            info!("Idle session reaper disabled");
            None
        }
    };

    let cancel_for_shutdown = cancel.clone();
    tokio::spawn(async move {
        if wait_for_shutdown_signal().await.is_ok() {
            info!("Shutdown signal received");
            cancel_for_shutdown.cancel();
        } else {
            error!("Shutdown signal handler failed; server will continue running");
        }
    });

    let result = serve(listener, front_door, cancel.clone()).await;
    cancel.cancel();
    if let Some(reaper) = reaper {
        let _ = reaper.await;
    }
    let closed = registry.drain().await;
    info!(sessions = closed, "Server stopped");

    result.map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))
}

//! CloudOne hosts agent
//!
//! Runs on the host machine with permission to edit the hosts file and
//! applies the changes requested by a CloudOne server running in a container.

use clap::Parser;
use cloudone_hosts::agent::proto::hosts_agent_server::HostsAgentServer;
use cloudone_hosts::{HostFileConventions, HostsAgentService, HostsManager, AGENT_PORT};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tonic::transport::Server;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cloudone-hostagent")]
#[command(about = "Applies CloudOne hosts file changes on the host machine", long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "CLOUDONE_HOST_AGENT_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = AGENT_PORT, env = "CLOUDONE_HOST_AGENT_PORT")]
    port: u16,

    /// Unix socket to listen on instead of TCP
    #[arg(long, env = "CLOUDONE_HOST_AGENT_SOCKET")]
    socket: Option<PathBuf>,

    /// Custom hosts file path
    #[arg(long, env = "CLOUDONE_HOSTS_PATH")]
    hosts_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "CLOUDONE_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("cloudone={0},cloudone_hosts={0}", args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let conventions = match &args.hosts_path {
        Some(path) => HostFileConventions::current().with_path(path),
        None => HostFileConventions::current(),
    };
    let manager = HostsManager::load(conventions)?;
    let agent = HostsAgentService::new(Arc::new(manager)).into_server();

    if let Some(path) = &args.socket {
        return serve_unix(agent, path).await;
    }

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    info!("Serving CloudOne hosts agent on {}", addr);
    Server::builder()
        .add_service(agent)
        .serve_with_shutdown(addr, cloudone::shutdown_signal())
        .await?;

    Ok(())
}

#[cfg(unix)]
async fn serve_unix(agent: HostsAgentServer<HostsAgentService>, path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = tokio::net::UnixListener::bind(path)?;
    info!("Serving CloudOne hosts agent on {}", path.display());
    Server::builder()
        .add_service(agent)
        .serve_with_incoming_shutdown(
            tokio_stream::wrappers::UnixListenerStream::new(listener),
            cloudone::shutdown_signal(),
        )
        .await?;
    Ok(())
}

#[cfg(not(unix))]
async fn serve_unix(_agent: HostsAgentServer<HostsAgentService>, path: &Path) -> anyhow::Result<()> {
    anyhow::bail!("unix sockets are not supported on this platform: {}", path.display())
}

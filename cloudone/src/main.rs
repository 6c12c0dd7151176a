//! CloudOne - local emulator for cloud provider APIs
//!
//! Serves Google Cloud Secret Manager over gRPC and REST, plus a Cloud
//! Storage stub, on a single port.

use clap::Parser;
use cloudone::{serve, shutdown_signal, Args, Config, ServeError, Services};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(&args)?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CloudOne...");
    info!("  Google Cloud: {}", display_list(&config.gcloud_services));
    info!("  AWS: {}", display_list(&config.aws_services));
    info!("  Azure: {}", display_list(&config.azure_services));
    info!(
        "  Hosts file: {}",
        if config.run_on_host { "in-process" } else { "hosts agent" }
    );

    let services = Services::build(&config).await?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    match serve(services, listener, shutdown_signal()).await {
        Err(ServeError::Shutdown) => {
            info!("CloudOne stopped");
            Ok(())
        }
        result => Ok(result?),
    }
}

fn display_list(list: &str) -> &str {
    if list.trim().is_empty() {
        "none"
    } else {
        list
    }
}

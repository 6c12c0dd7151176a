//! Typed service context built once at startup

use std::path::PathBuf;
use std::sync::Arc;

use cloudone_core::{FileSystem, MemoryFileSystem, OsFileSystem};
use cloudone_hosts::{
    derive_agent_addr, AgentEndpoint, HostFileConventions, HostsError, HostsManager,
    HostsService, RemoteHosts, RetryPolicy,
};
use cloudone_secretmanager::{SecretManager, SecretManagerError};
use cloudone_storage::{StorageEmulator, StorageError};
use thiserror::Error;
use tracing::info;

use crate::config::{Config, ConfigError, FileSystemKind};

/// Host name the CloudOne console is served on
pub const CONSOLE_HOST: &str = "console.cloudone.local";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Hosts(#[from] HostsError),

    #[error(transparent)]
    SecretManager(#[from] SecretManagerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Every service the server dispatches to
pub struct Services {
    pub server_ip: String,
    pub hosts: Arc<dyn HostsService>,
    pub secret_manager: Option<Arc<SecretManager>>,
    pub storage: Option<Arc<StorageEmulator>>,
    pub static_dir: PathBuf,
}

impl Services {
    /// Build the services selected in `config`, using the hosts service the
    /// configuration asks for
    pub async fn build(config: &Config) -> Result<Self, ContextError> {
        let hosts = hosts_service(config).await?;
        Self::build_with_hosts(config, hosts).await
    }

    /// Build the services selected in `config` on top of `hosts`
    pub async fn build_with_hosts(
        config: &Config,
        hosts: Arc<dyn HostsService>,
    ) -> Result<Self, ContextError> {
        let server_ip = config.select_server_ip()?;
        let fs: Arc<dyn FileSystem> = match config.file_system {
            FileSystemKind::Memory => Arc::new(MemoryFileSystem::new()),
            FileSystemKind::Os => Arc::new(OsFileSystem),
        };

        let secret_manager = if config.gcloud_enabled("secretmanager") {
            let data_root = config.data_dir.join("gcloud").join("secretmanager");
            let service = SecretManager::new(data_root, fs, &server_ip, hosts.as_ref()).await?;
            Some(Arc::new(service))
        } else {
            None
        };

        let storage = if config.gcloud_enabled("storage") {
            Some(Arc::new(
                StorageEmulator::new(&server_ip, hosts.as_ref()).await?,
            ))
        } else {
            None
        };

        hosts.add(&server_ip, CONSOLE_HOST).await?;

        info!(
            server_ip = %server_ip,
            secretmanager = secret_manager.is_some(),
            storage = storage.is_some(),
            "Services ready"
        );

        Ok(Self {
            server_ip,
            hosts,
            secret_manager,
            storage,
            static_dir: config.static_dir.clone(),
        })
    }
}

/// The in-process hosts manager when running on the host, otherwise a
/// client of the hosts agent
pub async fn hosts_service(config: &Config) -> Result<Arc<dyn HostsService>, HostsError> {
    if config.run_on_host {
        let manager = HostsManager::load(conventions(config))?;
        info!(path = %manager.path().display(), "Managing hosts file in-process");
        return Ok(Arc::new(manager));
    }

    let endpoint = match &config.host_agent.socket {
        Some(path) => AgentEndpoint::Unix(path.clone()),
        None => AgentEndpoint::Tcp(
            config
                .host_agent
                .addr
                .clone()
                .unwrap_or_else(derive_agent_addr),
        ),
    };
    let remote = RemoteHosts::connect(&endpoint, RetryPolicy::default()).await?;
    Ok(Arc::new(remote))
}

/// Hosts file conventions for this platform, honouring a custom path
pub fn conventions(config: &Config) -> HostFileConventions {
    let conventions = HostFileConventions::current();
    match &config.hosts_path {
        Some(path) if !path.is_empty() => conventions.with_path(path),
        _ => conventions,
    }
}

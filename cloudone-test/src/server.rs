//! In-process test server

use std::path::PathBuf;
use std::time::Duration;

use cloudone::config::FileSystemKind;
use cloudone::{serve, Config, ServeError, Services};
use cloudone_secretmanager::proto::secret_manager_service_client::SecretManagerServiceClient;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::info;

use crate::{CloudOneClient, STARTUP_TIMEOUT_SECS};

#[derive(Debug, thiserror::Error)]
pub enum TestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to start server: {0}")]
    StartFailed(String),

    #[error("server startup timed out")]
    StartupTimeout,

    #[error("gRPC connection failed: {0}")]
    Grpc(#[from] tonic::transport::Error),
}

/// A CloudOne server running inside the test process
///
/// Every server edits its own hosts file and keeps secrets in memory, so
/// tests can run in parallel.
pub struct TestServer {
    port: u16,
    base_url: String,
    dir: TempDir,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<Result<(), ServeError>>>,
}

impl TestServer {
    /// Start a server emulating every supported Google Cloud service
    pub async fn start() -> Result<Self, TestError> {
        Self::start_with("secretmanager,storage").await
    }

    /// Start a server emulating the comma separated `gcloud_services`
    pub async fn start_with(gcloud_services: &str) -> Result<Self, TestError> {
        let dir = tempfile::tempdir()?;
        let hosts_path = dir.path().join("hosts");
        std::fs::write(&hosts_path, "127.0.0.1 localhost\n")?;
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(&static_dir)?;

        let config = Config {
            file_system: FileSystemKind::Memory,
            run_on_host: true,
            hosts_path: Some(hosts_path.to_string_lossy().into_owned()),
            gcloud_services: gcloud_services.to_string(),
            static_dir,
            ..Config::default()
        };
        config
            .validate()
            .map_err(|e| TestError::StartFailed(e.to_string()))?;

        let services = Services::build(&config)
            .await
            .map_err(|e| TestError::StartFailed(e.to_string()))?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let base_url = format!("http://127.0.0.1:{port}");

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve(
            services,
            listener,
            shutdown.clone().cancelled_owned(),
        ));

        info!(port, "Starting CloudOne test server");
        let server = Self {
            port,
            base_url,
            dir,
            shutdown,
            handle: Some(handle),
        };
        server.wait_ready().await?;
        Ok(server)
    }

    async fn wait_ready(&self) -> Result<(), TestError> {
        let client = self.client();
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_secs(STARTUP_TIMEOUT_SECS) {
            if let Ok((status, _)) = client.health().await {
                if status.is_success() {
                    info!(port = self.port, "CloudOne ready");
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Err(TestError::StartupTimeout)
    }

    /// Get the base URL
    pub fn url(&self) -> &str {
        &self.base_url
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Hosts file this server publishes its host names in
    pub fn hosts_path(&self) -> PathBuf {
        self.dir.path().join("hosts")
    }

    pub fn hosts_file(&self) -> Result<String, TestError> {
        Ok(std::fs::read_to_string(self.hosts_path())?)
    }

    /// Directory served on the console host
    pub fn static_dir(&self) -> PathBuf {
        self.dir.path().join("static")
    }

    /// Get a REST client for the emulated services
    pub fn client(&self) -> CloudOneClient {
        CloudOneClient::new(self.base_url.clone())
    }

    /// Get a gRPC Secret Manager client connected to the same port
    pub async fn secret_manager(&self) -> Result<SecretManagerServiceClient<Channel>, TestError> {
        let channel = Channel::from_shared(self.base_url.clone())
            .map_err(|e| TestError::StartFailed(e.to_string()))?
            .connect()
            .await?;
        Ok(SecretManagerServiceClient::new(channel))
    }

    /// Stop the server and return how it ended
    pub async fn stop(mut self) -> Result<(), ServeError> {
        info!("Stopping CloudOne test server");
        self.shutdown.cancel();
        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

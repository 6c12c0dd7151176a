//! Hosts agent gRPC protocol
//!
//! When CloudOne runs inside a container it cannot edit the host machine's
//! hosts file. A small privileged agent runs on the host instead and the
//! server forwards its hosts changes over gRPC.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use crate::service::{HostsError, HostsService};

/// Generated hosts agent protocol
pub mod proto {
    tonic::include_proto!("cloudone.hosts.v1");
}

use proto::hosts_agent_client::HostsAgentClient;
use proto::hosts_agent_server::{HostsAgent, HostsAgentServer};
use proto::{HostsRequest, HostsResponse};

/// Default hosts agent port
pub const AGENT_PORT: u16 = 5989;

/// Address of the hosts agent as seen from this process
///
/// Inside a Docker container the agent runs on the Docker host.
pub fn derive_agent_addr() -> String {
    derive_agent_addr_from(Path::new("/.dockerenv"))
}

fn derive_agent_addr_from(docker_marker: &Path) -> String {
    if docker_marker.exists() {
        format!("host.docker.internal:{AGENT_PORT}")
    } else {
        format!("127.0.0.1:{AGENT_PORT}")
    }
}

/// gRPC server side of the agent, backed by a local hosts service
pub struct HostsAgentService {
    hosts: Arc<dyn HostsService>,
}

impl HostsAgentService {
    pub fn new(hosts: Arc<dyn HostsService>) -> Self {
        Self { hosts }
    }

    pub fn into_server(self) -> HostsAgentServer<Self> {
        HostsAgentServer::new(self)
    }
}

#[tonic::async_trait]
impl HostsAgent for HostsAgentService {
    async fn add(
        &self,
        request: Request<HostsRequest>,
    ) -> Result<Response<HostsResponse>, Status> {
        let req = request.into_inner();
        let applied = match self.hosts.add(&req.ip, &req.hosts).await {
            Ok(()) => {
                info!(ip = %req.ip, hosts = %req.hosts, "Added hosts");
                true
            }
            Err(e) => {
                error!(ip = %req.ip, hosts = %req.hosts, error = %e, "Failed to add hosts");
                false
            }
        };
        Ok(Response::new(HostsResponse { applied }))
    }

    async fn remove(
        &self,
        request: Request<HostsRequest>,
    ) -> Result<Response<HostsResponse>, Status> {
        let req = request.into_inner();
        let applied = match self.hosts.remove(&req.ip, &req.hosts).await {
            Ok(()) => {
                info!(ip = %req.ip, hosts = %req.hosts, "Removed hosts");
                true
            }
            Err(e) => {
                error!(ip = %req.ip, hosts = %req.hosts, error = %e, "Failed to remove hosts");
                false
            }
        };
        Ok(Response::new(HostsResponse { applied }))
    }
}

/// Where the hosts agent listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEndpoint {
    /// `host:port`
    Tcp(String),
    /// Unix domain socket path
    Unix(PathBuf),
}

impl std::fmt::Display for AgentEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "{addr}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// Retry settings for the initial agent connection
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

/// Hosts service that forwards every change to a remote hosts agent
#[derive(Clone)]
pub struct RemoteHosts {
    client: HostsAgentClient<Channel>,
}

impl RemoteHosts {
    /// Connect to the agent, retrying with exponential backoff since the
    /// agent may come up after the server
    pub async fn connect(endpoint: &AgentEndpoint, retry: RetryPolicy) -> Result<Self, HostsError> {
        let mut attempt = 0;
        loop {
            match open_channel(endpoint).await {
                Ok(channel) => {
                    info!(endpoint = %endpoint, "Connected to hosts agent");
                    return Ok(Self {
                        client: HostsAgentClient::new(channel),
                    });
                }
                Err(e) if attempt + 1 < retry.attempts => {
                    let delay = retry.delay(attempt);
                    warn!(
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        error = %e,
                        "Hosts agent not reachable, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn open_channel(endpoint: &AgentEndpoint) -> Result<Channel, HostsError> {
    match endpoint {
        AgentEndpoint::Tcp(addr) => {
            let channel = Endpoint::from_shared(format!("http://{addr}"))?
                .connect()
                .await?;
            Ok(channel)
        }
        #[cfg(unix)]
        AgentEndpoint::Unix(path) => {
            use hyper_util::rt::TokioIo;
            use tonic::transport::Uri;

            let path = path.clone();
            // The URI is ignored by the connector
            let channel = Endpoint::from_static("http://[::]:50051")
                .connect_with_connector(tower::service_fn(move |_: Uri| {
                    let path = path.clone();
                    async move {
                        let stream = tokio::net::UnixStream::connect(path).await?;
                        Ok::<_, std::io::Error>(TokioIo::new(stream))
                    }
                }))
                .await?;
            Ok(channel)
        }
        #[cfg(not(unix))]
        AgentEndpoint::Unix(path) => Err(HostsError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("unix sockets are not supported here: {}", path.display()),
        ))),
    }
}

#[async_trait]
impl HostsService for RemoteHosts {
    async fn add(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
        let request = HostsRequest {
            ip: ip.to_string(),
            hosts: hosts.to_string(),
        };
        match self.client.clone().add(request).await {
            Ok(response) if response.get_ref().applied => Ok(()),
            Ok(_) => Err(HostsError::FailedToAddHosts),
            Err(status) => {
                warn!(code = ?status.code(), message = status.message(), "Hosts agent add call failed");
                Err(HostsError::FailedToAddHosts)
            }
        }
    }

    async fn remove(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
        let request = HostsRequest {
            ip: ip.to_string(),
            hosts: hosts.to_string(),
        };
        match self.client.clone().remove(request).await {
            Ok(response) if response.get_ref().applied => Ok(()),
            Ok(_) => Err(HostsError::FailedToRemoveHosts),
            Err(status) => {
                warn!(code = ?status.code(), message = status.message(), "Hosts agent remove call failed");
                Err(HostsError::FailedToRemoveHosts)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio_stream::wrappers::TcpListenerStream;

    #[derive(Default)]
    struct RecordingHosts {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl HostsService for RecordingHosts {
        async fn add(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
            if ip == "bad" {
                return Err(HostsError::InvalidIp(ip.to_string()));
            }
            self.calls
                .lock()
                .push(("add".into(), ip.to_string(), hosts.to_string()));
            Ok(())
        }

        async fn remove(&self, ip: &str, hosts: &str) -> Result<(), HostsError> {
            self.calls
                .lock()
                .push(("remove".into(), ip.to_string(), hosts.to_string()));
            Ok(())
        }
    }

    async fn start_agent(hosts: Arc<RecordingHosts>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let service = HostsAgentService::new(hosts).into_server();
        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(service)
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await
                .unwrap();
        });
        addr
    }

    #[test]
    fn test_derive_agent_addr() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join(".dockerenv");
        assert_eq!(derive_agent_addr_from(&marker), "127.0.0.1:5989");
        std::fs::write(&marker, "").unwrap();
        assert_eq!(derive_agent_addr_from(&marker), "host.docker.internal:5989");
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let retry = RetryPolicy {
            attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(retry.delay(0), Duration::from_millis(100));
        assert_eq!(retry.delay(1), Duration::from_millis(200));
        assert_eq!(retry.delay(2), Duration::from_millis(400));
        assert_eq!(retry.delay(3), Duration::from_millis(500));
        assert_eq!(retry.delay(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_remote_round_trip() {
        let hosts = Arc::new(RecordingHosts::default());
        let addr = start_agent(hosts.clone()).await;

        let remote = RemoteHosts::connect(&AgentEndpoint::Tcp(addr), RetryPolicy::default())
            .await
            .unwrap();
        remote.add("172.18.0.22", "a.local,b.local").await.unwrap();
        remote.remove("172.18.0.22", "a.local").await.unwrap();

        let calls = hosts.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                ("add".into(), "172.18.0.22".into(), "a.local,b.local".into()),
                ("remove".into(), "172.18.0.22".into(), "a.local".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_not_applied() {
        let hosts = Arc::new(RecordingHosts::default());
        let addr = start_agent(hosts).await;

        let remote = RemoteHosts::connect(&AgentEndpoint::Tcp(addr), RetryPolicy::default())
            .await
            .unwrap();
        let err = remote.add("bad", "a.local").await.unwrap_err();
        assert!(matches!(err, HostsError::FailedToAddHosts));
    }

    #[tokio::test]
    async fn test_connect_gives_up() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let retry = RetryPolicy {
            attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        };
        let result = RemoteHosts::connect(&AgentEndpoint::Tcp(addr), retry).await;
        assert!(matches!(result, Err(HostsError::AgentUnavailable(_))));
    }
}

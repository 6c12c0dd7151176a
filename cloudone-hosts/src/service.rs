//! Hosts service abstraction shared by the local manager and the agent client

use async_trait::async_trait;
use std::net::IpAddr;
use thiserror::Error;

/// Hosts management errors
#[derive(Debug, Error)]
pub enum HostsError {
    #[error("{0:?} is an invalid IP address")]
    InvalidIp(String),

    #[error("No host names provided")]
    NoHosts,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("hosts task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("failed to add hosts")]
    FailedToAddHosts,

    #[error("failed to remove hosts")]
    FailedToRemoveHosts,

    #[error("hosts agent unavailable: {0}")]
    AgentUnavailable(#[from] tonic::transport::Error),
}

/// Binds emulated host names to the IP CloudOne is reachable on
#[async_trait]
pub trait HostsService: Send + Sync {
    /// Bind the comma separated `hosts` to `ip`
    async fn add(&self, ip: &str, hosts: &str) -> Result<(), HostsError>;

    /// Unbind the comma separated `hosts` from `ip`
    async fn remove(&self, ip: &str, hosts: &str) -> Result<(), HostsError>;
}

/// Validate an IP literal
pub fn parse_ip(ip: &str) -> Result<IpAddr, HostsError> {
    ip.trim()
        .parse()
        .map_err(|_| HostsError::InvalidIp(ip.to_string()))
}

/// Split a comma separated host list, trimming items and dropping empty ones
pub fn split_hosts(hosts: &str) -> Vec<String> {
    hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip() {
        assert!(parse_ip("172.18.0.22").is_ok());
        assert!(parse_ip("::1").is_ok());
        assert!(matches!(parse_ip("300.1.1.1"), Err(HostsError::InvalidIp(_))));
        assert!(matches!(parse_ip(""), Err(HostsError::InvalidIp(_))));
    }

    #[test]
    fn test_split_hosts() {
        assert_eq!(
            split_hosts(" a.local, b.local ,,c.local,"),
            vec!["a.local", "b.local", "c.local"]
        );
        assert!(split_hosts(" , ").is_empty());
    }
}

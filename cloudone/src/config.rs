//! Configuration management

use clap::Parser;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Default IP of the server when it runs inside its container network
pub const DEFAULT_CONTAINER_SERVER_IP: &str = "172.18.0.22";

/// Default IP of the server when it runs directly on the host
pub const DEFAULT_HOST_SERVER_IP: &str = "127.0.0.1";

/// Google Cloud services CloudOne can emulate
pub const GCLOUD_SERVICES: [&str; 2] = ["secretmanager", "storage"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("You must select some services to run for at least one cloud provider to emulate")]
    NoServices,

    #[error("unknown Google Cloud service {0:?}")]
    UnknownService(String),

    #[error("invalid IP address {0} provided for the ip the server is running on")]
    InvalidServerIp(String),
}

/// Command line options, each falling back to a `CLOUDONE_*` variable
#[derive(Parser, Debug, Default)]
#[command(name = "cloudone")]
#[command(about = "Local emulator for cloud provider APIs", long_about = None)]
pub struct Args {
    /// Path to a config file
    #[arg(short, long, env = "CLOUDONE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long, env = "CLOUDONE_HOST")]
    pub host: Option<String>,

    /// Port to listen on for both gRPC and HTTP
    #[arg(short, long, env = "CLOUDONE_PORT")]
    pub port: Option<u16>,

    /// File system for services implemented in CloudOne: memory or os
    #[arg(long, env = "CLOUDONE_FILE_SYSTEM")]
    pub file_system: Option<String>,

    /// Directory all emulator data is stored under
    #[arg(long, env = "CLOUDONE_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Edit the hosts file in-process instead of through the hosts agent
    #[arg(long, env = "CLOUDONE_RUN_ON_HOST")]
    pub run_on_host: bool,

    /// IP the emulated host names resolve to
    #[arg(long, env = "CLOUDONE_SERVER_IP")]
    pub server_ip: Option<String>,

    /// Custom hosts file path
    #[arg(long, env = "CLOUDONE_HOSTS_PATH")]
    pub hosts_path: Option<String>,

    /// Comma separated Google Cloud services to emulate
    #[arg(long, env = "CLOUDONE_GCLOUD_SERVICES")]
    pub gcloud_services: Option<String>,

    /// Comma separated AWS services to emulate
    #[arg(long, env = "CLOUDONE_AWS_SERVICES")]
    pub aws_services: Option<String>,

    /// Comma separated Azure services to emulate
    #[arg(long, env = "CLOUDONE_AZURE_SERVICES")]
    pub azure_services: Option<String>,

    /// Directory served on console.cloudone.local
    #[arg(long, env = "CLOUDONE_STATIC_DIR")]
    pub static_dir: Option<String>,

    /// Enable debug logging
    #[arg(long, env = "CLOUDONE_DEBUG")]
    pub debug: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub file_system: FileSystemKind,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub run_on_host: bool,

    #[serde(default = "default_server_ip")]
    pub server_ip: String,

    #[serde(default)]
    pub hosts_path: Option<String>,

    #[serde(default)]
    pub gcloud_services: String,

    #[serde(default)]
    pub aws_services: String,

    #[serde(default)]
    pub azure_services: String,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    #[serde(default)]
    pub host_agent: HostAgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Where to reach the hosts agent when not running on the host
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostAgentConfig {
    /// `host:port`; derived from the environment when unset
    #[serde(default)]
    pub addr: Option<String>,

    /// Unix socket path, preferred over `addr` when set
    #[serde(default)]
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystemKind {
    Memory,
    #[default]
    Os,
}

fn default_port() -> u16 {
    5988
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/lib/data")
}

fn default_server_ip() -> String {
    DEFAULT_CONTAINER_SERVER_IP.to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./client/build")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            file_system: FileSystemKind::default(),
            data_dir: default_data_dir(),
            run_on_host: false,
            server_ip: default_server_ip(),
            hosts_path: None,
            gcloud_services: String::new(),
            aws_services: String::new(),
            azure_services: String::new(),
            debug: false,
            static_dir: default_static_dir(),
            host_agent: HostAgentConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the config file, the environment and the
    /// command line, in increasing order of precedence
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => config::File::from(path.as_path()).required(true),
            None => config::File::with_name("cloudone").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("CLOUDONE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", args.host.clone())?
            .set_override_option("server.port", args.port.map(i64::from))?
            .set_override_option("file_system", args.file_system.clone())?
            .set_override_option("data_dir", args.data_dir.clone())?
            .set_override_option("run_on_host", args.run_on_host.then_some(true))?
            .set_override_option("server_ip", args.server_ip.clone())?
            .set_override_option("hosts_path", args.hosts_path.clone())?
            .set_override_option("gcloud_services", args.gcloud_services.clone())?
            .set_override_option("aws_services", args.aws_services.clone())?
            .set_override_option("azure_services", args.azure_services.clone())?
            .set_override_option("static_dir", args.static_dir.clone())?
            .set_override_option("debug", args.debug.then_some(true))?
            .build()?;

        let config = config.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// At least one provider must have services selected and every Google
    /// Cloud service must be known
    pub fn validate(&self) -> Result<(), ConfigError> {
        let selected = [&self.gcloud_services, &self.aws_services, &self.azure_services];
        if selected.iter().all(|services| split_list(services).next().is_none()) {
            return Err(ConfigError::NoServices);
        }
        for service in split_list(&self.gcloud_services) {
            if !GCLOUD_SERVICES.contains(&service) {
                return Err(ConfigError::UnknownService(service.to_string()));
            }
        }
        Ok(())
    }

    pub fn gcloud_enabled(&self, service: &str) -> bool {
        split_list(&self.gcloud_services).any(|s| s == service)
    }

    /// IP the emulated host names are published with
    ///
    /// A custom IP is validated; otherwise the loopback address is used when
    /// running on the host and the container address elsewhere.
    pub fn select_server_ip(&self) -> Result<String, ConfigError> {
        if self.server_ip != DEFAULT_CONTAINER_SERVER_IP {
            return match self.server_ip.parse::<IpAddr>() {
                Ok(_) => Ok(self.server_ip.clone()),
                Err(_) => Err(ConfigError::InvalidServerIp(self.server_ip.clone())),
            };
        }
        if self.run_on_host {
            return Ok(DEFAULT_HOST_SERVER_IP.to_string());
        }
        Ok(DEFAULT_CONTAINER_SERVER_IP.to_string())
    }

    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "cloudone=debug,tower_http=debug"
        } else {
            "cloudone=info,tower_http=debug"
        }
    }
}

fn split_list(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_services(gcloud: &str) -> Config {
        Config {
            gcloud_services: gcloud.to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5988);
        assert_eq!(config.data_dir, PathBuf::from("/lib/data"));
        assert_eq!(config.file_system, FileSystemKind::Os);
        assert!(config.hosts_path.is_none());
    }

    #[test]
    fn test_requires_some_service() {
        assert!(matches!(
            Config::default().validate(),
            Err(ConfigError::NoServices)
        ));
        assert!(matches!(
            with_services(" , ").validate(),
            Err(ConfigError::NoServices)
        ));

        let aws_only = Config {
            aws_services: "s3".to_string(),
            ..Config::default()
        };
        assert!(aws_only.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_gcloud_service() {
        let err = with_services("secretmanager,bigtable").validate().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownService(name) if name == "bigtable"));
    }

    #[test]
    fn test_gcloud_enabled() {
        let config = with_services("secretmanager, storage");
        assert!(config.gcloud_enabled("storage"));
        assert!(config.gcloud_enabled("secretmanager"));
        assert!(!with_services("storage").gcloud_enabled("secretmanager"));
    }

    #[test]
    fn test_select_server_ip() {
        let mut config = Config::default();
        assert_eq!(config.select_server_ip().unwrap(), "172.18.0.22");

        config.run_on_host = true;
        assert_eq!(config.select_server_ip().unwrap(), "127.0.0.1");

        config.server_ip = "10.0.0.5".to_string();
        assert_eq!(config.select_server_ip().unwrap(), "10.0.0.5");

        config.server_ip = "not-an-ip".to_string();
        assert!(matches!(
            config.select_server_ip(),
            Err(ConfigError::InvalidServerIp(_))
        ));
    }

    #[test]
    fn test_load_from_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudone.toml");
        std::fs::write(
            &path,
            "gcloud_services = \"secretmanager\"\nfile_system = \"memory\"\n\n[server]\nport = 7000\n",
        )
        .unwrap();

        let args = Args {
            config: Some(path),
            port: Some(7100),
            run_on_host: true,
            ..Args::default()
        };
        let config = Config::load(&args).unwrap();
        assert_eq!(config.server.port, 7100);
        assert_eq!(config.file_system, FileSystemKind::Memory);
        assert!(config.run_on_host);
        assert!(config.gcloud_enabled("secretmanager"));
    }
}

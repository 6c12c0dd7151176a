//! Hosts file management for CloudOne
//!
//! Emulated endpoints such as `secretmanager.googleapis.local` are made
//! resolvable by binding them to the server IP in the OS hosts file. Either
//! the [`HostsManager`] edits the file directly or, when the server runs in
//! a container, [`RemoteHosts`] forwards the edits to a hosts agent running
//! on the host machine.

pub mod agent;
pub mod conventions;
pub mod document;
pub mod entry;
pub mod manager;
pub mod service;

pub use agent::{
    derive_agent_addr, AgentEndpoint, HostsAgentService, RemoteHosts, RetryPolicy, AGENT_PORT,
};
pub use conventions::HostFileConventions;
pub use document::HostsDocument;
pub use entry::HostEntry;
pub use manager::HostsManager;
pub use service::{HostsError, HostsService};

//! CloudOne server
//!
//! Wires the emulated services into a single process serving gRPC and
//! HTTP/1 on one port.

pub mod config;
pub mod context;
pub mod mux;
pub mod router;
pub mod server;

pub use config::{Args, Config, ConfigError};
pub use context::{Services, CONSOLE_HOST};
pub use router::create_router;
pub use server::{serve, shutdown_signal, ServeError, TaskGroup};

//! Test utilities for CloudOne
//!
//! Provides utilities for end-to-end testing against a CloudOne server
//! running in the test process:
//! - Start a server on a random port with a private hosts file
//! - Wait for the server to be ready
//! - REST and gRPC clients for the emulated services
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cloudone_test::TestServer;
//!
//! #[tokio::test]
//! async fn test_health() {
//!     let server = TestServer::start().await.unwrap();
//!     let (status, _) = server.client().health().await.unwrap();
//!     assert!(status.is_success());
//! }
//! ```

pub mod client;
pub mod server;

pub use client::{ClientError, CloudOneClient};
pub use server::{TestError, TestServer};

/// Timeout for waiting on the server
pub const STARTUP_TIMEOUT_SECS: u64 = 10;

//! Core types and traits for CloudOne
//!
//! This crate provides common types used across all CloudOne services.

pub mod error;
pub mod fs;
pub mod locks;

pub use error::{ApiError, ErrorCode};
pub use fs::{DirEntry, FileSystem, MemoryFileSystem, OsFileSystem};
pub use locks::{KeyedGuard, KeyedLocks};

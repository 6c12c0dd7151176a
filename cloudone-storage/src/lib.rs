//! Google Cloud Storage emulator for CloudOne
//!
//! Only the resource surface is declared; every operation is reported as
//! unsupported, over REST as `501 Not Implemented`.

pub mod emulator;
pub mod handlers;
pub mod resource;

pub use emulator::{StorageEmulator, StorageError, STORAGE_HOST};
pub use handlers::router;
pub use resource::StorageResource;

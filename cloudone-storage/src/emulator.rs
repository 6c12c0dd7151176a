//! Storage emulator entry point

use cloudone_hosts::{HostsError, HostsService};
use thiserror::Error;
use tracing::info;

use crate::resource::StorageResource;

/// Host name the emulated Cloud Storage API answers on
pub const STORAGE_HOST: &str = "storage.googleapis.local";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{resource}.{operation} is not supported by the storage emulator")]
    Unsupported {
        resource: StorageResource,
        operation: String,
    },

    #[error("unknown operation {operation} on {resource}")]
    UnknownOperation {
        resource: StorageResource,
        operation: String,
    },

    #[error("failed to publish storage.googleapis.local: {0}")]
    Hosts(#[from] HostsError),
}

/// Cloud Storage emulator
///
/// Declares the resource surface of the JSON API. No operation has a
/// backend yet, so every call reports [`StorageError::Unsupported`].
#[derive(Debug)]
pub struct StorageEmulator {
    _private: (),
}

impl StorageEmulator {
    /// Publish the storage host name and return the emulator
    pub async fn new(ip: &str, hosts: &dyn HostsService) -> Result<Self, StorageError> {
        hosts.add(ip, STORAGE_HOST).await?;
        info!(host = STORAGE_HOST, "Storage emulator registered");
        Ok(Self { _private: () })
    }

    pub fn resources(&self) -> &'static [StorageResource] {
        &StorageResource::ALL
    }

    /// Run `operation` on `resource`
    pub fn invoke(&self, resource: StorageResource, operation: &str) -> Result<(), StorageError> {
        if !resource.operations().contains(&operation) {
            return Err(StorageError::UnknownOperation {
                resource,
                operation: operation.to_string(),
            });
        }
        Err(StorageError::Unsupported {
            resource,
            operation: operation.to_string(),
        })
    }
}

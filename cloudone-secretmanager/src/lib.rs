//! Google Cloud Secret Manager emulation for CloudOne
//!
//! Secrets and their versions are persisted through the pluggable
//! [`cloudone_core::FileSystem`]. The same [`SecretManager`] instance serves
//! gRPC clients directly and REST clients through [`handlers::router`].

pub mod handlers;
pub mod names;
pub mod service;
pub mod storage;
pub mod wire;

/// Generated Secret Manager and IAM protobuf types
pub mod proto {
    pub mod google {
        pub mod iam {
            pub mod v1 {
                tonic::include_proto!("google.iam.v1");
            }
        }

        pub mod cloud {
            pub mod secretmanager {
                pub mod v1 {
                    tonic::include_proto!("google.cloud.secretmanager.v1");
                }
            }
        }
    }

    pub use google::cloud::secretmanager::v1::*;
    pub use google::iam::v1 as iam;
}

pub use handlers::router;
pub use names::{ProjectName, SecretName};
pub use service::{SecretManager, SecretManagerError, SECRET_MANAGER_HOST};
pub use storage::{SecretStore, StoreError};

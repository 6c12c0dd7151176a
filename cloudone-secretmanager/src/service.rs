//! Secret Manager gRPC service

use cloudone_core::FileSystem;
use cloudone_hosts::{HostsError, HostsService};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tonic::{Request, Response, Status};
use tracing::{error, info};

use crate::names::{ProjectName, SecretName};
use crate::proto::iam::{
    GetIamPolicyRequest, Policy, SetIamPolicyRequest, TestIamPermissionsRequest,
    TestIamPermissionsResponse,
};
use crate::proto::secret_manager_service_server::{
    SecretManagerService, SecretManagerServiceServer,
};
use crate::proto::{
    AccessSecretVersionRequest, AccessSecretVersionResponse, AddSecretVersionRequest,
    CreateSecretRequest, DeleteSecretRequest, DestroySecretVersionRequest,
    DisableSecretVersionRequest, EnableSecretVersionRequest, GetSecretRequest,
    GetSecretVersionRequest, ListSecretVersionsRequest, ListSecretVersionsResponse,
    ListSecretsRequest, ListSecretsResponse, Secret, SecretVersion, UpdateSecretRequest,
};
use crate::storage::{SecretStore, StoreError};

/// Host name the emulated Secret Manager API answers on
pub const SECRET_MANAGER_HOST: &str = "secretmanager.googleapis.local";

#[derive(Debug, Error)]
pub enum SecretManagerError {
    #[error("failed to prepare secret store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to publish the Secret Manager host name: {0}")]
    Hosts(#[from] HostsError),
}

impl From<StoreError> for Status {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidArgument(message) => Status::invalid_argument(message),
            StoreError::NotFound(name) => Status::not_found(format!("{name} not found")),
            StoreError::Io(e) => Status::internal(e.to_string()),
            StoreError::Serialization(message) => Status::internal(message),
        }
    }
}

/// Shared answer for every method CloudOne does not emulate
pub fn unimplemented<T>(method: &str) -> Result<Response<T>, Status> {
    Err(Status::unimplemented(format!("method {method} not implemented")))
}

/// Secret Manager backed by the file system secret store
pub struct SecretManager {
    store: SecretStore,
}

impl SecretManager {
    /// Prepare the data root and publish the Secret Manager host name
    pub async fn new(
        data_root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
        ip: &str,
        hosts: &dyn HostsService,
    ) -> Result<Self, SecretManagerError> {
        let store = SecretStore::open(data_root, fs).await?;
        hosts.add(ip, SECRET_MANAGER_HOST).await?;
        info!(root = %store.root().display(), host = SECRET_MANAGER_HOST, "Secret Manager ready");
        Ok(Self { store })
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    pub fn into_server(self: Arc<Self>) -> SecretManagerServiceServer<Self> {
        SecretManagerServiceServer::from_arc(self)
    }
}

fn log_failure(method: &str, err: StoreError) -> Status {
    match &err {
        StoreError::Io(_) | StoreError::Serialization(_) => {
            error!(method, error = %err, "Secret Manager call failed")
        }
        _ => info!(method, error = %err, "Secret Manager call rejected"),
    }
    err.into()
}

#[tonic::async_trait]
impl SecretManagerService for SecretManager {
    async fn list_secrets(
        &self,
        request: Request<ListSecretsRequest>,
    ) -> Result<Response<ListSecretsResponse>, Status> {
        let req = request.into_inner();
        let parent = ProjectName::parse(&req.parent)?;
        let secrets = self
            .store
            .list_secrets(&parent)
            .await
            .map_err(|e| log_failure("ListSecrets", e))?;
        Ok(Response::new(ListSecretsResponse {
            secrets,
            ..Default::default()
        }))
    }

    async fn create_secret(
        &self,
        request: Request<CreateSecretRequest>,
    ) -> Result<Response<Secret>, Status> {
        let req = request.into_inner();
        let parent = ProjectName::parse(&req.parent)?;
        let secret = self
            .store
            .create_secret(&parent, &req.secret_id, req.secret.unwrap_or_default())
            .await
            .map_err(|e| log_failure("CreateSecret", e))?;
        Ok(Response::new(secret))
    }

    async fn add_secret_version(
        &self,
        request: Request<AddSecretVersionRequest>,
    ) -> Result<Response<SecretVersion>, Status> {
        let req = request.into_inner();
        let name = SecretName::parse(&req.parent)?;
        let payload = req
            .payload
            .ok_or_else(|| Status::invalid_argument("payload is required"))?;
        let version = self
            .store
            .add_secret_version(&name, payload)
            .await
            .map_err(|e| log_failure("AddSecretVersion", e))?;
        Ok(Response::new(version))
    }

    async fn get_secret(
        &self,
        request: Request<GetSecretRequest>,
    ) -> Result<Response<Secret>, Status> {
        let name = SecretName::parse(&request.get_ref().name)?;
        let secret = self
            .store
            .get_secret(&name)
            .await
            .map_err(|e| log_failure("GetSecret", e))?;
        Ok(Response::new(secret))
    }

    async fn update_secret(
        &self,
        request: Request<UpdateSecretRequest>,
    ) -> Result<Response<Secret>, Status> {
        let req = request.into_inner();
        let secret = req
            .secret
            .ok_or_else(|| Status::invalid_argument("secret is required"))?;
        let name = SecretName::parse(&secret.name)?;
        let paths = req.update_mask.map(|mask| mask.paths).unwrap_or_default();
        let secret = self
            .store
            .update_secret(&name, secret.labels, &paths)
            .await
            .map_err(|e| log_failure("UpdateSecret", e))?;
        Ok(Response::new(secret))
    }

    async fn delete_secret(
        &self,
        _request: Request<DeleteSecretRequest>,
    ) -> Result<Response<()>, Status> {
        unimplemented("DeleteSecret")
    }

    async fn list_secret_versions(
        &self,
        _request: Request<ListSecretVersionsRequest>,
    ) -> Result<Response<ListSecretVersionsResponse>, Status> {
        unimplemented("ListSecretVersions")
    }

    async fn get_secret_version(
        &self,
        _request: Request<GetSecretVersionRequest>,
    ) -> Result<Response<SecretVersion>, Status> {
        unimplemented("GetSecretVersion")
    }

    async fn access_secret_version(
        &self,
        _request: Request<AccessSecretVersionRequest>,
    ) -> Result<Response<AccessSecretVersionResponse>, Status> {
        unimplemented("AccessSecretVersion")
    }

    async fn disable_secret_version(
        &self,
        _request: Request<DisableSecretVersionRequest>,
    ) -> Result<Response<SecretVersion>, Status> {
        unimplemented("DisableSecretVersion")
    }

    async fn enable_secret_version(
        &self,
        _request: Request<EnableSecretVersionRequest>,
    ) -> Result<Response<SecretVersion>, Status> {
        unimplemented("EnableSecretVersion")
    }

    async fn destroy_secret_version(
        &self,
        _request: Request<DestroySecretVersionRequest>,
    ) -> Result<Response<SecretVersion>, Status> {
        unimplemented("DestroySecretVersion")
    }

    async fn set_iam_policy(
        &self,
        _request: Request<SetIamPolicyRequest>,
    ) -> Result<Response<Policy>, Status> {
        unimplemented("SetIamPolicy")
    }

    async fn get_iam_policy(
        &self,
        _request: Request<GetIamPolicyRequest>,
    ) -> Result<Response<Policy>, Status> {
        unimplemented("GetIamPolicy")
    }

    async fn test_iam_permissions(
        &self,
        _request: Request<TestIamPermissionsRequest>,
    ) -> Result<Response<TestIamPermissionsResponse>, Status> {
        unimplemented("TestIamPermissions")
    }
}

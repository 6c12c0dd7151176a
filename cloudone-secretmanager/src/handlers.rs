//! REST handlers for the Secret Manager JSON API
//!
//! Each handler decodes the wire JSON body, fills in the resource name from
//! the URL and calls the same gRPC service implementation that serves
//! native gRPC clients.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use cloudone_core::ApiError;
use prost_types::FieldMask;
use serde::{de::DeserializeOwned, Deserialize};
use std::sync::Arc;
use tonic::Request;
use tracing::{info, warn};

use crate::proto::secret_manager_service_server::SecretManagerService;
use crate::proto::{
    AddSecretVersionRequest, CreateSecretRequest, GetSecretRequest, ListSecretsRequest, Secret,
    SecretPayload, UpdateSecretRequest,
};
use crate::service::SecretManager;
use crate::wire::{
    decode_body, AddSecretVersionJson, ListSecretsResponseJson, SecretJson, SecretVersionJson,
    WireError,
};

const ADD_VERSION_SUFFIX: &str = ":addVersion";

/// Build the router for `secretmanager.googleapis.local`
pub fn router(service: Arc<SecretManager>) -> Router {
    Router::new()
        .route(
            "/v1/projects/{project}/secrets",
            get(list_secrets)
                .post(create_secret)
                .fallback(not_implemented),
        )
        .route(
            "/v1/projects/{project}/secrets/{secret}",
            get(get_secret)
                .post(secret_action)
                .patch(update_secret)
                .fallback(not_implemented),
        )
        .fallback(not_implemented)
        .with_state(service)
}

/// Shared response for every route this emulator does not serve
pub async fn not_implemented() -> ApiError {
    ApiError::not_implemented()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateQuery {
    secret_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateQuery {
    update_mask: Option<String>,
}

/// `Path` extractor answering bad parameters with an API error body
struct ApiPath<T>(T);

impl<S, T> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::invalid_request(rejection.body_text())),
        }
    }
}

/// `Query` extractor answering bad parameters with an API error body
struct ApiQuery<T>(T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError::invalid_request(rejection.body_text())),
        }
    }
}

fn project_name(project: &str) -> String {
    format!("projects/{project}")
}

fn secret_name(project: &str, secret: &str) -> String {
    format!("projects/{project}/secrets/{secret}")
}

fn encoding_failed(err: WireError) -> ApiError {
    warn!(error = %err, "Failed to encode Secret Manager response");
    ApiError::unexpected()
}

fn secret_response(status: StatusCode, secret: &Secret) -> Result<Response, ApiError> {
    let json = SecretJson::try_from(secret).map_err(encoding_failed)?;
    Ok((status, Json(json)).into_response())
}

async fn list_secrets(
    State(service): State<Arc<SecretManager>>,
    ApiPath(project): ApiPath<String>,
) -> Result<Response, ApiError> {
    let request = ListSecretsRequest {
        parent: project_name(&project),
        ..Default::default()
    };
    let response = service.list_secrets(Request::new(request)).await?.into_inner();
    let json = ListSecretsResponseJson::try_from(&response).map_err(encoding_failed)?;
    Ok((StatusCode::OK, Json(json)).into_response())
}

async fn create_secret(
    State(service): State<Arc<SecretManager>>,
    ApiPath(project): ApiPath<String>,
    ApiQuery(query): ApiQuery<CreateQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let secret_id = query
        .secret_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::invalid_request("secretId query parameter is required"))?;

    let json: SecretJson = decode_body(&body).map_err(ApiError::invalid_request)?;
    let secret = Secret::try_from(json).map_err(ApiError::invalid_request)?;

    info!(project = %project, secret_id = %secret_id, "CreateSecret");
    let request = CreateSecretRequest {
        parent: project_name(&project),
        secret_id,
        secret: Some(secret),
    };
    let secret = service.create_secret(Request::new(request)).await?.into_inner();
    secret_response(StatusCode::CREATED, &secret)
}

async fn get_secret(
    State(service): State<Arc<SecretManager>>,
    ApiPath((project, secret)): ApiPath<(String, String)>,
) -> Result<Response, ApiError> {
    // Custom verbs such as `:getIamPolicy` are not served
    if secret.contains(':') {
        return Err(ApiError::not_implemented());
    }
    let request = GetSecretRequest {
        name: secret_name(&project, &secret),
    };
    let secret = service.get_secret(Request::new(request)).await?.into_inner();
    secret_response(StatusCode::OK, &secret)
}

/// `POST .../secrets/{secret}:{verb}`; only `addVersion` is served
async fn secret_action(
    State(service): State<Arc<SecretManager>>,
    ApiPath((project, secret)): ApiPath<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(secret) = secret.strip_suffix(ADD_VERSION_SUFFIX) else {
        return Err(ApiError::not_implemented());
    };

    let json: AddSecretVersionJson = decode_body(&body).map_err(ApiError::invalid_request)?;
    let payload = json
        .payload
        .map(SecretPayload::try_from)
        .transpose()
        .map_err(ApiError::invalid_request)?;

    info!(project = %project, secret = %secret, "AddSecretVersion");
    // The URL wins over any parent in the body
    let request = AddSecretVersionRequest {
        parent: secret_name(&project, secret),
        payload,
    };
    let version = service
        .add_secret_version(Request::new(request))
        .await?
        .into_inner();
    let json = SecretVersionJson::try_from(&version).map_err(encoding_failed)?;
    Ok((StatusCode::CREATED, Json(json)).into_response())
}

async fn update_secret(
    State(service): State<Arc<SecretManager>>,
    ApiPath((project, secret)): ApiPath<(String, String)>,
    ApiQuery(query): ApiQuery<UpdateQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(mask) = query.update_mask else {
        return Err(ApiError::not_implemented());
    };

    let json: SecretJson = decode_body(&body).map_err(ApiError::invalid_request)?;
    let mut update = Secret::try_from(json).map_err(ApiError::invalid_request)?;
    update.name = secret_name(&project, &secret);

    info!(project = %project, secret = %secret, update_mask = %mask, "UpdateSecret");
    let request = UpdateSecretRequest {
        secret: Some(update),
        update_mask: Some(FieldMask {
            paths: mask.split(',').map(|p| p.trim().to_string()).collect(),
        }),
    };
    let secret = service.update_secret(Request::new(request)).await?.into_inner();
    secret_response(StatusCode::OK, &secret)
}

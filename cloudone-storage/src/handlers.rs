//! REST surface for storage.googleapis.local

use std::sync::Arc;

use axum::{
    extract::State,
    http::{Method, Uri},
    response::{IntoResponse, Response},
    Router,
};
use cloudone_core::{ApiError, ErrorCode};
use tracing::debug;

use crate::emulator::{StorageEmulator, StorageError};
use crate::resource::StorageResource;

pub fn router(emulator: Arc<StorageEmulator>) -> Router {
    Router::new().fallback(unsupported).with_state(emulator)
}

async fn unsupported(
    State(emulator): State<Arc<StorageEmulator>>,
    method: Method,
    uri: Uri,
) -> Response {
    let Some(resource) = StorageResource::classify(uri.path()) else {
        return ApiError::new(ErrorCode::NotFound, "Unknown storage resource")
            .with_field("path", uri.path())
            .into_response();
    };

    let operation = operation_for(resource, &method, uri.path());
    debug!(%method, path = uri.path(), %resource, operation, "Storage request");

    match emulator.invoke(resource, operation) {
        Err(StorageError::Unsupported { resource, .. } | StorageError::UnknownOperation { resource, .. }) => {
            ApiError::not_implemented()
                .with_field("resource", resource.as_str())
                .into_response()
        }
        Err(StorageError::Hosts(_)) | Ok(()) => ApiError::unexpected().into_response(),
    }
}

/// Best-effort mapping of an HTTP method onto a resource method name
fn operation_for(resource: StorageResource, method: &Method, path: &str) -> &'static str {
    let last = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or_default();
    match (resource, last) {
        (StorageResource::Channels, _) => return "stop",
        (StorageResource::Buckets, "iam") if method == Method::GET => return "getIamPolicy",
        (StorageResource::Buckets, "iam") => return "setIamPolicy",
        (StorageResource::Buckets, "testPermissions") => return "testIamPermissions",
        (StorageResource::Buckets, "lockRetentionPolicy") => return "lockRetentionPolicy",
        (StorageResource::Objects, "compose") => return "compose",
        (StorageResource::Objects, "watch") => return "watchAll",
        _ => {}
    }
    if path.contains("/rewriteTo/") {
        return "rewrite";
    }
    if path.contains("/copyTo/") {
        return "copy";
    }

    let collection = matches!(
        last,
        "b" | "o" | "acl" | "defaultObjectAcl" | "notificationConfigs" | "hmacKeys"
    );
    match *method {
        Method::GET if collection => "list",
        Method::GET => "get",
        Method::POST if resource == StorageResource::ProjectsHmacKeys => "create",
        Method::POST => "insert",
        Method::PATCH => "patch",
        Method::PUT => "update",
        Method::DELETE => "delete",
        _ => "unknown",
    }
}

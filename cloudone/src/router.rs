//! Host-qualified HTTP router for CloudOne services

use axum::{
    extract::{Request, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use cloudone_core::{ApiError, ErrorCode};
use cloudone_secretmanager::SECRET_MANAGER_HOST;
use cloudone_storage::STORAGE_HOST;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::debug;

use crate::context::{Services, CONSOLE_HOST};

/// Routers keyed by the host name they answer on
struct AppState {
    hosts: HashMap<&'static str, Router>,
    services: Vec<&'static str>,
}

/// Create the main application router
pub fn create_router(services: &Services) -> Router {
    let mut hosts = HashMap::new();
    let mut enabled = Vec::new();

    if let Some(secret_manager) = &services.secret_manager {
        hosts.insert(
            SECRET_MANAGER_HOST,
            cloudone_secretmanager::router(secret_manager.clone()),
        );
        enabled.push("secretmanager");
    }
    if let Some(storage) = &services.storage {
        hosts.insert(STORAGE_HOST, cloudone_storage::router(storage.clone()));
        enabled.push("storage");
    }
    hosts.insert(
        CONSOLE_HOST,
        Router::new().fallback_service(ServeDir::new(&services.static_dir)),
    );

    let state = Arc::new(AppState {
        hosts,
        services: enabled,
    });

    Router::new()
        .route("/health", get(health_check))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "running", "services": state.services }))
}

async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let host = request_host(&request);
    let Some(router) = state.hosts.get(host.as_str()) else {
        debug!(host = %host, uri = %request.uri(), "Request for unknown host");
        return ApiError::new(ErrorCode::NotFound, "No such host")
            .with_field("host", host)
            .into_response();
    };

    match router.clone().oneshot(request).await {
        Ok(response) => response,
        Err(never) => match never {},
    }
}

/// Host name of a request without its port, lowercased
fn request_host(request: &Request) -> String {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();
    strip_port(host).to_ascii_lowercase()
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_inclusive(']').next().unwrap_or(host);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{body::Body, http::StatusCode};
    use cloudone_core::MemoryFileSystem;
    use cloudone_hosts::{HostsError, HostsService};
    use cloudone_secretmanager::SecretManager;
    use cloudone_storage::StorageEmulator;
    use http_body_util::BodyExt;
    use serde_json::Value;

    struct NoopHosts;

    #[async_trait]
    impl HostsService for NoopHosts {
        async fn add(&self, _ip: &str, _hosts: &str) -> Result<(), HostsError> {
            Ok(())
        }

        async fn remove(&self, _ip: &str, _hosts: &str) -> Result<(), HostsError> {
            Ok(())
        }
    }

    async fn services(static_dir: &std::path::Path) -> Services {
        let hosts = Arc::new(NoopHosts);
        let secret_manager = SecretManager::new(
            "/data/gcloud/secretmanager",
            Arc::new(MemoryFileSystem::new()),
            "127.0.0.1",
            hosts.as_ref(),
        )
        .await
        .unwrap();
        let storage = StorageEmulator::new("127.0.0.1", hosts.as_ref()).await.unwrap();
        Services {
            server_ip: "127.0.0.1".to_string(),
            hosts,
            secret_manager: Some(Arc::new(secret_manager)),
            storage: Some(Arc::new(storage)),
            static_dir: static_dir.to_path_buf(),
        }
    }

    async fn send(
        app: Router,
        host: &str,
        method: &str,
        uri: &str,
        body: &str,
    ) -> (StatusCode, Vec<u8>) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, host)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_on_any_host() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(&services(dir.path()).await);
        let (status, body) = send(app, "whatever.local", "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["services"], json!(["secretmanager", "storage"]));
    }

    #[tokio::test]
    async fn test_dispatch_by_host() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(&services(dir.path()).await);

        let (status, _) = send(
            app.clone(),
            "secretmanager.googleapis.local:5988",
            "POST",
            "/v1/projects/demo/secrets?secretId=apikey",
            "{}",
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(
            app.clone(),
            "secretmanager.googleapis.local",
            "GET",
            "/v1/projects/demo/secrets",
            "",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["secrets"][0]["name"], "projects/demo/secrets/apikey");

        let (status, body) = send(app, "storage.googleapis.local", "GET", "/storage/v1/b", "").await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["resource"], "buckets");
    }

    #[tokio::test]
    async fn test_unknown_host_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(&services(dir.path()).await);
        let (status, body) = send(app, "pubsub.googleapis.local", "GET", "/v1/topics", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["host"], "pubsub.googleapis.local");
    }

    #[tokio::test]
    async fn test_console_serves_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>CloudOne</h1>").unwrap();
        let app = create_router(&services(dir.path()).await);
        let (status, body) = send(app, "console.cloudone.local", "GET", "/index.html", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>CloudOne</h1>");
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("storage.googleapis.local:5988"), "storage.googleapis.local");
        assert_eq!(strip_port("storage.googleapis.local"), "storage.googleapis.local");
        assert_eq!(strip_port("[::1]:5988"), "[::1]");
    }
}

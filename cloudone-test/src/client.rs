//! REST client for CloudOne services

use reqwest::{header, Client, Method, StatusCode};
use serde_json::Value;

/// Host names the REST surfaces answer on
pub const SECRET_MANAGER_HOST: &str = "secretmanager.googleapis.local";
pub const STORAGE_HOST: &str = "storage.googleapis.local";
pub const CONSOLE_HOST: &str = "console.cloudone.local";

/// Client for the host-qualified REST surfaces of a CloudOne server
///
/// Requests go to the server's address and carry the emulated host name in
/// the `Host` header, so no hosts file entries are needed.
pub struct CloudOneClient {
    base_url: String,
    client: Client,
}

impl CloudOneClient {
    /// Create a new client
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { base_url, client }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<(StatusCode, Value), ClientError> {
        self.request(Method::GET, "localhost", "/health", None).await
    }

    /// Send a request to `path` on the emulated `host`
    pub async fn request(
        &self,
        method: Method,
        host: &str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, Value), ClientError> {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::HOST, host);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                ClientError::ParseError(format!("{e}: {}", String::from_utf8_lossy(&bytes)))
            })?
        };
        Ok((status, json))
    }

    /// GET `path` on `host` and return the raw body
    pub async fn get_text(&self, host: &str, path: &str) -> Result<(StatusCode, String), ClientError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(header::HOST, host)
            .send()
            .await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    // === Secret Manager Operations ===

    pub async fn create_secret(
        &self,
        project: &str,
        secret_id: &str,
        secret: &Value,
    ) -> Result<(StatusCode, Value), ClientError> {
        let path = format!("/v1/projects/{project}/secrets?secretId={secret_id}");
        self.request(Method::POST, SECRET_MANAGER_HOST, &path, Some(secret))
            .await
    }

    pub async fn get_secret(
        &self,
        project: &str,
        secret_id: &str,
    ) -> Result<(StatusCode, Value), ClientError> {
        let path = format!("/v1/projects/{project}/secrets/{secret_id}");
        self.request(Method::GET, SECRET_MANAGER_HOST, &path, None).await
    }

    pub async fn list_secrets(&self, project: &str) -> Result<(StatusCode, Value), ClientError> {
        let path = format!("/v1/projects/{project}/secrets");
        self.request(Method::GET, SECRET_MANAGER_HOST, &path, None).await
    }

    /// Add a version holding `data`, already base64 encoded
    pub async fn add_secret_version(
        &self,
        project: &str,
        secret_id: &str,
        data: &str,
    ) -> Result<(StatusCode, Value), ClientError> {
        let path = format!("/v1/projects/{project}/secrets/{secret_id}:addVersion");
        let body = serde_json::json!({ "payload": { "data": data } });
        self.request(Method::POST, SECRET_MANAGER_HOST, &path, Some(&body))
            .await
    }

    pub async fn update_secret(
        &self,
        project: &str,
        secret_id: &str,
        update_mask: &str,
        secret: &Value,
    ) -> Result<(StatusCode, Value), ClientError> {
        let path = format!("/v1/projects/{project}/secrets/{secret_id}?updateMask={update_mask}");
        self.request(Method::PATCH, SECRET_MANAGER_HOST, &path, Some(secret))
            .await
    }

    // === Storage Operations ===

    pub async fn list_buckets(&self, project: &str) -> Result<(StatusCode, Value), ClientError> {
        let path = format!("/storage/v1/b?project={project}");
        self.request(Method::GET, STORAGE_HOST, &path, None).await
    }
}

/// Errors from the REST client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

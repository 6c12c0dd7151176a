//! Server-level end-to-end tests: host routing, hosts file publishing and
//! supervised shutdown

use cloudone::ServeError;
use cloudone_test::client::{CONSOLE_HOST, STORAGE_HOST};
use cloudone_test::TestServer;
use reqwest::{Method, StatusCode};

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await.unwrap();
    let (status, body) = server.client().health().await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
}

#[tokio::test]
async fn test_host_names_are_published() {
    let server = TestServer::start().await.unwrap();
    let hosts = server.hosts_file().unwrap();
    let lines: Vec<&str> = hosts.lines().collect();

    assert_eq!(lines[0], "127.0.0.1 localhost");
    assert_eq!(lines[1], "# Added by CloudOne");
    assert_eq!(
        lines[2],
        "127.0.0.1 console.cloudone.local secretmanager.googleapis.local storage.googleapis.local"
    );
    assert_eq!(lines[3], "# End of CloudOne section");
    assert_eq!(lines.len(), 4);
}

#[tokio::test]
async fn test_only_selected_services_are_served() {
    let server = TestServer::start_with("storage").await.unwrap();
    let hosts = server.hosts_file().unwrap();
    assert!(!hosts.contains("secretmanager.googleapis.local"));

    let (status, body) = server
        .client()
        .request(
            Method::GET,
            "secretmanager.googleapis.local",
            "/v1/projects/demo/secrets",
            None,
        )
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["host"], "secretmanager.googleapis.local");
}

#[tokio::test]
async fn test_storage_is_not_implemented() {
    let server = TestServer::start().await.unwrap();
    let (status, body) = server.client().list_buckets("demo").await.unwrap();
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["resource"], "buckets");

    let (status, body) = server
        .client()
        .request(Method::POST, STORAGE_HOST, "/upload/storage/v1/b/assets/o", None)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["resource"], "objects");
}

#[tokio::test]
async fn test_console_static_files() {
    let server = TestServer::start().await.unwrap();
    std::fs::write(server.static_dir().join("index.html"), "<title>CloudOne</title>").unwrap();

    let (status, body) = server
        .client()
        .get_text(CONSOLE_HOST, "/index.html")
        .await
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<title>CloudOne</title>");
}

#[tokio::test]
async fn test_stop_reports_shutdown() {
    let server = TestServer::start().await.unwrap();
    let result = server.stop().await;
    assert!(matches!(result, Err(ServeError::Shutdown)));
}

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use helix_api::config::{ServerConfig, StoreBackend};
use helix_api::router::build_app_router;
use helix_api::state::AppState;
use helix_db::{JobStore, MemoryJobStore};
use helix_nims::backoff::RetryBackoff;
use helix_nims::config::ProviderConfig;
use helix_nims::manager::JobManager;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::MockServer;

pub const OWNER: &str = "owner-a";
pub const OTHER_OWNER: &str = "owner-b";

pub const DESIGN_ENDPOINT: &str = "/biology/ipd/rfdiffusion/generate";

/// The application router wired to a fake provider and an in-memory store.
pub struct TestApp {
    pub app: Router,
    pub server: MockServer,
    pub store: Arc<MemoryJobStore>,
    pub manager: Arc<JobManager>,
    pub results: TempDir,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        job_store: StoreBackend::Memory,
        database_url: None,
    }
}

fn provider_config(server: &MockServer, results: &TempDir) -> ProviderConfig {
    let uri = server.uri();
    ProviderConfig {
        api_key: Some("nvapi-test".to_string()),
        base_url: uri.clone(),
        status_url: format!("{uri}/status"),
        poll_interval: Duration::from_millis(10),
        max_transient_failures: 5,
        max_poll_duration: Duration::from_secs(30),
        request_timeout: Duration::from_secs(5),
        submit_attempts: 1,
        ca_bundle: None,
        insecure_tls: false,
        rcsb_base_url: format!("{uri}/rcsb"),
        uniprot_base_url: format!("{uri}/uniprot"),
        result_dir: results.path().to_path_buf(),
        backoff: RetryBackoff {
            base: Duration::from_millis(10),
            cap: Duration::from_millis(20),
        },
    }
}

pub async fn build_test_app() -> TestApp {
    build_test_app_with(|_| {}).await
}

/// Build the full application router with all middleware layers, letting
/// the test adjust the provider configuration first.
pub async fn build_test_app_with<F>(adjust: F) -> TestApp
where
    F: FnOnce(&mut ProviderConfig),
{
    let server = MockServer::start().await;
    let results = tempfile::tempdir().expect("temp dir");
    let mut provider = provider_config(&server, &results);
    adjust(&mut provider);

    let store = Arc::new(MemoryJobStore::new());
    let manager = JobManager::new(store.clone() as Arc<dyn JobStore>, Arc::new(provider))
        .expect("manager builds");

    let state = AppState {
        manager: Arc::clone(&manager),
        config: Arc::new(test_config()),
        pool: None,
    };
    let app = build_app_router(state).expect("router builds");

    TestApp {
        app,
        server,
        store,
        manager,
        results,
    }
}

/// Send a request through a clone of the router.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    owner: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

pub async fn get(app: &Router, uri: &str, owner: Option<&str>) -> Response {
    send(app, Method::GET, uri, owner, None).await
}

pub async fn post_json(app: &Router, uri: &str, owner: Option<&str>, body: Value) -> Response {
    send(app, Method::POST, uri, owner, Some(body)).await
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

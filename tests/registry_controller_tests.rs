//! # Registry Controller Integration Tests
//!
//! Runs the image registry controller end to end against a stub storage API
//! speaking the PostgREST dialect, with an in-process registry login.
//!
//! These tests verify:
//! - Connected and failed registries get their status PATCHed
//! - Soft-deleted registries in `DELETED` phase are removed
//! - A malformed row does not stop the other rows from reconciling
//! - Storage filters and bearer tokens reach the storage API

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use fleet_controller::config::ControllerConfig;
use fleet_controller::controller::{Controller, ImageRegistryController};
use fleet_controller::provider::{ImageRegistryClient, RegistryAuth};
use fleet_controller::storage::{ListOption, RestStorage, Storage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
enum Recorded {
    List(HashMap<String, String>, Option<String>),
    Patch(String, Value),
    Delete(String),
}

#[derive(Clone)]
struct StubStorage {
    rows: Arc<Vec<Value>>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubStorage {
    fn patches(&self) -> Vec<(String, Value)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Recorded::Patch(id, body) => Some((id.clone(), body.clone())),
                _ => None,
            })
            .collect()
    }

    fn deletes(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| match r {
                Recorded::Delete(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }
}

async fn list_rows(
    State(stub): State<StubStorage>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Vec<Value>> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    stub.requests
        .lock()
        .unwrap()
        .push(Recorded::List(query, auth));
    Json(stub.rows.as_ref().clone())
}

async fn patch_row(
    State(stub): State<StubStorage>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> StatusCode {
    let id = query.get("id").cloned().unwrap_or_default();
    stub.requests.lock().unwrap().push(Recorded::Patch(id, body));
    StatusCode::NO_CONTENT
}

async fn delete_row(
    State(stub): State<StubStorage>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    let id = query.get("id").cloned().unwrap_or_default();
    stub.requests.lock().unwrap().push(Recorded::Delete(id));
    StatusCode::NO_CONTENT
}

async fn serve_storage(rows: Vec<Value>) -> (String, StubStorage) {
    let stub = StubStorage {
        rows: Arc::new(rows),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route(
            "/image_registries",
            get(list_rows).patch(patch_row).delete(delete_row),
        )
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), stub)
}

/// Accepts any credentials except the ones for user `denied`
#[derive(Debug)]
struct FakeRegistryClient;

#[async_trait]
impl ImageRegistryClient for FakeRegistryClient {
    async fn login(&self, auth: &RegistryAuth) -> Result<()> {
        if auth.username == "denied" {
            anyhow::bail!("auth denied");
        }
        Ok(())
    }
}

fn row(id: i64, name: &str, username: &str, phase: &str, deleted: bool) -> Value {
    let deletion_timestamp = if deleted {
        json!("2024-01-01T00:00:00Z")
    } else {
        Value::Null
    };
    json!({
        "id": id,
        "metadata": {
            "name": name,
            "deletion_timestamp": deletion_timestamp,
        },
        "spec": {
            "url": "registry.example.com",
            "authconfig": { "username": username, "password": "secret" }
        },
        "status": { "phase": phase }
    })
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn test_controller_writes_status_for_each_registry() {
    let (url, stub) = serve_storage(vec![
        row(1, "ok", "alice", "", false),
        row(2, "bad", "denied", "CONNECTED", false),
        row(3, "gone", "alice", "DELETED", true),
        row(4, "going", "alice", "CONNECTED", true),
        // Undecodable phase: skipped without blocking the others
        row(5, "corrupt", "alice", "Unknown", false),
    ])
    .await;

    let config = ControllerConfig {
        workers: 2,
        storage_url: url.clone(),
        ..ControllerConfig::default()
    };
    let storage = RestStorage::new(&url, None, Duration::from_secs(5)).unwrap();
    let controller = Arc::new(ImageRegistryController::new(
        &config,
        Arc::new(storage),
        Arc::new(FakeRegistryClient),
    ));
    assert_eq!(controller.name(), "image-registry");

    let token = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&controller).start(token.clone()));

    wait_until(|| stub.patches().len() >= 3 && !stub.deletes().is_empty()).await;
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    let patches: HashMap<String, Value> = stub.patches().into_iter().collect();

    let connected = &patches["eq.1"]["status"];
    assert_eq!(connected["phase"], "CONNECTED");
    assert_eq!(connected["error_message"], "");
    assert!(!connected["last_transition_time"].as_str().unwrap().is_empty());

    let failed = &patches["eq.2"]["status"];
    assert_eq!(failed["phase"], "FAILED");
    assert_eq!(failed["error_message"], "auth denied");

    assert_eq!(patches["eq.4"]["status"]["phase"], "DELETED");
    assert!(!patches.contains_key("eq.3"));
    assert!(!patches.contains_key("eq.5"));

    assert_eq!(stub.deletes(), vec!["eq.3".to_string()]);
}

#[tokio::test]
async fn test_rest_storage_sends_filters_and_token() {
    let (url, stub) = serve_storage(vec![row(1, "ok", "alice", "CONNECTED", false)]).await;
    let storage =
        RestStorage::new(&url, Some("storage-token".to_string()), Duration::from_secs(5)).unwrap();

    let registries = storage
        .list_image_registry(&ListOption::default().eq("metadata->>workspace", "team-a"))
        .await
        .unwrap();
    assert_eq!(registries.len(), 1);
    assert_eq!(registries[0].metadata.name, "ok");

    let requests = stub.requests.lock().unwrap();
    let Recorded::List(query, auth) = &requests[0] else {
        panic!("expected a list request, got {:?}", requests[0]);
    };
    assert_eq!(query["select"], "*");
    assert_eq!(query["metadata->>workspace"], "eq.team-a");
    assert_eq!(auth.as_deref(), Some("Bearer storage-token"));
}

#[tokio::test]
async fn test_rest_storage_reports_error_status() {
    let app = Router::new().route(
        "/image_registries",
        get(|| async { (StatusCode::UNAUTHORIZED, "JWT expired") }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let storage =
        RestStorage::new(&format!("http://{addr}"), None, Duration::from_secs(5)).unwrap();
    let err = storage
        .list_image_registry(&ListOption::default())
        .await
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("401"), "{message}");
    assert!(message.contains("JWT expired"), "{message}");
}

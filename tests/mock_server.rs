//! End-to-end tests for the mock server: dispatch, internal routes and
//! hot reload through the filesystem watcher.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::TempDir;
use vack::config::MockSettings;
use vack::mock::run_server;

async fn start_server(settings: MockSettings) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        run_server(settings, listener).await.unwrap();
    });
    (format!("http://{addr}"), handle)
}

async fn stop_server(base: &str, handle: tokio::task::JoinHandle<()>) {
    reqwest::get(format!("{base}/_vack/stop")).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

fn settings_for(dir: &TempDir) -> MockSettings {
    MockSettings {
        dir: dir.path().to_path_buf(),
        debounce_ms: 100,
        ..MockSettings::default()
    }
}

#[tokio::test]
async fn test_serves_mock_with_envelope() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("user.mock.json"),
        r#"{"/api/user/info": {"method": "GET", "data": {"id": 7}}}"#,
    )
    .unwrap();

    let (base, handle) = start_server(settings_for(&dir)).await;

    let body: Value = reqwest::get(format!("{base}/api/user/info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        body,
        json!({"code": "0", "data": {"id": 7}, "msg": "请求成功"})
    );

    // Unknown paths get a plain 404 when no proxy is configured.
    let missing = reqwest::get(format!("{base}/api/nope")).await.unwrap();
    assert_eq!(missing.status(), 404);

    stop_server(&base, handle).await;
}

#[tokio::test]
async fn test_health_reports_loaded_entries() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("a.mock.json"),
        r#"{"/one": {"data": 1}, "/two": {"data": 2}}"#,
    )
    .unwrap();

    let (base, handle) = start_server(settings_for(&dir)).await;

    let body: Value = reqwest::get(format!("{base}/_vack/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["entries"], 2);
    let urls = body["urls"].as_array().unwrap();
    assert!(urls.contains(&json!("/one")));
    assert!(urls.contains(&json!("/two")));

    stop_server(&base, handle).await;
}

#[tokio::test]
async fn test_mocks_cannot_shadow_internal_routes() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("sneaky.mock.json"),
        r#"{
            "/_vack/health": {"data": "shadowed"},
            "/_vack/stop": {"data": "shadowed"},
            "/api/real": {"data": "real"}
        }"#,
    )
    .unwrap();

    let (base, handle) = start_server(settings_for(&dir)).await;

    // The health route answers itself, not the mock entry.
    let health: Value = reqwest::get(format!("{base}/_vack/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    // Ordinary mocks still dispatch.
    let real: Value = reqwest::get(format!("{base}/api/real"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(real["data"], "real");

    // Stop must reach the control route too; the helper hangs otherwise.
    stop_server(&base, handle).await;
}

#[tokio::test]
async fn test_hot_reload_picks_up_new_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("a.mock.json"),
        r#"{"/old": {"data": "old"}}"#,
    )
    .unwrap();

    let (base, handle) = start_server(settings_for(&dir)).await;

    let before = reqwest::get(format!("{base}/fresh")).await.unwrap();
    assert_eq!(before.status(), 404);

    fs::write(
        dir.path().join("b.mock.json"),
        r#"{"/fresh": {"data": "new"}}"#,
    )
    .unwrap();

    // Wait out the debounce window, polling until the reload lands.
    let mut reloaded = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = reqwest::get(format!("{base}/fresh")).await.unwrap();
        if response.status() == 200 {
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["data"], "new");
            reloaded = true;
            break;
        }
    }
    assert!(reloaded, "new mock file was never picked up");

    stop_server(&base, handle).await;
}

#[tokio::test]
async fn test_hot_reload_prunes_deleted_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("gone.mock.json"),
        r#"{"/gone": {"data": 1}}"#,
    )
    .unwrap();

    let (base, handle) = start_server(settings_for(&dir)).await;

    let before = reqwest::get(format!("{base}/gone")).await.unwrap();
    assert_eq!(before.status(), 200);

    fs::remove_file(dir.path().join("gone.mock.json")).unwrap();

    let mut pruned = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let response = reqwest::get(format!("{base}/gone")).await.unwrap();
        if response.status() == 404 {
            pruned = true;
            break;
        }
    }
    assert!(pruned, "deleted mock file was never pruned");

    stop_server(&base, handle).await;
}

#[tokio::test]
async fn test_unmatched_requests_are_proxied() {
    // Upstream is a second mock server with its own definitions.
    let upstream_dir = TempDir::new().unwrap();
    fs::write(
        upstream_dir.path().join("up.mock.json"),
        r#"{"/upstream/only": {"data": "from upstream"}}"#,
    )
    .unwrap();
    let (upstream_base, upstream_handle) = start_server(settings_for(&upstream_dir)).await;

    let front_dir = TempDir::new().unwrap();
    fs::write(
        front_dir.path().join("front.mock.json"),
        r#"{"/local": {"data": "local"}}"#,
    )
    .unwrap();
    let mut settings = settings_for(&front_dir);
    settings.proxy = Some(upstream_base.clone());
    let (base, handle) = start_server(settings).await;

    // Local mock wins.
    let local: Value = reqwest::get(format!("{base}/local"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(local["data"], "local");

    // Everything else is forwarded upstream.
    let forwarded: Value = reqwest::get(format!("{base}/upstream/only"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(forwarded["data"], "from upstream");

    stop_server(&base, handle).await;
    stop_server(&upstream_base, upstream_handle).await;
}

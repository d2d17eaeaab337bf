//! Mock Server Integration Tests
//!
//! Runs a real MockServer on 127.0.0.1:0 and drives it over HTTP with reqwest:
//! - expectation scenario end to end
//! - upload + reload switching example format
//! - failed reload keeping the previous contract
//! - stop closing the listener
//!
//! Uses tempfile for isolation

use mockpit::errors::MockError;
use mockpit::{ControlClient, MockServer, ServerConfig, ServerHandle, ServerState};
use reqwest::{StatusCode, Url};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

struct RunningMock {
    addr: SocketAddr,
    handle: ServerHandle,
    errors: UnboundedReceiver<MockError>,
    task: JoinHandle<mockpit::errors::Result<()>>,
}

impl RunningMock {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn control(&self) -> ControlClient {
        ControlClient::new(Url::parse(&self.url("")).unwrap())
    }

    async fn shutdown(self) {
        self.handle.stop().unwrap();
        self.task.await.unwrap().unwrap();
    }
}

/// Helper to write one file-format example
fn write_example(dir: &Path, file: &str, method: &str, case: &str, status: u16, body: &str) {
    let example = format!(
        r#"resource: /users
method: {}
case: {}
response:
  status: {}
  headers:
    Content-Type: application/json
  body: '{}'
"#,
        method, case, status, body
    );
    fs::write(dir.join(file), example).unwrap();
}

async fn start_mock(dir: &Path) -> RunningMock {
    let mut server = MockServer::bind(ServerConfig::new("127.0.0.1:0", dir))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let errors = server.take_errors().unwrap();
    let handle = server.handle();
    let task = tokio::spawn(server.serve());

    assert_eq!(
        handle.wait_for(ServerState::Serving).await.unwrap(),
        ServerState::Serving
    );

    RunningMock {
        addr,
        handle,
        errors,
        task,
    }
}

/// Reloads are asynchronous; retry arming until the new contract is installed
async fn expect_eventually(control: &ControlClient, case: &str) {
    for _ in 0..100 {
        match control.expect(case).await {
            Ok(()) => return,
            Err(err) if err.is_not_found() => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(err) => panic!("expect failed: {}", err),
        }
    }
    panic!("case '{}' never became available", case);
}

#[tokio::test]
async fn test_list_all_users_scenario() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "list.yaml", "GET", "list all users", 200, r#"[{"name":"ada"}]"#);
    let mock = start_mock(temp.path()).await;
    let http = reqwest::Client::new();

    let response = http.get(mock.url("/users")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = http
        .get(mock.url("/_expect?case=list+all+users"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = http.get(mock.url("/users")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    assert_eq!(response.text().await.unwrap(), r#"[{"name":"ada"}]"#);

    let body = http
        .get(mock.url("/_recordings?case=list+all+users"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, r#"{"count":1}"#);

    let recording = mock.control().recordings("list all users").await.unwrap();
    assert_eq!(recording.count, 0);

    let response = http.get(mock.url("/users")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().contains("any more"));

    mock.shutdown().await;
}

#[tokio::test]
async fn test_expectations_consumed_in_arming_order() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "a.yaml", "GET", "first", 200, "one");
    write_example(temp.path(), "b.yaml", "GET", "second", 202, "two");
    let mock = start_mock(temp.path()).await;
    let control = mock.control();

    control.expect("second").await.unwrap();
    control.expect("first").await.unwrap();
    control.expect("second").await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let response = reqwest::get(mock.url("/users")).await.unwrap();
        seen.push((response.status().as_u16(), response.text().await.unwrap()));
    }
    assert_eq!(
        seen,
        vec![
            (202, "two".to_string()),
            (200, "one".to_string()),
            (202, "two".to_string())
        ]
    );

    assert_eq!(control.recordings("second").await.unwrap().count, 2);
    assert_eq!(control.recordings("first").await.unwrap().count, 1);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_requests_consume_each_expectation_once() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "list.yaml", "GET", "list all users", 200, "[]");
    let mock = start_mock(temp.path()).await;
    let control = mock.control();

    for _ in 0..20 {
        control.expect("list all users").await.unwrap();
    }

    let http = reqwest::Client::new();
    let requests = (0..30).map(|_| {
        let http = http.clone();
        let url = mock.url("/users");
        tokio::spawn(async move { http.get(url).send().await.unwrap().status() })
    });

    let mut ok = 0;
    let mut rejected = 0;
    for request in requests.collect::<Vec<_>>() {
        match request.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::BAD_REQUEST => rejected += 1,
            other => panic!("unexpected status {}", other),
        }
    }

    assert_eq!((ok, rejected), (20, 10));
    assert_eq!(control.recordings("list all users").await.unwrap().count, 20);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_upload_and_reload_switches_to_markdown() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "list.yaml", "GET", "list all users", 200, "[]");
    let mock = start_mock(temp.path()).await;
    let control = mock.control();

    let source = TempDir::new().unwrap();
    fs::write(
        source.path().join("orders.md"),
        "# /orders/:id\n\n## DELETE\n\n### delete an order\nStatus: 204\n",
    )
    .unwrap();

    control.upload_dir(source.path()).await.unwrap();
    assert!(temp.path().join("orders.md").exists());
    assert!(!temp.path().join("list.yaml").exists());

    // Upload alone does not rebuild the contract
    control.expect("list all users").await.unwrap();

    control.reload().await.unwrap();
    expect_eventually(&control, "delete an order").await;

    let err = control.expect("list all users").await.unwrap_err();
    assert!(err.is_not_found());

    let response = reqwest::Client::new()
        .delete(mock.url("/orders/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_upload_rejects_wrong_content_type() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "list.yaml", "GET", "list all users", 200, "[]");
    let mock = start_mock(temp.path()).await;

    let response = reqwest::Client::new()
        .post(mock.url("/_examples"))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(temp.path().join("list.yaml").exists());

    mock.shutdown().await;
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_contract() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "list.yaml", "GET", "list all users", 200, "[]");
    let mut mock = start_mock(temp.path()).await;

    // Same case name twice is rejected when the contract is built
    write_example(temp.path(), "z.yaml", "POST", "list all users", 201, "{}");
    mock.handle.reload().unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), mock.errors.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(err, MockError::Contract(_)));
    assert_eq!(mock.handle.state(), ServerState::Serving);

    let control = mock.control();
    control.expect("list all users").await.unwrap();
    let response = reqwest::get(mock.url("/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    mock.shutdown().await;
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let temp = TempDir::new().unwrap();
    write_example(temp.path(), "list.yaml", "GET", "list all users", 200, "[]");
    let mock = start_mock(temp.path()).await;
    let url = mock.url("/_expect?case=list+all+users");
    let handle = mock.handle.clone();

    mock.shutdown().await;
    assert_eq!(handle.state(), ServerState::Stopped);

    let result = reqwest::Client::new().get(url).send().await;
    assert!(result.is_err());
    assert!(handle.reload().is_err());
}

#[tokio::test]
async fn test_missing_examples_dir_fails_start() {
    let temp = TempDir::new().unwrap();
    let server = MockServer::bind(ServerConfig::new("127.0.0.1:0", temp.path().join("nope")))
        .await
        .unwrap();

    let err = server.serve().await.unwrap_err();
    assert!(err.to_string().contains("is this a Mockpit project?"));
}

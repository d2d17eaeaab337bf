//! Container Manager Lifecycle Tests
//!
//! Drives ContainerManager against a runtime that runs each "container" as an
//! in-process MockServer on a real loopback port, so the whole start flow is
//! exercised: create, start, readiness, endpoint resolution, tar upload over
//! HTTP, reload signal, then expectations and teardown.
//!
//! Uses tempfile for isolation - no Docker required

use async_trait::async_trait;
use mockpit::errors::{MockError, Result};
use mockpit::manager::{ContainerInspection, ContainerSpec, ContainerSummary};
use mockpit::{
    ContainerManager, ContainerRuntime, InMemoryRuntime, ManagerConfig, MockServer, ServerConfig,
    ServerHandle, ServerState,
};
use reqwest::StatusCode;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// One "container": a mock server over its own private examples directory
struct LocalContainer {
    id: String,
    name: String,
    container_port: u16,
    host_port: u16,
    handle: ServerHandle,
    server: Option<MockServer>,
    task: Option<JoinHandle<Result<()>>>,
    _examples: TempDir,
}

#[derive(Default)]
struct LocalRuntime {
    containers: Mutex<Vec<LocalContainer>>,
    next_id: AtomicU64,
}

#[async_trait]
impl ContainerRuntime for LocalRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let mut containers = self.containers.lock().await;
        if containers.iter().any(|c| c.name == spec.name) {
            return Err(MockError::Runtime(format!("name {} in use", spec.name)));
        }

        let examples = TempDir::new()?;
        let bind = format!("127.0.0.1:{}", spec.host_port.unwrap_or(0));
        let server = MockServer::bind(ServerConfig::new(&bind, examples.path())).await?;
        let host_port = server.local_addr()?.port();
        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst));

        containers.push(LocalContainer {
            id: id.clone(),
            name: spec.name.clone(),
            container_port: spec.container_port,
            host_port,
            handle: server.handle(),
            server: Some(server),
            task: None,
            _examples: examples,
        });
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let container = find(&mut containers, id)?;
        let server = container
            .server
            .take()
            .ok_or_else(|| MockError::Runtime(format!("{} already started", id)))?;
        container.task = Some(tokio::spawn(server.serve()));
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspection> {
        let mut containers = self.containers.lock().await;
        let container = find(&mut containers, id)?;
        let mut inspection = ContainerInspection::default();
        inspection
            .ports
            .insert(container.container_port, container.host_port);
        Ok(inspection)
    }

    async fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let mut containers = self.containers.lock().await;
        let container = find(&mut containers, id)?;
        if container.handle.state() == ServerState::Serving {
            Ok(format!("Mockpit test serving on (127.0.0.1:{})...\n", container.host_port).into_bytes())
        } else {
            Ok(Vec::new())
        }
    }

    async fn kill(&self, id: &str, signal: &str) -> Result<()> {
        let mut containers = self.containers.lock().await;
        let container = find(&mut containers, id)?;
        match signal {
            "SIGHUP" => container.handle.reload(),
            _ => container.handle.stop(),
        }
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self.containers.lock().await;
        Ok(containers
            .iter()
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let container = {
            let mut containers = self.containers.lock().await;
            let idx = containers
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| MockError::Runtime(format!("No such container: {}", id)))?;
            containers.remove(idx)
        };

        let _ = container.handle.stop();
        if let Some(task) = container.task {
            let _ = task.await;
        }
        Ok(())
    }
}

fn find<'a>(containers: &'a mut [LocalContainer], id: &str) -> Result<&'a mut LocalContainer> {
    containers
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| MockError::Runtime(format!("No such container: {}", id)))
}

fn fast_config() -> ManagerConfig {
    ManagerConfig {
        ready_interval_ms: 10,
        ready_timeout_ms: 2_000,
        ..Default::default()
    }
}

/// Helper to create an examples directory with one GET /users case
fn create_examples(case: &str, body: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    let example = format!(
        "resource: /users\nmethod: GET\ncase: {}\nresponse:\n  status: 200\n  body: '{}'\n",
        case, body
    );
    fs::write(temp.path().join("users.yaml"), example).unwrap();
    temp
}

/// The reload signal is asynchronous; retry until the uploaded case is known
async fn arm_eventually(manager: &ContainerManager, case: &str, port: u16) {
    for _ in 0..100 {
        match manager.arm_expectation(case, port).await {
            Ok(()) => return,
            Err(err) if err.is_not_found() => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(err) => panic!("arm failed: {}", err),
        }
    }
    panic!("case '{}' never became available", case);
}

async fn start_and_check(manager: &ContainerManager, dir: &Path, case: &str, body: &str) -> u16 {
    let instance = manager.start(dir, None).await.unwrap();
    assert_eq!(instance.dir, dir);
    assert_eq!(instance.endpoint.scheme(), "http");
    let port = instance.host_port().unwrap();

    arm_eventually(manager, case, port).await;
    let response = reqwest::get(instance.endpoint.join("/users").unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), body);
    port
}

#[tokio::test]
async fn test_full_lifecycle() {
    let runtime = Arc::new(LocalRuntime::default());
    let manager = ContainerManager::new(runtime, fast_config()).unwrap();
    let examples = create_examples("list all users", "[]");

    let port = start_and_check(&manager, examples.path(), "list all users", "[]").await;
    assert_eq!(manager.recordings("list all users", port).await.unwrap().count, 1);
    assert_eq!(manager.recordings("list all users", port).await.unwrap().count, 0);

    manager.stop(examples.path()).await.unwrap();

    // The instance is really gone
    let result = reqwest::Client::new()
        .get(format!("http://127.0.0.1:{}/users", port))
        .send()
        .await;
    assert!(result.is_err());

    let err = manager.stop(examples.path()).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_requested_host_port_is_used() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let runtime = Arc::new(LocalRuntime::default());
    let manager = ContainerManager::new(runtime, fast_config()).unwrap();
    let examples = create_examples("list all users", "[]");

    let instance = manager.start(examples.path(), Some(port)).await.unwrap();
    assert_eq!(instance.host_port(), Some(port));

    manager.stop(examples.path()).await.unwrap();
}

#[tokio::test]
async fn test_directories_are_isolated() {
    let runtime = Arc::new(LocalRuntime::default());
    let manager = ContainerManager::new(runtime, fast_config()).unwrap();
    let users = create_examples("list all users", "[1]");
    let admins = create_examples("list all admins", "[2]");

    let (a, b) = tokio::join!(
        start_and_check(&manager, users.path(), "list all users", "[1]"),
        start_and_check(&manager, admins.path(), "list all admins", "[2]"),
    );
    assert_ne!(a, b);

    // Each instance only knows its own examples
    let err = manager.arm_expectation("list all admins", a).await.unwrap_err();
    assert!(err.is_not_found());

    manager.stop(users.path()).await.unwrap();
    manager.stop(admins.path()).await.unwrap();
}

#[tokio::test]
async fn test_start_timeout_then_stop() {
    let runtime = Arc::new(InMemoryRuntime::new().with_logs("still booting\n"));
    let config = ManagerConfig {
        ready_interval_ms: 10,
        ready_timeout_ms: 100,
        ..Default::default()
    };
    let manager = ContainerManager::new(runtime.clone(), config).unwrap();
    let examples = create_examples("list all users", "[]");

    let err = manager.start(examples.path(), None).await.unwrap_err();
    assert!(matches!(err, MockError::Timeout(_)));

    let name = ContainerManager::container_name(examples.path()).unwrap();
    assert!(runtime.is_running(&name));
    assert!(runtime.signals(&name).is_empty());

    manager.stop(examples.path()).await.unwrap();
    assert!(runtime.container_names().is_empty());
}

#[tokio::test]
async fn test_reload_signal_follows_upload() {
    let runtime = Arc::new(InMemoryRuntime::new());
    let manager = ContainerManager::new(runtime.clone(), fast_config()).unwrap();
    let examples = create_examples("list all users", "[]");

    // Nothing listens on the published port, so the upload step fails
    let err = manager.start(examples.path(), Some(refused_port())).await.unwrap_err();
    assert!(matches!(err, MockError::Http(_)));

    let name = ContainerManager::container_name(examples.path()).unwrap();
    assert!(runtime.signals(&name).is_empty());
    manager.stop(examples.path()).await.unwrap();
}

fn refused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

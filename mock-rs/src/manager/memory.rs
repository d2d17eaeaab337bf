//! In-memory [`ContainerRuntime`] for tests and harness code without Docker

use super::runtime::{ContainerInspection, ContainerRuntime, ContainerSpec, ContainerSummary};
use crate::errors::{MockError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

const FIRST_HOST_PORT: u16 = 49153;

/// Call made against an [`InMemoryRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOp {
    Create { name: String, host_port: Option<u16> },
    Start(String),
    Inspect(String),
    Logs(String),
    Kill { id: String, signal: String },
    List,
    Remove(String),
}

impl RuntimeOp {
    /// Operation name, as accepted by [`InMemoryRuntime::fail_on`]
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeOp::Create { .. } => "create",
            RuntimeOp::Start(_) => "start",
            RuntimeOp::Inspect(_) => "inspect",
            RuntimeOp::Logs(_) => "logs",
            RuntimeOp::Kill { .. } => "kill",
            RuntimeOp::List => "list",
            RuntimeOp::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryContainer {
    id: String,
    name: String,
    running: bool,
    container_port: u16,
    host_port: u16,
    signals: Vec<String>,
}

#[derive(Debug)]
struct MemoryState {
    containers: Vec<MemoryContainer>,
    ops: Vec<RuntimeOp>,
    logs: Vec<u8>,
    next_id: u64,
    next_port: u16,
    failures: HashSet<String>,
}

/// Fake runtime keeping containers in a list
///
/// Every started container reports the same configured log output, which by
/// default contains the readiness line. Operations are recorded in order.
#[derive(Debug)]
pub struct InMemoryRuntime {
    state: Mutex<MemoryState>,
}

impl Default for InMemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                containers: Vec::new(),
                ops: Vec::new(),
                logs: b"Mockpit serving on (0.0.0.0:8000)...\n".to_vec(),
                next_id: 1,
                next_port: FIRST_HOST_PORT,
                failures: HashSet::new(),
            }),
        }
    }

    /// Log output every running container reports
    pub fn with_logs(self, logs: impl Into<Vec<u8>>) -> Self {
        self.state().logs = logs.into();
        self
    }

    /// First host port handed out when the caller doesn't request one
    pub fn with_port_base(self, port: u16) -> Self {
        self.state().next_port = port;
        self
    }

    /// Make every later call of `kind` ("create", "start", ...) fail
    pub fn fail_on(&self, kind: &str) {
        self.state().failures.insert(kind.to_string());
    }

    pub fn operations(&self) -> Vec<RuntimeOp> {
        self.state().ops.clone()
    }

    /// Names of all containers, running or not
    pub fn container_names(&self) -> Vec<String> {
        self.state().containers.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state()
            .containers
            .iter()
            .any(|c| c.name == name && c.running)
    }

    /// Signals delivered to the container called `name`
    pub fn signals(&self, name: &str) -> Vec<String> {
        self.state()
            .containers
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.signals.clone())
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `op` and return the locked state, or the simulated failure
    fn record(&self, op: RuntimeOp) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        let kind = op.kind();
        state.ops.push(op);
        if state.failures.contains(kind) {
            return Err(MockError::Runtime(format!("simulated {} failure", kind)));
        }
        Ok(state)
    }
}

impl MemoryState {
    fn container_mut(&mut self, id: &str) -> Result<&mut MemoryContainer> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| MockError::Runtime(format!("No such container: {}", id)))
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.record(RuntimeOp::Create {
            name: spec.name.clone(),
            host_port: spec.host_port,
        })?;

        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(MockError::Runtime(format!(
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            )));
        }

        let host_port = match spec.host_port {
            Some(port) => port,
            None => {
                let port = state.next_port;
                state.next_port = state.next_port.wrapping_add(1);
                port
            }
        };

        let id = format!("{:012x}", state.next_id);
        state.next_id += 1;
        state.containers.push(MemoryContainer {
            id: id.clone(),
            name: spec.name.clone(),
            running: false,
            container_port: spec.container_port,
            host_port,
            signals: Vec::new(),
        });
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut state = self.record(RuntimeOp::Start(id.to_string()))?;
        state.container_mut(id)?.running = true;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspection> {
        let mut state = self.record(RuntimeOp::Inspect(id.to_string()))?;
        let container = state.container_mut(id)?;

        let mut inspection = ContainerInspection::default();
        if container.running {
            inspection
                .ports
                .insert(container.container_port, container.host_port);
        }
        Ok(inspection)
    }

    async fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let mut state = self.record(RuntimeOp::Logs(id.to_string()))?;
        let running = state.container_mut(id)?.running;
        Ok(if running { state.logs.clone() } else { Vec::new() })
    }

    async fn kill(&self, id: &str, signal: &str) -> Result<()> {
        let mut state = self.record(RuntimeOp::Kill {
            id: id.to_string(),
            signal: signal.to_string(),
        })?;
        let container = state.container_mut(id)?;
        if !container.running {
            return Err(MockError::Runtime(format!("Container {} is not running", id)));
        }
        container.signals.push(signal.to_string());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>> {
        let state = self.record(RuntimeOp::List)?;
        Ok(state
            .containers
            .iter()
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut state = self.record(RuntimeOp::Remove(id.to_string()))?;
        let before = state.containers.len();
        state.containers.retain(|c| c.id != id);
        if state.containers.len() == before {
            return Err(MockError::Runtime(format!("No such container: {}", id)));
        }
        Ok(())
    }
}

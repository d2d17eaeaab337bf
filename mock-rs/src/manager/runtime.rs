//! Narrow container runtime capability the manager is written against

use crate::errors::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// What to create: one image, one published TCP port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub container_port: u16,
    /// `None` lets the runtime pick a free host port
    pub host_port: Option<u16>,
}

/// Subset of `inspect` the manager needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInspection {
    /// Container TCP port -> published host port
    pub ports: BTreeMap<u16, u16>,
}

/// Entry of a container listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    /// Names as reported by the runtime; Docker prefixes them with `/`
    pub names: Vec<String>,
}

impl ContainerSummary {
    pub fn has_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.trim_start_matches('/') == name)
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a stopped container, returning its id
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn start(&self, id: &str) -> Result<()>;

    async fn inspect(&self, id: &str) -> Result<ContainerInspection>;

    /// Snapshot of combined stdout/stderr written so far
    async fn logs(&self, id: &str) -> Result<Vec<u8>>;

    /// Deliver `signal` (e.g. `SIGHUP`) to the container's root process
    async fn kill(&self, id: &str, signal: &str) -> Result<()>;

    /// All containers, running or not
    async fn list(&self) -> Result<Vec<ContainerSummary>>;

    /// Force-remove a container together with its volumes
    async fn remove(&self, id: &str) -> Result<()>;
}

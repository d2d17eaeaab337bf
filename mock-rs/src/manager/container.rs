//! One mock container per examples directory
//!
//! Containers are named after a hash of the absolute directory path, so
//! `start` and `stop` for the same directory always target the same
//! container without any bookkeeping. The manager holds no locks: calls for
//! different directories are independent, calls for the same directory must
//! be serialized by the caller.

use super::control::ControlClient;
use super::docker::DockerRuntime;
use super::readiness::ReadinessProbe;
use super::runtime::{ContainerRuntime, ContainerSpec};
use crate::archive;
use crate::config::ManagerConfig;
use crate::errors::{MockError, Result};
use crate::mock::Recording;
use reqwest::Url;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of every container the manager creates
pub const CONTAINER_PREFIX: &str = "mockpit_";

const LOCAL_HOST: &str = "127.0.0.1";

/// A started mock container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockInstance {
    pub id: String,
    /// Plain HTTP control endpoint reachable from this host
    pub endpoint: Url,
    pub dir: PathBuf,
}

impl MockInstance {
    pub fn host_port(&self) -> Option<u16> {
        self.endpoint.port()
    }
}

/// Starts, drives and removes mock containers
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    config: ManagerConfig,
    host: String,
    probe: ReadinessProbe,
    http: reqwest::Client,
}

impl std::fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerManager")
            .field("host", &self.host)
            .field("image", &self.config.image)
            .finish_non_exhaustive()
    }
}

impl ContainerManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: ManagerConfig) -> Result<Self> {
        let probe = ReadinessProbe::from_config(&config)?;
        let host = host_address(&config.docker_host)?;
        Ok(Self {
            runtime,
            config,
            host,
            probe,
            http: reqwest::Client::new(),
        })
    }

    /// Manager backed by the Docker daemon `config` points at
    pub fn connect(config: ManagerConfig) -> Result<Self> {
        let runtime = DockerRuntime::connect(&config)?;
        Self::new(Arc::new(runtime), config)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Deterministic container name for `dir`
    pub fn container_name(dir: &Path) -> Result<String> {
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        // Drops `.` segments and trailing separators
        let absolute: PathBuf = absolute.components().collect();

        let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
        Ok(format!("{}{}", CONTAINER_PREFIX, hex::encode(&digest[..16])))
    }

    /// Control endpoint for a mock published on `host_port`
    pub fn endpoint(&self, host_port: u16) -> Result<Url> {
        let raw = format!("http://{}:{}", self.host, host_port);
        Url::parse(&raw).map_err(|e| MockError::Config(format!("Invalid endpoint {}: {}", raw, e)))
    }

    pub fn control(&self, host_port: u16) -> Result<ControlClient> {
        Ok(ControlClient::with_client(self.http.clone(), self.endpoint(host_port)?))
    }

    /// Create and start the container for `dir`, upload its examples and
    /// make it load them
    ///
    /// Any failing step aborts; a container that was created stays behind
    /// until [`ContainerManager::stop`] is called.
    pub async fn start(&self, dir: &Path, host_port: Option<u16>) -> Result<MockInstance> {
        let name = Self::container_name(dir)?;
        let spec = ContainerSpec {
            name: name.clone(),
            image: self.config.image.clone(),
            container_port: self.config.control_port,
            host_port,
        };

        info!(container = %name, dir = %dir.display(), "Creating mock container");
        let id = self.runtime.create(&spec).await?;

        self.runtime.start(&id).await?;
        debug!(container = %name, "Started, waiting for readiness");

        self.probe.wait(self.runtime.as_ref(), &id).await?;

        let inspection = self.runtime.inspect(&id).await?;
        let published = inspection
            .ports
            .get(&self.config.control_port)
            .copied()
            .ok_or_else(|| {
                MockError::Runtime(format!(
                    "Container {} publishes no host port for {}/tcp",
                    name, self.config.control_port
                ))
            })?;
        let control = self.control(published)?;
        debug!(container = %name, endpoint = %control.endpoint(), "Resolved control endpoint");

        let source = dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || archive::pack_dir(&source))
            .await
            .map_err(|e| MockError::Archive(format!("Archive task failed: {}", e)))??;
        control.upload_examples(archive).await?;

        self.runtime.kill(&id, &self.config.reload_signal).await?;

        info!(container = %name, endpoint = %control.endpoint(), "Mock container is up");
        Ok(MockInstance {
            id,
            endpoint: control.endpoint().clone(),
            dir: dir.to_path_buf(),
        })
    }

    /// Force-remove the container for `dir`
    ///
    /// # Errors
    ///
    /// `MockError::ContainerNotFound` if no such container exists, see
    /// [`MockError::is_not_found`].
    pub async fn stop(&self, dir: &Path) -> Result<()> {
        let name = Self::container_name(dir)?;
        let containers = self.runtime.list().await?;

        let container = containers
            .iter()
            .find(|c| c.has_name(&name))
            .ok_or_else(|| MockError::ContainerNotFound(format!("{} ({})", name, dir.display())))?;

        self.runtime.remove(&container.id).await?;
        info!(container = %name, "Removed mock container");
        Ok(())
    }

    pub async fn arm_expectation(&self, case: &str, host_port: u16) -> Result<()> {
        self.control(host_port)?.expect(case).await
    }

    pub async fn recordings(&self, case: &str, host_port: u16) -> Result<Recording> {
        self.control(host_port)?.recordings(case).await
    }
}

/// Host the runtime publishes ports on, taken from the daemon address
fn host_address(docker_host: &str) -> Result<String> {
    if docker_host.is_empty() || docker_host.starts_with("unix://") {
        return Ok(LOCAL_HOST.to_string());
    }

    let url = Url::parse(docker_host)
        .map_err(|e| MockError::Config(format!("Invalid docker host '{}': {}", docker_host, e)))?;
    Ok(url.host_str().unwrap_or(LOCAL_HOST).to_string())
}

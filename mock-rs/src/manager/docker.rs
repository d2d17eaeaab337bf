//! Docker-backed [`ContainerRuntime`] using bollard

use super::runtime::{ContainerInspection, ContainerRuntime, ContainerSpec, ContainerSummary};
use crate::config::ManagerConfig;
use crate::errors::Result;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::debug;

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Runtime talking to a Docker daemon
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using `docker_host` and, for TLS, the certificates in `cert_path`
    ///
    /// `unix://` hosts use the local socket; `tcp://` hosts use TLS when a cert
    /// directory is configured (`key.pem`, `cert.pem`, `ca.pem`) and plain
    /// HTTP otherwise.
    pub fn connect(config: &ManagerConfig) -> Result<Self> {
        let host = config.docker_host.as_str();

        let docker = if host.is_empty() || host.starts_with("unix://") {
            Docker::connect_with_local_defaults()?
        } else if let Some(certs) = &config.cert_path {
            Docker::connect_with_ssl(
                host,
                &certs.join("key.pem"),
                &certs.join("cert.pem"),
                &certs.join("ca.pem"),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?
        } else {
            Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
        };

        debug!(host, tls = config.cert_path.is_some(), "Connected to Docker");
        Ok(Self { docker })
    }
}

fn tcp_port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let port_key = tcp_port_key(spec.container_port);

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(port_key.clone(), HashMap::new());

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            port_key,
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                // Empty host port lets the daemon pick one
                host_port: Some(spec.host_port.map(|p| p.to_string()).unwrap_or_default()),
            }]),
        );

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!(container = %spec.name, "Docker warning: {}", warning);
        }
        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspection> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let mut inspection = ContainerInspection::default();
        let ports = response
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default();

        for (key, bindings) in ports {
            let Some(container_port) = key
                .strip_suffix("/tcp")
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            let host_port = bindings
                .unwrap_or_default()
                .into_iter()
                .filter_map(|b| b.host_port)
                .find_map(|p| p.parse::<u16>().ok());
            if let Some(host_port) = host_port {
                inspection.ports.insert(container_port, host_port);
            }
        }

        Ok(inspection)
    }

    async fn logs(&self, id: &str) -> Result<Vec<u8>> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut output = Vec::new();
        while let Some(chunk) = stream.next().await {
            output.extend_from_slice(&chunk?.into_bytes());
        }
        Ok(output)
    }

    async fn kill(&self, id: &str, signal: &str) -> Result<()> {
        self.docker
            .kill_container(id, Some(KillContainerOptions { signal }))
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                Some(ContainerSummary {
                    id: c.id?,
                    names: c.names.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await?;
        Ok(())
    }
}

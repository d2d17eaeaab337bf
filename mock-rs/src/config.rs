/**
 * config.rs
 * Parser for mockpit.yaml configuration files
 *
 * Format:
 * ```yaml
 * server:
 *   bind: 0.0.0.0:8000
 *   examplesDir: .example/examples
 *   maxUploadBytes: 67108864
 *   drainTimeoutMs: 5000
 * manager:
 *   dockerHost: tcp://192.168.59.103:2376
 *   certPath: /home/me/.docker/certs
 *   image: mockpit/mock:latest
 *   controlPort: 8000
 *   readyPattern: ".*serving on.*"
 *   readyIntervalMs: 100
 *   readyTimeoutMs: 10000
 *   reloadSignal: SIGHUP
 * ```
 *
 * Every field is optional; `DOCKER_HOST` and `DOCKER_CERT_PATH` override the
 * manager connection settings when set.
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{MockError, Result};

/// Default address the mock binds to
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Examples directory relative to the working directory
pub const DEFAULT_EXAMPLES_DIR: &str = ".example/examples";

/// Image every mock container is created from
pub const DEFAULT_IMAGE: &str = "mockpit/mock:latest";

/// Port the mock listens on inside its container
pub const DEFAULT_CONTROL_PORT: u16 = 8000;

/// Line a mock writes once it accepts control traffic
pub const DEFAULT_READY_PATTERN: &str = ".*serving on.*";

/// Local docker socket used when DOCKER_HOST is not set
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 5_000;

/// mockpit.yaml file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MockpitConfig {
    pub server: ServerConfig,
    pub manager: ManagerConfig,
}

/// Settings for a mock server process
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub bind: String,
    pub examples_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// How long a stopping server waits for open connections
    pub drain_timeout_ms: u64,
}

/// Settings for the container manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
    pub docker_host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    pub image: String,
    pub control_port: u16,
    pub ready_pattern: String,
    pub ready_interval_ms: u64,
    pub ready_timeout_ms: u64,
    pub reload_signal: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            examples_dir: PathBuf::from(DEFAULT_EXAMPLES_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Config serving `examples_dir` on `bind`
    pub fn new<P: AsRef<Path>>(bind: &str, examples_dir: P) -> Self {
        Self {
            bind: bind.to_string(),
            examples_dir: examples_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            docker_host: DEFAULT_DOCKER_HOST.to_string(),
            cert_path: None,
            image: DEFAULT_IMAGE.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            ready_pattern: DEFAULT_READY_PATTERN.to_string(),
            ready_interval_ms: 100,
            ready_timeout_ms: 10_000,
            reload_signal: "SIGHUP".to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }
}

impl MockpitConfig {
    /// Load configuration from a YAML file
    ///
    /// Returns defaults if the file doesn't exist
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            MockError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: MockpitConfig = serde_yaml::from_str(&content).map_err(|e| {
            MockError::Config(format!("Invalid config {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Overlay DOCKER_HOST and DOCKER_CERT_PATH from the environment
    pub fn apply_env(&mut self) {
        self.apply_vars(
            std::env::var("DOCKER_HOST").ok(),
            std::env::var("DOCKER_CERT_PATH").ok(),
        );
    }

    fn apply_vars(&mut self, host: Option<String>, cert_path: Option<String>) {
        if let Some(host) = host.filter(|h| !h.is_empty()) {
            self.manager.docker_host = host;
        }
        if let Some(cert) = cert_path.filter(|c| !c.is_empty()) {
            self.manager.cert_path = Some(PathBuf::from(cert));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind.is_empty() {
            return Err(MockError::Config("server.bind cannot be empty".to_string()));
        }
        if self.manager.image.is_empty() {
            return Err(MockError::Config("manager.image cannot be empty".to_string()));
        }
        if self.manager.control_port == 0 {
            return Err(MockError::Config("manager.controlPort cannot be 0".to_string()));
        }
        regex::Regex::new(&self.manager.ready_pattern).map_err(|e| {
            MockError::Config(format!("manager.readyPattern does not compile: {}", e))
        })?;
        if self.manager.ready_interval_ms == 0
            || self.manager.ready_interval_ms > self.manager.ready_timeout_ms
        {
            return Err(MockError::Config(
                "manager.readyIntervalMs must be in 1..=readyTimeoutMs".to_string(),
            ));
        }
        Ok(())
    }
}

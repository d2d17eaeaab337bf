//! Readiness by scanning container output for a line

use super::runtime::ContainerRuntime;
use crate::config::ManagerConfig;
use crate::errors::{MockError, Result};
use regex::Regex;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::debug;

/// Polls log snapshots every `interval` until a line matches or `deadline` passes
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    interval: Duration,
    deadline: Duration,
    pattern: Regex,
}

impl ReadinessProbe {
    pub fn new(interval: Duration, deadline: Duration, pattern: &str) -> Result<Self> {
        if interval.is_zero() {
            return Err(MockError::Config("readiness interval cannot be zero".to_string()));
        }
        Ok(Self {
            interval,
            deadline,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn from_config(config: &ManagerConfig) -> Result<Self> {
        Self::new(
            config.ready_interval(),
            config.ready_timeout(),
            &config.ready_pattern,
        )
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// True if any line of `logs` matches the pattern
    pub fn is_ready(&self, logs: &[u8]) -> bool {
        String::from_utf8_lossy(logs)
            .lines()
            .any(|line| self.pattern.is_match(line))
    }

    /// Wait for container `id` to announce readiness
    ///
    /// # Errors
    ///
    /// `MockError::Timeout` when the deadline passes first. The container is
    /// left as it is.
    pub async fn wait(&self, runtime: &dyn ContainerRuntime, id: &str) -> Result<()> {
        let poll = async {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut attempts = 0u32;
            loop {
                ticker.tick().await;
                attempts += 1;
                let logs = runtime.logs(id).await?;
                if self.is_ready(&logs) {
                    debug!(container = id, attempts, "Container is ready");
                    return Ok::<(), MockError>(());
                }
            }
        };

        timeout(self.deadline, poll).await.map_err(|_| {
            MockError::Timeout(format!(
                "Container {} did not report '{}' within {:?}",
                id,
                self.pattern.as_str(),
                self.deadline
            ))
        })?
    }
}

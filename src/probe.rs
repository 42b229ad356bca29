//! Readiness probing.
//!
//! A sandbox is up when its container is running and the service port
//! answers. Waiting polls both at a fixed interval with a bounded number of
//! attempts; running out of attempts is terminal for the caller.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use crate::runtime::ContainerRuntime;
use crate::{Result, SandboxError, MAX_ATTEMPTS, POLL_INTERVAL};

/// Checks whether the sandbox's service port answers.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// One attempt; errors count as unreachable.
    async fn is_reachable(&self) -> bool;
}

/// HTTP reachability check. Any response below 500 counts as up.
#[derive(Debug, Clone)]
pub struct HttpReachability {
    client: reqwest::Client,
    url: String,
}

impl HttpReachability {
    /// Check `http://host:port`, giving each request `timeout`.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SandboxError::config(format!("Failed to build probe client: {e}")))?;

        Ok(Self {
            client,
            url: format!("http://{host}:{port}"),
        })
    }

    /// URL requested on each check.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Reachability for HttpReachability {
    async fn is_reachable(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(response) => response.status().as_u16() < 500,
            Err(e) => {
                debug!("Probe of {} failed: {}", self.url, e);
                false
            }
        }
    }
}

/// Poll cadence for [`wait_until_up`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Sleep between failed attempts.
    pub interval: Duration,
    /// Attempts before `NotReady`.
    pub max_attempts: u32,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_ATTEMPTS,
        }
    }
}

/// Single poll: container running, then port reachable.
pub async fn is_up(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    reachability: &dyn Reachability,
) -> bool {
    match runtime.inspect(container_id).await {
        Ok(state) if state.running => reachability.is_reachable().await,
        Ok(state) => {
            debug!("Container {} is {}", container_id, state.status);
            false
        }
        Err(e) => {
            debug!("Could not inspect container {}: {}", container_id, e);
            false
        }
    }
}

/// Poll until the sandbox is up, returning the attempt that succeeded.
pub async fn wait_until_up(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    reachability: &dyn Reachability,
    policy: ReadinessPolicy,
) -> Result<u32> {
    for attempt in 1..=policy.max_attempts {
        if is_up(runtime, container_id, reachability).await {
            info!("Sandbox {} up after {} attempt(s)", container_id, attempt);
            return Ok(attempt);
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(SandboxError::not_ready(format!(
        "Sandbox failed to start within {} attempts",
        policy.max_attempts
    )))
}

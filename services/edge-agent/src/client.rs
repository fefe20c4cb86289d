//! Control plane status client for the edge agent.
//!
//! Provides the environment status poll:
//! - Fetching the latest status (tunnel request, schedules, stacks, cadence)
//! - Adjusting the request timeout when the control plane changes cadence

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::{debug, error};

use crate::config::Config;

/// Default status request timeout, in seconds.
pub const CLIENT_DEFAULT_POLL_TIMEOUT_SECS: u64 = 5;

/// Header carrying the agent identity on every status request.
pub const EDGE_ID_HEADER: &str = "X-PortainerAgent-EdgeID";

/// Source of environment status.
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Fetch the latest environment status.
    async fn fetch_status(&self) -> Result<EnvironmentStatus>;

    /// Replace the timeout applied to subsequent requests.
    fn set_timeout(&self, timeout: Duration);
}

/// HTTP client for the control plane status endpoint.
pub struct ControlPlaneClient {
    client: reqwest::Client,
    status_url: String,
    edge_id: String,
    timeout_millis: AtomicU64,
}

impl ControlPlaneClient {
    /// Create a new control plane client.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            status_url: format!(
                "{}/api/endpoints/{}/status",
                config.server_url.trim_end_matches('/'),
                config.endpoint_id
            ),
            edge_id: config.edge_id.clone(),
            timeout_millis: AtomicU64::new(CLIENT_DEFAULT_POLL_TIMEOUT_SECS * 1000),
        })
    }

    /// Timeout currently applied to status requests.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl StatusClient for ControlPlaneClient {
    async fn fetch_status(&self) -> Result<EnvironmentStatus> {
        debug!(url = %self.status_url, "Fetching environment status");

        let response = self
            .client
            .get(&self.status_url)
            .header(EDGE_ID_HEADER, &self.edge_id)
            .timeout(self.timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Failed to fetch environment status");
            anyhow::bail!("Failed to fetch environment status: {} - {}", status, body);
        }

        let status: EnvironmentStatus = response.json().await?;
        Ok(status)
    }

    fn set_timeout(&self, timeout: Duration) {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.timeout_millis.store(millis, Ordering::Relaxed);
    }
}

/// Environment status returned by the control plane on every poll.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnvironmentStatus {
    pub status: TunnelStatus,

    /// Remote port the tunnel must forward to. Range-checked only when a
    /// tunnel is opened.
    #[serde(default)]
    pub port: i64,

    /// Unpadded base64 of the sealed tunnel credentials.
    #[serde(default)]
    pub credentials: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub schedules: Vec<Schedule>,

    /// Desired poll cadence in seconds; zero or negative means "keep current".
    #[serde(rename = "checkin", default)]
    pub checkin_interval: f64,

    /// `None` means no stack update this cycle, distinct from an empty list.
    #[serde(default)]
    pub stacks: Option<Vec<StackStatus>>,
}

/// Tunnel state requested by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TunnelStatus {
    Idle,
    Required,
    #[serde(other)]
    Other,
}

impl TunnelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunnelStatus::Idle => "IDLE",
            TunnelStatus::Required => "REQUIRED",
            TunnelStatus::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduled job as declared by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Schedule {
    #[serde(rename = "Id", alias = "ID")]
    pub id: i64,
    #[serde(default)]
    pub cron_expression: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub collect_logs: bool,
}

/// Desired version of a deployed stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StackStatus {
    #[serde(rename = "Id", alias = "ID")]
    pub id: i64,
    #[serde(rename = "Version")]
    pub version: i64,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

//! Shared test doubles for the poll service integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use edge_agent::client::{Schedule, StackStatus};
use edge_agent::collaborators::{LogRequestCollector, ScheduleRunner, StackStatusUpdater};
use edge_agent::crypto::seal_credentials;
use edge_agent::{
    Collaborators, EnvironmentStatus, MockTunnel, PollService, PollServiceConfig, ReverseTunnel,
    StatusClient, TunnelConfig, TunnelStatus,
};
use tokio::time::Instant;

pub const EDGE_ID: &str = "edge-test-01";
pub const TUNNEL_CREDENTIALS: &str = "agent:s3cret";

/// Status client that replays scripted responses, then a fallback.
#[derive(Default)]
pub struct ScriptedStatusClient {
    responses: Mutex<VecDeque<Result<EnvironmentStatus>>>,
    fallback: Mutex<Option<EnvironmentStatus>>,
    fetches: Mutex<Vec<Instant>>,
    timeouts: Mutex<Vec<Duration>>,
}

impl ScriptedStatusClient {
    pub fn push(&self, status: EnvironmentStatus) {
        self.responses.lock().unwrap().push_back(Ok(status));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    /// Response returned once the script is exhausted. Without one, fetches fail.
    pub fn set_fallback(&self, status: EnvironmentStatus) {
        *self.fallback.lock().unwrap() = Some(status);
    }

    pub fn fetches(&self) -> Vec<Instant> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusClient for ScriptedStatusClient {
    async fn fetch_status(&self) -> Result<EnvironmentStatus> {
        self.fetches.lock().unwrap().push(Instant::now());

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }

        self.fallback
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("control plane unreachable"))
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeouts.lock().unwrap().push(timeout);
    }
}

#[derive(Default)]
pub struct RecordingScheduleRunner {
    applied: Mutex<Vec<Vec<i64>>>,
    fail: AtomicBool,
}

impl RecordingScheduleRunner {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Schedule ids of every apply call.
    pub fn applied(&self) -> Vec<Vec<i64>> {
        self.applied.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleRunner for RecordingScheduleRunner {
    async fn apply(&self, schedules: &[Schedule]) -> Result<()> {
        self.applied
            .lock()
            .unwrap()
            .push(schedules.iter().map(|s| s.id).collect());

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("cron manager rejected schedules");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStackUpdater {
    updates: Mutex<Vec<HashMap<i64, i64>>>,
    fail: AtomicBool,
}

impl RecordingStackUpdater {
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn updates(&self) -> Vec<HashMap<i64, i64>> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl StackStatusUpdater for RecordingStackUpdater {
    async fn update(&self, stacks: HashMap<i64, i64>) -> Result<()> {
        self.updates.lock().unwrap().push(stacks);

        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("stack deployment diverged");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLogCollector {
    requests: Mutex<Vec<Vec<i64>>>,
}

impl RecordingLogCollector {
    pub fn requests(&self) -> Vec<Vec<i64>> {
        self.requests.lock().unwrap().clone()
    }
}

impl LogRequestCollector for RecordingLogCollector {
    fn handle(&self, schedule_ids: Vec<i64>) {
        self.requests.lock().unwrap().push(schedule_ids);
    }
}

/// Tunnel that takes `delay` to open or close.
pub struct SlowTunnel {
    inner: Arc<MockTunnel>,
    delay: Duration,
}

#[async_trait]
impl ReverseTunnel for SlowTunnel {
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn create(&self, config: TunnelConfig) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.create(config).await
    }

    async fn close(&self) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.close().await
    }
}

pub struct Harness {
    pub service: PollService,
    pub status: Arc<ScriptedStatusClient>,
    pub tunnel: Arc<MockTunnel>,
    pub schedules: Arc<RecordingScheduleRunner>,
    pub stacks: Arc<RecordingStackUpdater>,
    pub logs: Arc<RecordingLogCollector>,
}

/// Cadence 5s, inactivity timeout 30s, tunnel enabled.
pub fn test_poll_config() -> PollServiceConfig {
    PollServiceConfig {
        edge_id: EDGE_ID.to_string(),
        poll_frequency: Duration::from_secs(5),
        inactivity_timeout: Duration::from_secs(30),
        tunnel_enabled: true,
        server_url: "http://localhost:9000".to_string(),
        tunnel_server_addr: "tunnel.example.com:8000".to_string(),
        tunnel_server_fingerprint: "2c:a1:5e".to_string(),
        api_addr: "0.0.0.0:9001".to_string(),
    }
}

pub fn harness() -> Harness {
    harness_with(test_poll_config(), MockTunnel::new())
}

pub fn harness_with(config: PollServiceConfig, tunnel: MockTunnel) -> Harness {
    let tunnel = Arc::new(tunnel);
    let shared_tunnel: Arc<dyn ReverseTunnel> = tunnel.clone();
    build_harness(config, tunnel, shared_tunnel)
}

/// Harness whose tunnel creates and closes take `delay`. `Harness::tunnel`
/// is the wrapped mock, so its counters still apply.
pub fn slow_harness(delay: Duration) -> Harness {
    let tunnel = Arc::new(MockTunnel::new());
    let slow: Arc<dyn ReverseTunnel> = Arc::new(SlowTunnel {
        inner: tunnel.clone(),
        delay,
    });
    build_harness(test_poll_config(), tunnel, slow)
}

fn build_harness(
    config: PollServiceConfig,
    tunnel: Arc<MockTunnel>,
    shared_tunnel: Arc<dyn ReverseTunnel>,
) -> Harness {
    let status = Arc::new(ScriptedStatusClient::default());
    let schedules = Arc::new(RecordingScheduleRunner::default());
    let stacks = Arc::new(RecordingStackUpdater::default());
    let logs = Arc::new(RecordingLogCollector::default());

    let service = PollService::new(
        config,
        Collaborators {
            status_client: status.clone(),
            tunnel: Some(shared_tunnel),
            schedules: schedules.clone(),
            stacks: stacks.clone(),
            logs: logs.clone(),
        },
    );

    Harness {
        service,
        status,
        tunnel,
        schedules,
        stacks,
        logs,
    }
}

pub fn status(kind: TunnelStatus) -> EnvironmentStatus {
    EnvironmentStatus {
        status: kind,
        port: 0,
        credentials: String::new(),
        schedules: vec![],
        checkin_interval: 0.0,
        stacks: None,
    }
}

pub fn idle() -> EnvironmentStatus {
    status(TunnelStatus::Idle)
}

/// REQUIRED status carrying valid credentials for [`EDGE_ID`].
pub fn required(port: i64) -> EnvironmentStatus {
    EnvironmentStatus {
        port,
        credentials: seal_credentials(TUNNEL_CREDENTIALS, EDGE_ID).unwrap(),
        ..status(TunnelStatus::Required)
    }
}

pub fn schedule(id: i64, collect_logs: bool) -> Schedule {
    Schedule {
        id,
        cron_expression: "*/5 * * * *".to_string(),
        script: String::new(),
        version: 1,
        collect_logs,
    }
}

pub fn stack(id: i64, version: i64) -> StackStatus {
    StackStatus { id, version }
}

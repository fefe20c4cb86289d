//! Poll service: control plane status polling and reverse tunnel management.
//!
//! The poll service runs two loops:
//! - The status poll loop fetches the environment status at the current
//!   cadence, opens or closes the reverse tunnel as requested, and hands
//!   schedules, log requests and stack versions to their collaborators.
//! - The activity monitoring loop closes the tunnel once it has been idle
//!   longer than the inactivity timeout.
//!
//! Tunnel create/close calls are serialized by an operation lock that is
//! held across the tunnel I/O. The last activity time sits behind its own
//! short-lived lock, so activity stamps and reads never wait on tunnel I/O.
//! A cadence change restarts the poll loop with a new timer instead of
//! retuning the running one.

mod activity;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::client::{StatusClient, TunnelStatus};
use crate::collaborators::{LogRequestCollector, ScheduleRunner, StackStatusUpdater};
use crate::config::{parse_duration, Config};
use crate::crypto;
use crate::error::{ConfigError, PollError};
use crate::tunnel::{ReverseTunnel, TunnelConfig};

pub use activity::TUNNEL_ACTIVITY_CHECK_INTERVAL;

/// Immutable settings of a poll service.
#[derive(Debug, Clone)]
pub struct PollServiceConfig {
    /// Agent identity, used as the credential passphrase.
    pub edge_id: String,

    /// Initial poll cadence.
    pub poll_frequency: Duration,

    /// Idle time after which an open tunnel is closed.
    pub inactivity_timeout: Duration,

    /// Whether the tunnel is managed at all.
    pub tunnel_enabled: bool,

    pub server_url: String,
    pub tunnel_server_addr: String,
    pub tunnel_server_fingerprint: String,

    /// Local address the tunnel forwards to.
    pub api_addr: String,
}

impl PollServiceConfig {
    /// Build the poll settings, parsing duration strings.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            edge_id: config.edge_id.clone(),
            poll_frequency: parse_duration("poll_frequency", &config.poll_frequency)?,
            inactivity_timeout: parse_duration("inactivity_timeout", &config.inactivity_timeout)?,
            tunnel_enabled: config.tunnel_enabled(),
            server_url: config.server_url.clone(),
            tunnel_server_addr: config.tunnel_server_addr.clone(),
            tunnel_server_fingerprint: config.tunnel_server_fingerprint.clone(),
            api_addr: config.api_addr.clone(),
        })
    }
}

/// External collaborators driven by the poll service.
pub struct Collaborators {
    pub status_client: Arc<dyn StatusClient>,
    pub tunnel: Option<Arc<dyn ReverseTunnel>>,
    pub schedules: Arc<dyn ScheduleRunner>,
    pub stacks: Arc<dyn StackStatusUpdater>,
    pub logs: Arc<dyn LogRequestCollector>,
}

/// Tunnel handle plus the time it was last known to be active.
struct TunnelSlot {
    tunnel: Arc<dyn ReverseTunnel>,

    /// Held for the duration of a create or close.
    op_lock: Mutex<()>,

    /// `None` until a tunnel has been confirmed open. Never held across an
    /// await.
    last_activity: std::sync::Mutex<Option<Instant>>,
}

impl TunnelSlot {
    fn new(tunnel: Arc<dyn ReverseTunnel>) -> Self {
        Self {
            tunnel,
            op_lock: Mutex::new(()),
            last_activity: std::sync::Mutex::new(None),
        }
    }

    fn touch(&self) {
        if self.tunnel.is_open() {
            *self
                .last_activity
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        }
    }

    fn last_activity(&self) -> Option<Instant> {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct Inner {
    config: PollServiceConfig,

    status_client: Arc<dyn StatusClient>,
    schedules: Arc<dyn ScheduleRunner>,
    stacks: Arc<dyn StackStatusUpdater>,
    logs: Arc<dyn LogRequestCollector>,

    /// `None` when the node has no tunnel capability.
    tunnel: Option<TunnelSlot>,

    /// Current cadence in seconds, stored as `f64` bits.
    poll_interval_secs: AtomicU64,

    /// Shutdown sender of the running poll loop; `None` when stopped.
    generation: Mutex<Option<watch::Sender<bool>>>,

    /// Number of poll loops spawned so far.
    generations_started: AtomicU64,

    monitor_started: AtomicBool,
}

/// Polls the control plane and manages the reverse tunnel.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct PollService {
    inner: Arc<Inner>,
}

impl PollService {
    /// Create a new poll service.
    ///
    /// The tunnel collaborator is ignored when the config disables the tunnel;
    /// the service then only polls for schedules and stacks.
    pub fn new(config: PollServiceConfig, collaborators: Collaborators) -> Self {
        let tunnel = collaborators
            .tunnel
            .filter(|_| config.tunnel_enabled)
            .map(TunnelSlot::new);

        let poll_interval_secs = config.poll_frequency.as_secs_f64().to_bits();

        Self {
            inner: Arc::new(Inner {
                config,
                status_client: collaborators.status_client,
                schedules: collaborators.schedules,
                stacks: collaborators.stacks,
                logs: collaborators.logs,
                tunnel,
                poll_interval_secs: AtomicU64::new(poll_interval_secs),
                generation: Mutex::new(None),
                generations_started: AtomicU64::new(0),
                monitor_started: AtomicBool::new(false),
            }),
        }
    }

    /// Start the status poll loop and, with a tunnel, the activity monitoring
    /// loop. No-op when already started.
    pub async fn start(&self) -> Result<(), PollError> {
        let mut generation = self.inner.generation.lock().await;
        if generation.is_some() {
            return Ok(());
        }

        self.spawn_status_poll_loop(&mut generation);
        drop(generation);

        self.start_activity_monitoring_loop();
        Ok(())
    }

    /// Signal the status poll loop to exit. No-op when not running.
    ///
    /// An open tunnel stays open.
    pub async fn stop(&self) -> Result<(), PollError> {
        let mut generation = self.inner.generation.lock().await;
        if let Some(shutdown) = generation.take() {
            let _ = shutdown.send(true);
        }
        Ok(())
    }

    /// Replace the running status poll loop with one at the current cadence.
    ///
    /// A stopped service stays stopped; the new cadence applies on the next
    /// `start`.
    pub async fn restart(&self) {
        let mut generation = self.inner.generation.lock().await;
        let Some(shutdown) = generation.take() else {
            debug!("Poll loop not running, skipping restart");
            return;
        };
        let _ = shutdown.send(true);

        self.spawn_status_poll_loop(&mut generation);
    }

    /// Record tunnel activity. Ignored unless the tunnel is open.
    ///
    /// Never waits on an in-flight tunnel create or close.
    pub fn reset_activity(&self) {
        if let Some(slot) = &self.inner.tunnel {
            slot.touch();
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.generation.lock().await.is_some()
    }

    /// Current poll cadence in seconds.
    pub fn poll_interval_secs(&self) -> f64 {
        f64::from_bits(self.inner.poll_interval_secs.load(Ordering::SeqCst))
    }

    /// Number of status poll loops spawned since creation.
    pub fn generations_started(&self) -> u64 {
        self.inner.generations_started.load(Ordering::SeqCst)
    }

    /// Last recorded tunnel activity, `None` if never opened or no tunnel.
    pub fn last_activity(&self) -> Option<Instant> {
        self.inner.tunnel.as_ref().and_then(TunnelSlot::last_activity)
    }

    fn spawn_status_poll_loop(&self, generation: &mut Option<watch::Sender<bool>>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *generation = Some(shutdown_tx);
        self.inner.generations_started.fetch_add(1, Ordering::SeqCst);

        let interval_secs = self.poll_interval_secs();
        let period = Duration::from_secs_f64(interval_secs);

        debug!(
            poll_interval_secs = interval_secs,
            server_url = %self.inner.config.server_url,
            "Starting control plane short-polling loop"
        );

        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        debug!("Shutting down control plane short-polling loop");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = service.poll().await {
                            error!(error = %e, "An error occurred during short poll");
                        }
                    }
                }
            }
        });
    }

    /// Run one poll iteration.
    pub async fn poll(&self) -> Result<(), PollError> {
        let status = self
            .inner
            .status_client
            .fetch_status()
            .await
            .map_err(PollError::Status)?;

        debug!(
            status = %status.status,
            port = status.port,
            schedule_count = status.schedules.len(),
            checkin_interval_secs = status.checkin_interval,
            "Environment status received"
        );

        if let Some(slot) = &self.inner.tunnel {
            let _op = slot.op_lock.lock().await;

            match status.status {
                TunnelStatus::Idle if slot.tunnel.is_open() => {
                    debug!(status = %status.status, "Idle status detected, shutting down tunnel");
                    if let Err(e) = slot.tunnel.close().await {
                        error!(error = %e, "Unable to shutdown tunnel");
                    }
                }
                TunnelStatus::Required if !slot.tunnel.is_open() => {
                    debug!("Required status detected, creating reverse tunnel");
                    if let Err(e) = self
                        .create_tunnel(slot, &status.credentials, status.port)
                        .await
                    {
                        error!(error = %e, "Unable to create tunnel");
                        return Err(e);
                    }
                }
                _ => {}
            }
        }

        if let Err(e) = self.inner.schedules.apply(&status.schedules).await {
            error!(error = %e, "An error occurred during schedule management");
        }

        let logs_to_collect = status
            .schedules
            .iter()
            .filter(|schedule| schedule.collect_logs)
            .map(|schedule| schedule.id)
            .collect();
        self.inner.logs.handle(logs_to_collect);

        self.adapt_cadence(status.checkin_interval).await;

        if let Some(stacks) = &status.stacks {
            let versions: HashMap<i64, i64> = stacks
                .iter()
                .map(|stack| (stack.id, stack.version))
                .collect();

            if let Err(e) = self.inner.stacks.update(versions).await {
                error!(error = %e, "An error occurred during stack management");
                return Err(PollError::Stacks(e));
            }
        }

        Ok(())
    }

    /// Apply a cadence requested by the control plane. The restart runs on
    /// its own task so the current iteration completes first.
    async fn adapt_cadence(&self, checkin_interval: f64) {
        if checkin_interval <= 0.0 {
            return;
        }

        let interval = match Duration::try_from_secs_f64(checkin_interval) {
            Ok(interval) if !interval.is_zero() => interval,
            _ => {
                warn!(checkin_interval, "Ignoring unusable checkin interval");
                return;
            }
        };

        let current = self.poll_interval_secs();
        if current == checkin_interval {
            return;
        }

        debug!(
            old_interval = current,
            new_interval = checkin_interval,
            "Updating poll interval"
        );
        self.inner
            .poll_interval_secs
            .store(checkin_interval.to_bits(), Ordering::SeqCst);

        self.inner
            .status_client
            .set_timeout(interval);

        let service = self.clone();
        tokio::spawn(async move {
            service.restart().await;
        });
    }

    async fn create_tunnel(
        &self,
        slot: &TunnelSlot,
        encoded_credentials: &str,
        remote_port: i64,
    ) -> Result<(), PollError> {
        let remote_port =
            u16::try_from(remote_port).map_err(|_| PollError::InvalidPort(remote_port))?;

        let credentials =
            crypto::unwrap_credentials(encoded_credentials, &self.inner.config.edge_id)?;

        let tunnel_config = TunnelConfig {
            server_addr: self.inner.config.tunnel_server_addr.clone(),
            server_fingerprint: self.inner.config.tunnel_server_fingerprint.clone(),
            credentials,
            remote_port: remote_port.to_string(),
            local_addr: self.inner.config.api_addr.clone(),
        };

        slot.tunnel
            .create(tunnel_config)
            .await
            .map_err(PollError::Tunnel)?;

        slot.touch();
        Ok(())
    }
}

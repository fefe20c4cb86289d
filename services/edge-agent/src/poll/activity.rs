//! Tunnel inactivity monitoring.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info};

use super::PollService;

/// Period of the activity monitoring loop.
pub const TUNNEL_ACTIVITY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

impl PollService {
    /// Spawn the activity monitoring loop once per service. Never stopped;
    /// it lives as long as the process.
    pub(super) fn start_activity_monitoring_loop(&self) {
        if self.inner.tunnel.is_none() || self.inner.monitor_started.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!(
            monitoring_interval_secs = TUNNEL_ACTIVITY_CHECK_INTERVAL.as_secs_f64(),
            inactivity_timeout_secs = self.inner.config.inactivity_timeout.as_secs_f64(),
            "Starting activity monitoring loop"
        );

        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(
                Instant::now() + TUNNEL_ACTIVITY_CHECK_INTERVAL,
                TUNNEL_ACTIVITY_CHECK_INTERVAL,
            );

            loop {
                ticker.tick().await;
                service.check_activity().await;
            }
        });
    }

    /// Close the tunnel if it has been idle longer than the inactivity
    /// timeout. Does nothing before the first successful open.
    ///
    /// Skips the tick while the poll loop is creating or closing the tunnel.
    pub async fn check_activity(&self) {
        let Some(slot) = &self.inner.tunnel else {
            return;
        };

        if slot.last_activity().is_none() {
            return;
        }

        let Ok(_op) = slot.op_lock.try_lock() else {
            debug!("Tunnel operation in progress, skipping activity check");
            return;
        };

        // Re-read under the op lock; a create may have just finished.
        let Some(last_activity) = slot.last_activity() else {
            return;
        };

        let elapsed = last_activity.elapsed();
        debug!(
            tunnel_last_activity_secs = elapsed.as_secs_f64(),
            "Tunnel activity monitoring"
        );

        if slot.tunnel.is_open() && elapsed > self.inner.config.inactivity_timeout {
            info!(
                tunnel_last_activity_secs = elapsed.as_secs_f64(),
                "Shutting down tunnel after inactivity period"
            );

            if let Err(e) = slot.tunnel.close().await {
                error!(error = %e, "Unable to shutdown tunnel");
            }
        }
    }
}

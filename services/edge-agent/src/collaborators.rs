//! Convergence collaborator interfaces.
//!
//! The poll service hands each status response to three collaborators:
//! - Schedule runner (full schedule list)
//! - Stack status updater (stack id to desired version)
//! - Log request collector (ids of schedules whose logs are wanted)
//!
//! Logging implementations are provided for development.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use crate::client::Schedule;

/// Applies the declared schedules to the local job runner.
#[async_trait]
pub trait ScheduleRunner: Send + Sync {
    async fn apply(&self, schedules: &[Schedule]) -> Result<()>;
}

/// Converges deployed stacks toward the declared versions.
#[async_trait]
pub trait StackStatusUpdater: Send + Sync {
    async fn update(&self, stacks: HashMap<i64, i64>) -> Result<()>;
}

/// Collects logs for the given schedule ids. Fire-and-forget.
pub trait LogRequestCollector: Send + Sync {
    fn handle(&self, schedule_ids: Vec<i64>);
}

/// Schedule runner that only logs what it receives.
#[derive(Debug, Default)]
pub struct LoggingScheduleRunner;

#[async_trait]
impl ScheduleRunner for LoggingScheduleRunner {
    async fn apply(&self, schedules: &[Schedule]) -> Result<()> {
        for schedule in schedules {
            debug!(
                schedule_id = schedule.id,
                cron_expression = %schedule.cron_expression,
                version = schedule.version,
                "Schedule declared"
            );
        }
        Ok(())
    }
}

/// Stack updater that only logs what it receives.
#[derive(Debug, Default)]
pub struct LoggingStackUpdater;

#[async_trait]
impl StackStatusUpdater for LoggingStackUpdater {
    async fn update(&self, stacks: HashMap<i64, i64>) -> Result<()> {
        info!(stack_count = stacks.len(), "Stack versions received");
        Ok(())
    }
}

/// Log collector that only logs what it receives.
#[derive(Debug, Default)]
pub struct LoggingLogCollector;

impl LogRequestCollector for LoggingLogCollector {
    fn handle(&self, schedule_ids: Vec<i64>) {
        if !schedule_ids.is_empty() {
            info!(?schedule_ids, "Log collection requested");
        }
    }
}

//! Edge Agent
//!
//! Polls the control plane for the environment status, manages the reverse
//! tunnel and hands schedules and stacks to their convergence engines.
//!
//! ## Architecture
//!
//! - **Status Poll Loop**: Fetches the environment status at the cadence the
//!   control plane asks for
//! - **Activity Monitor**: Closes the tunnel after an inactivity period
//! - **Tunnel**: Abstracts the reverse-proxy transport (mock for now)

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use edge_agent::collaborators::{LoggingLogCollector, LoggingScheduleRunner, LoggingStackUpdater};
use edge_agent::config::Config;
use edge_agent::{
    Collaborators, ControlPlaneClient, MockTunnel, PollService, PollServiceConfig, ReverseTunnel,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting edge agent");
    info!(
        server_url = %config.server_url,
        endpoint_id = %config.endpoint_id,
        poll_frequency = %config.poll_frequency,
        tunnel_enabled = config.tunnel_enabled(),
        "Configuration loaded"
    );

    let poll_config = PollServiceConfig::from_config(&config)?;

    let status_client = Arc::new(ControlPlaneClient::new(&config)?);

    // Create the tunnel (mock for now)
    let tunnel: Arc<dyn ReverseTunnel> = Arc::new(MockTunnel::new());

    let service = PollService::new(
        poll_config,
        Collaborators {
            status_client,
            tunnel: Some(tunnel),
            schedules: Arc::new(LoggingScheduleRunner),
            stacks: Arc::new(LoggingStackUpdater),
            logs: Arc::new(LoggingLogCollector),
        },
    );

    service.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    service.stop().await?;

    info!("Edge agent shutdown complete");
    Ok(())
}

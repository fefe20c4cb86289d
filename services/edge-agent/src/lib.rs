//! Edge Agent Library
//!
//! The edge agent runs on a managed node behind NAT or a firewall. It polls
//! the control plane for the environment status, opens a reverse tunnel on
//! demand so the control plane can reach the node, and converges schedules
//! and stacks toward the state the control plane last reported.
//!
//! ## Architecture
//!
//! ```text
//! PollService
//! ├── status poll loop       (cadence set by the control plane)
//! │   ├── StatusClient       (environment status)
//! │   ├── ReverseTunnel      (open on REQUIRED, close on IDLE)
//! │   ├── ScheduleRunner
//! │   ├── LogRequestCollector
//! │   └── StackStatusUpdater
//! └── activity monitor loop  (closes an idle tunnel)
//! ```
//!
//! ## Modules
//!
//! - `poll`: Poll service, lifecycle and both loops
//! - `client`: Control plane status client and response types
//! - `tunnel`: Reverse tunnel interface and mock
//! - `crypto`: Tunnel credential unwrap
//! - `collaborators`: Convergence collaborator interfaces

pub mod client;
pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod error;
pub mod poll;
pub mod tunnel;

// Re-export commonly used types
pub use client::{ControlPlaneClient, EnvironmentStatus, StatusClient, TunnelStatus};
pub use error::{ConfigError, CredentialError, PollError};
pub use poll::{Collaborators, PollService, PollServiceConfig, TUNNEL_ACTIVITY_CHECK_INTERVAL};
pub use tunnel::{MockTunnel, ReverseTunnel, TunnelConfig};

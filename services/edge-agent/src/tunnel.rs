//! Reverse tunnel interface and mock implementation.
//!
//! The tunnel interface abstracts the reverse-proxy transport:
//! - Reporting whether a tunnel is open
//! - Opening a tunnel with freshly unwrapped credentials
//! - Closing it
//!
//! A mock implementation is provided for testing and development.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Parameters for a single tunnel open attempt. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub server_addr: String,
    pub server_fingerprint: String,
    pub credentials: String,
    pub remote_port: String,
    pub local_addr: String,
}

impl std::fmt::Debug for TunnelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelConfig")
            .field("server_addr", &self.server_addr)
            .field("server_fingerprint", &self.server_fingerprint)
            .field("credentials", &"<redacted>")
            .field("remote_port", &self.remote_port)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Reverse tunnel capability.
#[async_trait]
pub trait ReverseTunnel: Send + Sync {
    /// Whether a tunnel is currently open.
    fn is_open(&self) -> bool;

    /// Open a tunnel.
    async fn create(&self, config: TunnelConfig) -> Result<()>;

    /// Close the open tunnel.
    async fn close(&self) -> Result<()>;
}

/// Mock tunnel for testing and development.
pub struct MockTunnel {
    open: AtomicBool,

    creates: AtomicU64,
    closes: AtomicU64,

    /// Whether creates should "fail".
    fail_creates: AtomicBool,

    last_config: Mutex<Option<TunnelConfig>>,
}

impl MockTunnel {
    /// Create a new, closed mock tunnel.
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            creates: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            fail_creates: AtomicBool::new(false),
            last_config: Mutex::new(None),
        }
    }

    /// Create a mock tunnel that fails all creates.
    pub fn failing() -> Self {
        let tunnel = Self::new();
        tunnel.fail_creates.store(true, Ordering::SeqCst);
        tunnel
    }

    /// Toggle create failures.
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Number of successful creates.
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of successful closes.
    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Config passed to the most recent successful create.
    pub async fn last_config(&self) -> Option<TunnelConfig> {
        self.last_config.lock().await.clone()
    }
}

impl Default for MockTunnel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReverseTunnel for MockTunnel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn create(&self, config: TunnelConfig) -> Result<()> {
        if self.fail_creates.load(Ordering::SeqCst) {
            anyhow::bail!("mock tunnel create failure");
        }

        info!(
            server_addr = %config.server_addr,
            remote_port = %config.remote_port,
            local_addr = %config.local_addr,
            "Mock: opening reverse tunnel"
        );

        *self.last_config.lock().await = Some(config);
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!("Mock: closing reverse tunnel");
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

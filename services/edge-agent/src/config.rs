//! Configuration for the edge agent.

use std::time::Duration;

use crate::error::ConfigError;

/// Default poll frequency when `EDGE_POLL_FREQUENCY` is unset.
pub const DEFAULT_POLL_FREQUENCY: &str = "5s";

/// Default tunnel inactivity timeout when `EDGE_INACTIVITY_TIMEOUT` is unset.
pub const DEFAULT_INACTIVITY_TIMEOUT: &str = "5m";

/// Edge agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Agent identity. Also the passphrase for tunnel credentials.
    pub edge_id: String,

    /// Control plane URL.
    pub server_url: String,

    /// Environment (endpoint) identifier at the control plane.
    pub endpoint_id: String,

    /// Poll frequency as a duration string (e.g. `5s`).
    pub poll_frequency: String,

    /// Tunnel inactivity timeout as a duration string (e.g. `5m`).
    pub inactivity_timeout: String,

    /// Whether this node can open a reverse tunnel at all.
    pub tunnel_capability: bool,

    /// Async mode: the control plane never asks for a tunnel.
    pub async_mode: bool,

    /// Reverse tunnel server address.
    pub tunnel_server_addr: String,

    /// Reverse tunnel server fingerprint.
    pub tunnel_server_fingerprint: String,

    /// Local API address the tunnel forwards to.
    pub api_addr: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let edge_id = std::env::var("EDGE_ID").map_err(|_| ConfigError::MissingVar("EDGE_ID"))?;

        let server_url = std::env::var("EDGE_SERVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:9000".to_string());

        let endpoint_id = std::env::var("EDGE_ENDPOINT_ID").unwrap_or_else(|_| "1".to_string());

        let poll_frequency = std::env::var("EDGE_POLL_FREQUENCY")
            .unwrap_or_else(|_| DEFAULT_POLL_FREQUENCY.to_string());

        let inactivity_timeout = std::env::var("EDGE_INACTIVITY_TIMEOUT")
            .unwrap_or_else(|_| DEFAULT_INACTIVITY_TIMEOUT.to_string());

        let tunnel_capability = env_flag("EDGE_TUNNEL", true);
        let async_mode = env_flag("EDGE_ASYNC", false);

        let tunnel_server_addr = std::env::var("EDGE_TUNNEL_SERVER_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8000".to_string());

        let tunnel_server_fingerprint =
            std::env::var("EDGE_TUNNEL_SERVER_FINGERPRINT").unwrap_or_default();

        let api_addr =
            std::env::var("EDGE_API_ADDR").unwrap_or_else(|_| "0.0.0.0:9001".to_string());

        let log_level = std::env::var("EDGE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            edge_id,
            server_url,
            endpoint_id,
            poll_frequency,
            inactivity_timeout,
            tunnel_capability,
            async_mode,
            tunnel_server_addr,
            tunnel_server_fingerprint,
            api_addr,
            log_level,
        })
    }

    /// Whether the reverse tunnel is managed by this agent.
    pub fn tunnel_enabled(&self) -> bool {
        self.tunnel_capability && !self.async_mode
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

/// Parse a positive duration setting such as `5s`, `1m 30s` or `500ms`.
pub fn parse_duration(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let duration =
        humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })?;

    if duration.is_zero() {
        return Err(ConfigError::ZeroDuration { name });
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("poll_frequency", "5s").unwrap(),
            Duration::from_secs(5)
        );
        assert_eq!(
            parse_duration("inactivity_timeout", "1m 30s").unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        let err = parse_duration("poll_frequency", "soon").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration {
                name: "poll_frequency",
                ..
            }
        ));
    }

    #[test]
    fn test_parse_duration_rejects_zero() {
        let err = parse_duration("poll_frequency", "0s").unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration { .. }));
    }

    #[test]
    fn test_tunnel_disabled_in_async_mode() {
        let config = Config {
            edge_id: "edge".to_string(),
            server_url: "http://localhost:9000".to_string(),
            endpoint_id: "1".to_string(),
            poll_frequency: "5s".to_string(),
            inactivity_timeout: "5m".to_string(),
            tunnel_capability: true,
            async_mode: true,
            tunnel_server_addr: "localhost:8000".to_string(),
            tunnel_server_fingerprint: String::new(),
            api_addr: "0.0.0.0:9001".to_string(),
            log_level: "debug".to_string(),
        };
        assert!(!config.tunnel_enabled());

        let config = Config {
            async_mode: false,
            ..config
        };
        assert!(config.tunnel_enabled());
    }
}

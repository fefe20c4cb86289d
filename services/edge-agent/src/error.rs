//! Error types for the edge agent.

use thiserror::Error;

/// Configuration errors. Any of these is fatal: the poll service is never built.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// A duration setting could not be parsed.
    #[error("invalid duration for {name} '{value}': {reason}")]
    InvalidDuration {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A duration setting parsed to zero.
    #[error("{name} must be greater than zero")]
    ZeroDuration { name: &'static str },
}

/// Tunnel credential unwrap errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Transport encoding is not unpadded base64.
    #[error("credentials are not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Ciphertext is truncated or was not sealed with this agent's identity.
    #[error("credentials could not be decrypted")]
    Decrypt,

    /// Sealing failed.
    #[error("credentials could not be encrypted")]
    Encrypt,

    /// Decrypted payload is not UTF-8.
    #[error("decrypted credentials are not valid UTF-8")]
    InvalidUtf8,
}

/// Errors that end a single poll iteration early.
///
/// None of these stop the poll loop; the next tick runs as usual.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to fetch environment status: {0:#}")]
    Status(anyhow::Error),

    #[error("invalid tunnel port: {0}")]
    InvalidPort(i64),

    #[error("invalid tunnel credentials: {0}")]
    Credentials(#[from] CredentialError),

    #[error("failed to create tunnel: {0:#}")]
    Tunnel(anyhow::Error),

    #[error("failed to update stack status: {0:#}")]
    Stacks(anyhow::Error),
}

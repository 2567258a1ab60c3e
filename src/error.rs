//! Error types for the gateway.
//!
//! This module defines all errors that can surface from inventory lookup,
//! command authorization, session establishment, and command execution.

use thiserror::Error;

/// Errors that can occur while resolving devices, authorizing commands, and
/// driving pooled SSH sessions.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Unknown host or tag, or a jump-host name referenced by a device but
    /// missing from the inventory.
    #[error("device not found: {0}")]
    NotFound(String),

    /// The command matched no allow-list entry.
    #[error("command '{0}' is not allowed")]
    Forbidden(String),

    /// SSH authentication was rejected by the endpoint.
    #[error("authentication failed for {user}@{host}")]
    Auth { host: String, user: String },

    /// TCP-level failure reaching the endpoint or its jump host.
    #[error("network error connecting to {host}: {message}")]
    Network { host: String, message: String },

    /// Handshake or protocol-level SSH failure.
    #[error("ssh error on {host} ({stage}): {message}")]
    Ssh {
        host: String,
        stage: &'static str,
        message: String,
    },

    /// Failed to open the direct-tcpip channel through a jump host.
    #[error("tunnel channel to {host} failed: {message}")]
    Channel { host: String, message: String },

    /// The device record carries neither a password nor a key file.
    #[error("no password or key file provided for {host}")]
    NoCredentials { host: String },

    /// `execute` was called without a prior successful `get_session`.
    #[error("no active session for {host}")]
    SessionMissing { host: String },

    /// Startup-time failure: unreadable file, invalid YAML/JSON, invalid
    /// regex, or an unknown jump-host reference.
    #[error("configuration error: {0}")]
    Config(String),

    /// Anything that does not fit the classes above.
    #[error("unexpected error on {host}: {message}")]
    Unexpected { host: String, message: String },
}

impl GatewayError {
    /// Classifies a russh error raised while talking to `host`.
    ///
    /// I/O errors are surfaced as network failures; everything else is a
    /// protocol-level SSH failure tagged with the stage it happened in.
    pub(crate) fn from_ssh(host: &str, stage: &'static str, err: russh::Error) -> Self {
        match err {
            russh::Error::IO(io) => GatewayError::Network {
                host: host.to_string(),
                message: io.to_string(),
            },
            other => GatewayError::Ssh {
                host: host.to_string(),
                stage,
                message: other.to_string(),
            },
        }
    }
}

//! SSH session establishment: direct, jump, and tunneled-through-jump.
//!
//! A device behind a jump host is reached by opening a direct-tcpip channel
//! on the jump's transport and running a second SSH handshake over that
//! channel's byte stream. The child session is a full client of its own; the
//! jump merely carries its TCP.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use russh::client;
use russh::keys::PrivateKeyWithHashAlg;
use russh::Disconnect;
use tokio::time::timeout;

use super::{algo, Credentials, SshHandle};
use crate::error::GatewayError;
use crate::inventory::JumpHost;

/// TCP connect plus SSH handshake budget.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// direct-tcpip channel open budget.
const CHANNEL_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport keepalive for device sessions.
pub(super) const DEVICE_KEEPALIVE: Duration = Duration::from_secs(60);

/// Transport keepalive for jump sessions; jumps carry child transports, so
/// they ping more often.
pub(super) const JUMP_KEEPALIVE: Duration = Duration::from_secs(15);

/// Client-side handler. Unknown host keys are accepted; the inventory is the
/// authority on what the gateway talks to.
pub struct GateClientHandler;

impl client::Handler for GateClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn client_config(keepalive: Duration) -> Arc<client::Config> {
    Arc::new(client::Config {
        // The pool's reaper owns idleness; the transport must not time out
        // underneath it.
        inactivity_timeout: None,
        keepalive_interval: Some(keepalive),
        keepalive_max: 3,
        preferred: algo::compat_preferred(),
        ..Default::default()
    })
}

/// Dials `host:port` and authenticates. Used for direct device sessions and
/// for the jump host's own session.
pub(super) async fn connect_direct(
    host: &str,
    port: u16,
    credentials: &Credentials,
    keepalive: Duration,
) -> Result<SshHandle, GatewayError> {
    let config = client_config(keepalive);
    let mut handle = timeout(
        HANDSHAKE_TIMEOUT,
        client::connect(config, (host, port), GateClientHandler),
    )
    .await
    .map_err(|_| GatewayError::Network {
        host: host.to_string(),
        message: format!("handshake did not complete within {HANDSHAKE_TIMEOUT:?}"),
    })?
    .map_err(|e| GatewayError::from_ssh(host, "device-handshake", e))?;

    authenticate(&mut handle, host, credentials).await?;
    debug!("{host}:{port} SSH session established");
    Ok(SshHandle::new(handle))
}

/// Opens a direct-tcpip channel on `jump_handle` toward `host:port` and runs
/// the device handshake over it. The originator address is the jump host's
/// own private view of itself.
pub(super) async fn connect_via_jump(
    jump_handle: &SshHandle,
    jump: &JumpHost,
    host: &str,
    port: u16,
    credentials: &Credentials,
) -> Result<SshHandle, GatewayError> {
    let channel = timeout(
        CHANNEL_OPEN_TIMEOUT,
        jump_handle.channel_open_direct_tcpip(
            host,
            u32::from(port),
            &jump.private_host,
            u32::from(jump.private_port),
        ),
    )
    .await
    .map_err(|_| GatewayError::Channel {
        host: host.to_string(),
        message: format!(
            "jump-channel: {} did not open the channel within {CHANNEL_OPEN_TIMEOUT:?}",
            jump.name
        ),
    })?
    .map_err(|e| GatewayError::Channel {
        host: host.to_string(),
        message: format!("jump-channel: {e}"),
    })?;

    let config = client_config(DEVICE_KEEPALIVE);
    let mut handle = timeout(
        HANDSHAKE_TIMEOUT,
        client::connect_stream(config, channel.into_stream(), GateClientHandler),
    )
    .await
    .map_err(|_| GatewayError::Network {
        host: host.to_string(),
        message: format!("tunneled handshake did not complete within {HANDSHAKE_TIMEOUT:?}"),
    })?
    .map_err(|e| GatewayError::from_ssh(host, "device-handshake", e))?;

    authenticate(&mut handle, host, credentials).await?;
    debug!("{host}:{port} SSH session established via jump {}", jump.name);
    Ok(SshHandle::new(handle))
}

/// Password auth when a password is configured, otherwise public-key auth
/// with the configured key file.
async fn authenticate(
    handle: &mut client::Handle<GateClientHandler>,
    host: &str,
    credentials: &Credentials,
) -> Result<(), GatewayError> {
    let accepted = if let Some(password) = &credentials.password {
        handle
            .authenticate_password(credentials.user.as_str(), password.as_str())
            .await
            .map_err(|e| GatewayError::from_ssh(host, "device-auth", e))?
            .success()
    } else if let Some(key_file) = &credentials.key_file {
        let key = russh::keys::load_secret_key(key_file, None).map_err(|e| {
            GatewayError::Unexpected {
                host: host.to_string(),
                message: format!("cannot load private key: {e}"),
            }
        })?;
        handle
            .authenticate_publickey(
                credentials.user.as_str(),
                PrivateKeyWithHashAlg::new(Arc::new(key), None),
            )
            .await
            .map_err(|e| GatewayError::from_ssh(host, "device-auth", e))?
            .success()
    } else {
        return Err(GatewayError::NoCredentials {
            host: host.to_string(),
        });
    };

    if accepted {
        Ok(())
    } else {
        Err(GatewayError::Auth {
            host: host.to_string(),
            user: credentials.user.clone(),
        })
    }
}

/// Liveness check for a pooled handle: the session task must still be
/// running and a keepalive round-trip must go through. A dead TCP peer that
/// never sent FIN fails the keepalive even though the handle looks open.
pub(super) async fn probe(handle: &SshHandle) -> bool {
    if handle.is_closed() {
        return false;
    }
    handle.send_keepalive(true).await.is_ok()
}

/// Best-effort disconnect; the handle is unusable afterwards either way.
pub(super) async fn close_handle(handle: &SshHandle) {
    let _ = handle
        .disconnect(Disconnect::ByApplication, "session closed", "en")
        .await;
}

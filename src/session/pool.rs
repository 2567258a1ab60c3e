use std::time::Instant;

use log::debug;
use russh::ChannelMsg;

use super::{connect, Credentials, SessionKey, SessionPool, SshHandle};
use crate::error::GatewayError;
use crate::inventory::{Device, JumpHost};

/// How a missing session for a key gets built.
enum Target<'a> {
    Direct {
        port: u16,
    },
    Jump {
        jump: &'a JumpHost,
    },
    Tunneled {
        jump: &'a JumpHost,
        via: &'a SshHandle,
        port: u16,
    },
}

impl SessionPool {
    /// Returns a live session for the device, creating or rebuilding it as
    /// needed. For a device behind a jump host the jump session is obtained
    /// first; a jump failure is propagated and the child is not attempted.
    pub async fn get_session(
        &self,
        device: &Device,
        jump: Option<&JumpHost>,
    ) -> Result<SshHandle, GatewayError> {
        let credentials = Credentials::for_device(device)?;
        match device.jump_ssh_name.as_deref() {
            Some(name) => {
                let jump = jump.filter(|j| j.name == name).ok_or_else(|| {
                    GatewayError::NotFound(format!("jump host {name}"))
                })?;
                let jump_handle = self
                    .get_or_create(
                        &SessionKey::jump(jump),
                        Target::Jump { jump },
                        &Credentials::for_jump(jump),
                    )
                    .await?;
                self.get_or_create(
                    &SessionKey::device(&device.host, name),
                    Target::Tunneled {
                        jump,
                        via: &jump_handle,
                        port: device.port,
                    },
                    &credentials,
                )
                .await
            }
            None => {
                self.get_or_create(
                    &SessionKey::device(&device.host, ""),
                    Target::Direct { port: device.port },
                    &credentials,
                )
                .await
            }
        }
    }

    /// Probe-or-rebuild under the entry lock.
    ///
    /// A caller may park on the entry lock behind another caller building or
    /// using the same session; that queue is the per-endpoint serialization.
    /// A present client is reused only if it passes the liveness probe and
    /// was built with the same credentials; otherwise it is closed and
    /// replaced. On creation failure the entry stays in the table with no
    /// client, so the next caller simply retries.
    async fn get_or_create(
        &self,
        key: &SessionKey,
        target: Target<'_>,
        credentials: &Credentials,
    ) -> Result<SshHandle, GatewayError> {
        let entry = self.entry(key).await;
        let mut state = entry.state.lock().await;

        if let Some(client) = state.client.clone() {
            let same_credentials = state.auth_digest == Some(credentials.digest());
            if same_credentials && connect::probe(&client).await {
                debug!("reusing active session for {}", key.host);
                state.last_activity = Instant::now();
                return Ok(client);
            }
            debug!("session for {} is stale, reconnecting", key.host);
            connect::close_handle(&client).await;
            state.client = None;
            state.auth_digest = None;
        }

        let client = match target {
            Target::Direct { port } => {
                connect::connect_direct(&key.host, port, credentials, connect::DEVICE_KEEPALIVE)
                    .await?
            }
            Target::Jump { jump } => {
                connect::connect_direct(
                    &jump.public_host,
                    jump.public_port,
                    credentials,
                    connect::JUMP_KEEPALIVE,
                )
                .await?
            }
            Target::Tunneled { jump, via, port } => {
                connect::connect_via_jump(via, jump, &key.host, port, credentials).await?
            }
        };

        state.client = Some(client.clone());
        state.auth_digest = Some(credentials.digest());
        state.last_activity = Instant::now();
        Ok(client)
    }

    /// Runs a command on an existing session and returns trimmed stdout and
    /// stderr. Never establishes a session: `get_session` must have been
    /// called first in the same request. Holding the entry lock across the
    /// whole execution serializes commands to one endpoint; different
    /// endpoints proceed in parallel.
    pub async fn execute(
        &self,
        host: &str,
        command: &str,
        jump_name: &str,
    ) -> Result<(String, String), GatewayError> {
        let key = SessionKey::device(host, jump_name);
        let entry = self.lookup(&key).await.ok_or_else(|| GatewayError::SessionMissing {
            host: host.to_string(),
        })?;
        let mut state = entry.state.lock().await;
        let client = state.client.as_ref().ok_or_else(|| GatewayError::SessionMissing {
            host: host.to_string(),
        })?;

        // A failure here does not tear the session down; the next
        // get_or_create probe decides its fate.
        let (stdout, stderr) = run_command(client, host, command).await?;
        state.last_activity = Instant::now();
        Ok((stdout, stderr))
    }

    /// Closes the session for `key` (if any) and removes the entry.
    pub async fn close(&self, key: &SessionKey) {
        if let Some(entry) = self.lookup(key).await {
            let mut state = entry.state.lock().await;
            if let Some(client) = state.client.take() {
                connect::close_handle(&client).await;
            }
            drop(state);
            self.remove_entry(key).await;
            debug!("closed session for {}", key.host);
        }
    }

    /// Closes every pooled session, children before jumps.
    pub async fn close_all(&self) {
        let entries = self.snapshot().await;
        for entry in entries.iter().filter(|e| !e.key.is_jump) {
            self.close(&entry.key).await;
        }
        for entry in entries.iter().filter(|e| e.key.is_jump) {
            self.close(&entry.key).await;
        }
    }
}

/// One exec round-trip: open a channel, run the command, drain stdout,
/// stderr, and exit status until the channel closes.
async fn run_command(
    client: &SshHandle,
    host: &str,
    command: &str,
) -> Result<(String, String), GatewayError> {
    let mut channel = client
        .channel_open_session()
        .await
        .map_err(|e| GatewayError::from_ssh(host, "exec", e))?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| GatewayError::from_ssh(host, "exec", e))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let Some(msg) = channel.wait().await else {
            break;
        };
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
            ChannelMsg::Close => break,
            _ => {}
        }
    }

    Ok((
        String::from_utf8_lossy(&stdout).trim_end().to_string(),
        String::from_utf8_lossy(&stderr).trim_end().to_string(),
    ))
}

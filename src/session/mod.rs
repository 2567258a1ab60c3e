//! SSH session pooling and command execution.
//!
//! This module keeps one long-lived SSH session per endpoint, serializes
//! command execution per session, probes liveness before reuse, and lets a
//! background reaper collect idle sessions. Devices behind a jump host get a
//! child session whose transport is a direct-tcpip channel on the jump's
//! session; the reaper keeps a jump alive for as long as any of its children
//! live.
//!
//! # Main Components
//!
//! - [`SessionPool`] - the keyed session table and its operations
//! - [`SessionKey`] - `(host, is_jump, jump_name)` identity of a pooled session
//! - [`reaper::spawn`] - background idle collection

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::inventory::{Device, JumpHost};

mod algo;
mod connect;
mod pool;
pub mod reaper;

pub use connect::GateClientHandler;

/// How long a device session may sit without activity before the reaper
/// closes it. Jump sessions have no timeout of their own; they live exactly
/// as long as their children.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default pause between reaper passes.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

/// Uniquely identifies a pooled session.
///
/// `jump_name` is empty for devices reached directly. A jump host's own
/// session uses `host = public_host` and `is_jump = true`. The name is part
/// of the key so a device reachable via two different jumps keeps two
/// independent child sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub host: String,
    pub is_jump: bool,
    pub jump_name: String,
}

impl SessionKey {
    /// Key for a device session (direct when `jump_name` is empty).
    pub fn device(host: &str, jump_name: &str) -> SessionKey {
        SessionKey {
            host: host.to_string(),
            is_jump: false,
            jump_name: jump_name.to_string(),
        }
    }

    /// Key for a jump host's own session.
    pub fn jump(jump: &JumpHost) -> SessionKey {
        SessionKey {
            host: jump.public_host.clone(),
            is_jump: true,
            jump_name: jump.name.clone(),
        }
    }
}

/// A live SSH connection to one endpoint. Clones share the same underlying
/// session, so handing one out does not fork the transport.
#[derive(Clone)]
pub struct SshHandle(Arc<russh::client::Handle<GateClientHandler>>);

impl SshHandle {
    fn new(handle: russh::client::Handle<GateClientHandler>) -> SshHandle {
        SshHandle(Arc::new(handle))
    }
}

impl std::ops::Deref for SshHandle {
    type Target = russh::client::Handle<GateClientHandler>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Debug for SshHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshHandle").finish_non_exhaustive()
    }
}

/// State owned by the per-entry lock: the client handle, the activity stamp,
/// and a digest of the credentials the client was built with.
pub(crate) struct SessionState {
    pub(crate) client: Option<SshHandle>,
    pub(crate) last_activity: Instant,
    pub(crate) auth_digest: Option<[u8; 32]>,
}

/// One slot in the session table.
///
/// The entry itself is insert-once per key; everything mutable sits behind
/// `state`. Holding `state` across SSH I/O is what serializes commands to a
/// single endpoint.
pub(crate) struct SessionEntry {
    pub(crate) key: SessionKey,
    pub(crate) state: Mutex<SessionState>,
}

impl SessionEntry {
    fn new(key: SessionKey) -> Arc<SessionEntry> {
        Arc::new(SessionEntry {
            key,
            state: Mutex::new(SessionState {
                client: None,
                last_activity: Instant::now(),
                auth_digest: None,
            }),
        })
    }
}

/// Credentials a session is (re)built with. The digest lets the pool notice
/// that a device was re-provisioned with different credentials and rebuild
/// instead of reusing a session authenticated under the old ones.
#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) user: String,
    pub(crate) password: Option<String>,
    pub(crate) key_file: Option<String>,
}

impl Credentials {
    pub(crate) fn for_device(device: &Device) -> Result<Credentials, GatewayError> {
        let user = device.user.clone().ok_or_else(|| GatewayError::NoCredentials {
            host: device.host.clone(),
        })?;
        if device.password.is_none() && device.key_file.is_none() {
            return Err(GatewayError::NoCredentials {
                host: device.host.clone(),
            });
        }
        Ok(Credentials {
            user,
            password: device.password.clone(),
            key_file: device.key_file.clone(),
        })
    }

    pub(crate) fn for_jump(jump: &JumpHost) -> Credentials {
        Credentials {
            user: jump.user.clone(),
            password: Some(jump.password.clone()),
            key_file: None,
        }
    }

    /// SHA-256 over user and secret material, compared on reuse.
    pub(crate) fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.user.as_bytes());
        hasher.update([0u8]);
        if let Some(password) = &self.password {
            hasher.update(password.as_bytes());
        }
        hasher.update([0u8]);
        if let Some(key_file) = &self.key_file {
            hasher.update(key_file.as_bytes());
        }
        hasher.finalize().into()
    }
}

/// Keyed table of live SSH sessions.
///
/// The table-level lock guards only insertion and removal of entries; it is
/// never held across I/O or across an entry lock acquisition that could
/// block. Each entry's own lock guards its client handle and is held across
/// probes, reconnects, and command execution.
pub struct SessionPool {
    entries: Mutex<HashMap<SessionKey, Arc<SessionEntry>>>,
    idle_timeout: Duration,
}

impl SessionPool {
    pub fn new(idle_timeout: Duration) -> SessionPool {
        SessionPool {
            entries: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub(crate) fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Number of pooled entries, including entries whose client is absent.
    pub async fn session_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether an entry exists for `key`.
    pub async fn has_session(&self, key: &SessionKey) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    /// Inserts an empty entry if the key is absent and returns the entry.
    /// The table lock is released before the caller touches the entry lock.
    pub(crate) async fn entry(&self, key: &SessionKey) -> Arc<SessionEntry> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(key.clone())
            .or_insert_with(|| SessionEntry::new(key.clone()))
            .clone()
    }

    /// Returns the entry for `key` without creating one.
    pub(crate) async fn lookup(&self, key: &SessionKey) -> Option<Arc<SessionEntry>> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Snapshot of the current key set with their entries.
    pub(crate) async fn snapshot(&self) -> Vec<Arc<SessionEntry>> {
        self.entries.lock().await.values().cloned().collect()
    }

    pub(crate) async fn remove_entry(&self, key: &SessionKey) {
        self.entries.lock().await.remove(key);
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        SessionPool::new(DEFAULT_IDLE_TIMEOUT)
    }
}

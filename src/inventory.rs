//! Device and jump-host inventory.
//!
//! The inventory is loaded once at startup from a JSON file and mutated only
//! through the management API, which rewrites the backing file atomically
//! (write to a temp file, then rename). Host and tag strings are opaque; no
//! normalization is applied. When a tag collides with a host, the host wins.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GatewayError;

fn default_port() -> u16 {
    22
}

/// A managed switch reachable over SSH, directly or through a jump host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Hostname or IP address; unique primary key.
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Path to a private key used when no password is configured.
    #[serde(default)]
    pub key_file: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the jump host this device is reached through, if any.
    #[serde(default)]
    pub jump_ssh_name: Option<String>,
    /// A device is addressable by any of its tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Device {
    /// The jump-host name used in session keys; empty for direct devices.
    pub fn jump_name(&self) -> &str {
        self.jump_ssh_name.as_deref().unwrap_or("")
    }
}

/// An intermediate SSH server that forwards TCP to devices via direct-tcpip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpHost {
    /// Unique primary key, referenced by `Device::jump_ssh_name`.
    pub name: String,
    /// Address the gateway dials directly.
    pub public_host: String,
    #[serde(default = "default_port")]
    pub public_port: u16,
    /// The jump host's own view of itself, used as the originator address
    /// when opening a direct-tcpip channel.
    pub private_host: String,
    #[serde(default = "default_port")]
    pub private_port: u16,
    pub user: String,
    pub password: String,
}

/// On-disk schema: two arrays, exactly what the loader reads back.
#[derive(Debug, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    jump_ssh_hosts: Vec<JumpHost>,
    #[serde(default)]
    hosts: Vec<Device>,
}

/// Process-wide device registry with a coarse reader/writer lock.
#[derive(Debug)]
pub struct Inventory {
    path: PathBuf,
    inner: RwLock<InventoryFile>,
}

impl Inventory {
    /// Loads the inventory file and verifies that every `jump_ssh_name`
    /// resolves to a configured jump host.
    pub fn load(path: &Path) -> Result<Inventory, GatewayError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Config(format!("cannot read {}: {e}", path.display())))?;
        let file: InventoryFile = serde_json::from_str(&raw)
            .map_err(|e| GatewayError::Config(format!("invalid JSON in {}: {e}", path.display())))?;

        for device in &file.hosts {
            if let Some(name) = &device.jump_ssh_name {
                if !file.jump_ssh_hosts.iter().any(|j| &j.name == name) {
                    return Err(GatewayError::Config(format!(
                        "device {} references unknown jump host '{name}'",
                        device.host
                    )));
                }
            }
        }

        info!(
            "loaded {} jump ssh hosts and {} devices from {}",
            file.jump_ssh_hosts.len(),
            file.hosts.len(),
            path.display()
        );
        Ok(Inventory {
            path: path.to_path_buf(),
            inner: RwLock::new(file),
        })
    }

    /// Builds an in-memory inventory that still rewrites `path` on mutation.
    pub fn from_parts(path: &Path, jump_hosts: Vec<JumpHost>, devices: Vec<Device>) -> Inventory {
        Inventory {
            path: path.to_path_buf(),
            inner: RwLock::new(InventoryFile {
                jump_ssh_hosts: jump_hosts,
                hosts: devices,
            }),
        }
    }

    /// Resolves a host or tag to a device. Exact host match wins over tags;
    /// tags are searched in device order.
    pub async fn resolve(&self, host_or_tag: &str) -> Option<Device> {
        let inner = self.inner.read().await;
        if let Some(device) = inner.hosts.iter().find(|d| d.host == host_or_tag) {
            return Some(device.clone());
        }
        inner
            .hosts
            .iter()
            .find(|d| d.tags.iter().any(|t| t == host_or_tag))
            .cloned()
    }

    /// Looks up a jump host by name.
    pub async fn find_jump(&self, name: &str) -> Option<JumpHost> {
        let inner = self.inner.read().await;
        inner.jump_ssh_hosts.iter().find(|j| j.name == name).cloned()
    }

    /// Snapshot of all devices, for the listing endpoint.
    pub async fn devices(&self) -> Vec<Device> {
        self.inner.read().await.hosts.clone()
    }

    /// Creates or replaces a device entry and rewrites the backing file.
    pub async fn upsert(&self, device: Device) -> Result<(), GatewayError> {
        let mut inner = self.inner.write().await;
        inner.hosts.retain(|d| d.host != device.host);
        inner.hosts.push(device);
        Self::save(&self.path, &inner)
    }

    /// Deletes the device addressed by host or tag and rewrites the backing
    /// file. Live SSH sessions to the device are left alone; the reaper
    /// collects them once idle.
    pub async fn remove(&self, host_or_tag: &str) -> Result<Device, GatewayError> {
        let mut inner = self.inner.write().await;
        let index = inner
            .hosts
            .iter()
            .position(|d| d.host == host_or_tag)
            .or_else(|| {
                inner
                    .hosts
                    .iter()
                    .position(|d| d.tags.iter().any(|t| t == host_or_tag))
            })
            .ok_or_else(|| GatewayError::NotFound(host_or_tag.to_string()))?;
        let removed = inner.hosts.remove(index);
        Self::save(&self.path, &inner)?;
        Ok(removed)
    }

    /// Rewrites the backing file with the two-array schema the loader reads.
    /// Writes to a sibling temp file first so a crash mid-write never leaves
    /// a truncated inventory behind.
    fn save(path: &Path, inner: &InventoryFile) -> Result<(), GatewayError> {
        let data = serde_json::to_string_pretty(inner)
            .map_err(|e| GatewayError::Config(format!("cannot serialize inventory: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)
            .map_err(|e| GatewayError::Config(format!("cannot write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, path)
            .map_err(|e| GatewayError::Config(format!("cannot replace {}: {e}", path.display())))?;
        Ok(())
    }
}

//! Background collection of idle sessions.
//!
//! The reaper wakes periodically, closes device sessions that have been
//! inactive for longer than the pool's idle timeout, and then closes jump
//! sessions with no surviving children. A jump host has no idle timeout of
//! its own; its lifetime is derived entirely from its children.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use tokio::task::JoinHandle;

use super::{SessionKey, SessionPool};

/// Spawns the reaper loop. Runs until the task is aborted or the process
/// exits; a pass never fails, so the loop never dies.
pub fn spawn(pool: Arc<SessionPool>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            pool.reap_once().await;
        }
    })
}

impl SessionPool {
    /// One reaping pass.
    ///
    /// Entry locks are taken non-blockingly: a busy entry is in use and by
    /// definition not idle, so it is skipped and counted as a surviving
    /// child. Children marked for close are excluded from the surviving
    /// count, which is what lets a jump whose last child just expired be
    /// closed in the same pass.
    pub async fn reap_once(&self) {
        let now = Instant::now();
        let idle_timeout = self.idle_timeout();
        let mut surviving_children: HashMap<String, usize> = HashMap::new();
        let mut expired: Vec<SessionKey> = Vec::new();

        for entry in self.snapshot().await {
            if entry.key.is_jump {
                continue;
            }
            let count_survivor = |map: &mut HashMap<String, usize>| {
                if !entry.key.jump_name.is_empty() {
                    *map.entry(entry.key.jump_name.clone()).or_default() += 1;
                }
            };
            match entry.state.try_lock() {
                Err(_) => count_survivor(&mut surviving_children),
                Ok(state) => {
                    if now.duration_since(state.last_activity) > idle_timeout {
                        expired.push(entry.key.clone());
                    } else if state.client.is_some() {
                        count_survivor(&mut surviving_children);
                    }
                }
            }
        }

        for key in expired {
            debug!("reaping idle session for {}", key.host);
            self.close(&key).await;
        }

        for entry in self.snapshot().await {
            if !entry.key.is_jump {
                continue;
            }
            let children = surviving_children
                .get(&entry.key.jump_name)
                .copied()
                .unwrap_or(0);
            if children == 0 {
                debug!(
                    "reaping jump session {} ({}), no children left",
                    entry.key.jump_name, entry.key.host
                );
                self.close(&entry.key).await;
            }
        }
    }
}

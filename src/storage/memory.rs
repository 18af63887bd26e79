// src/storage/memory.rs
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use crate::codec::{decode, DecodeError};
use crate::health::HealthTransition;
use crate::models::server::ServerEntry;

/// Servers beaconing from this address are keyed by name, so several local
/// test servers can share one loopback endpoint.
pub const LOOPBACK_IP: &str = "127.0.0.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Endpoint of an entry at the moment a sweep started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub key: String,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Applied(HealthTransition),
    Pruned,
    /// The entry now points at a different endpoint than the one probed.
    Stale,
    Missing,
}

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("failed to read server list: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to decode server list: {0}")]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectorySummary {
    pub servers: usize,
    pub healthy: usize,
}

/// The process-wide server directory.
///
/// Every read and write of an entry happens under its DashMap shard lock, so
/// readers never see a half-updated entry and health transitions are applied
/// to the stored record in place.
#[derive(Default)]
pub struct ServerDirectory {
    servers: DashMap<String, ServerEntry>,
}

impl ServerDirectory {
    pub fn new() -> Self {
        Self {
            servers: DashMap::new(),
        }
    }

    /// Canonical `ip:port` key.
    pub fn endpoint_key(ip: &str, port: u16) -> String {
        format!("{}:{}", ip, port)
    }

    /// Key used for beacon registrations: `ip:port`, or the server name for loopback servers.
    pub fn derive_key(ip: &str, port: u16, name: &str) -> String {
        if ip == LOOPBACK_IP {
            name.to_string()
        } else {
            Self::endpoint_key(ip, port)
        }
    }

    /// Inserts `entry`, or replaces the public fields of the entry already at
    /// `key` while keeping its health history.
    pub fn upsert(&self, key: String, entry: ServerEntry) -> UpsertOutcome {
        match self.servers.entry(key) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().merge_public_fields(entry);
                UpsertOutcome::Updated
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<ServerEntry> {
        self.servers.get(key).map(|r| r.value().clone())
    }

    /// Healthy entries only. Unhealthy ones stay in the directory but are not published.
    pub fn snapshot(&self) -> Vec<ServerEntry> {
        self.servers
            .iter()
            .filter(|r| r.value().is_healthy())
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.servers.len()
    }

    /// Both counts come from the same pass, so `healthy <= servers` always holds.
    pub fn summary(&self) -> DirectorySummary {
        self.servers.iter().fold(
            DirectorySummary { servers: 0, healthy: 0 },
            |mut summary, r| {
                summary.servers += 1;
                if r.value().is_healthy() {
                    summary.healthy += 1;
                }
                summary
            },
        )
    }

    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        self.servers
            .iter()
            .map(|r| ProbeTarget {
                key: r.key().clone(),
                ip: r.value().ip.clone(),
                port: r.value().port,
            })
            .collect()
    }

    /// Applies one probe result to the stored entry and deletes the entry if
    /// it has now been failing long enough to prune. Both happen under the
    /// same shard lock.
    pub fn record_probe(&self, target: &ProbeTarget, passed: bool) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::Missing;
        let removed = self.servers.remove_if_mut(&target.key, |_, entry| {
            if entry.ip != target.ip || entry.port != target.port {
                outcome = ProbeOutcome::Stale;
                return false;
            }
            let transition = if passed {
                entry.health.record_pass()
            } else {
                entry.health.record_failure()
            };
            outcome = ProbeOutcome::Applied(transition);
            entry.health.is_prunable()
        });

        match removed {
            Some(_) => ProbeOutcome::Pruned,
            None => outcome,
        }
    }

    /// Loads decoded entries, returning the resulting directory size.
    pub fn restore(&self, entries: HashMap<String, ServerEntry>) -> usize {
        for (key, entry) in entries {
            self.upsert(key, entry);
        }
        self.count()
    }

    /// Restores a previously published list. Nothing is loaded unless the
    /// whole file decodes.
    pub fn restore_from_file(&self, path: &Path) -> Result<usize, RestoreError> {
        let text = std::fs::read_to_string(path)?;
        let entries = decode(&text)?;
        Ok(self.restore(entries))
    }
}

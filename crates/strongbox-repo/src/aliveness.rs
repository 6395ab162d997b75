//! Aliveness cache for remote repositories
//!
//! Written by the heartbeat scheduler, read by group resolution. A remote
//! with no fresh record is unknown, and unknown remotes are not alive.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::time::Instant;

use strongbox_core::{RemoteRepositoriesConfiguration, RemoteRepository};

#[derive(Debug, Clone, Copy)]
struct AlivenessRecord {
    alive: bool,
    observed_at: Instant,
    checked_at: DateTime<Utc>,
}

/// Reported state of one remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlivenessStatus {
    pub url: String,
    pub alive: bool,
    pub last_checked: DateTime<Utc>,
}

/// TTL and size bounded map of remote URL to last probe result
///
/// Entries are sharded, so probes of different remotes never wait on each
/// other.
#[derive(Debug)]
pub struct RemoteRepositoryAlivenessTracker {
    entries: DashMap<String, AlivenessRecord>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for RemoteRepositoryAlivenessTracker {
    fn default() -> Self {
        Self::from_settings(&RemoteRepositoriesConfiguration::default())
    }
}

impl RemoteRepositoryAlivenessTracker {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_settings(settings: &RemoteRepositoriesConfiguration) -> Self {
        Self::new(settings.aliveness_ttl(), settings.aliveness_max_entries)
    }

    /// True only when a fresh probe reported the remote as reachable
    pub fn is_alive(&self, remote: &RemoteRepository) -> bool {
        self.fresh(&remote.cache_key()).is_some_and(|r| r.alive)
    }

    /// True when a fresh record exists, whatever its outcome
    pub fn was_checked(&self, remote: &RemoteRepository) -> bool {
        self.fresh(&remote.cache_key()).is_some()
    }

    /// Record a probe result observed now
    pub fn put(&self, remote: &RemoteRepository, alive: bool) {
        self.record(remote, alive, Instant::now());
    }

    /// Record a probe result observed at `observed_at`
    ///
    /// A record older than the one already stored is ignored, so the last
    /// completed probe wins even when writes arrive out of order. Returns
    /// whether the record was applied.
    pub fn record(&self, remote: &RemoteRepository, alive: bool, observed_at: Instant) -> bool {
        let key = remote.cache_key();
        let age = Instant::now().saturating_duration_since(observed_at);
        let checked_at = Utc::now()
            - chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::zero());
        let record = AlivenessRecord {
            alive,
            observed_at,
            checked_at,
        };

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.make_room();
        }

        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().observed_at > observed_at {
                    tracing::trace!(remote = %entry.key(), "Ignoring stale aliveness record");
                    return false;
                }
                let previous = entry.insert(record);
                if previous.alive != alive {
                    tracing::info!(remote = %entry.key(), alive, "Remote repository aliveness changed");
                }
            }
            Entry::Vacant(entry) => {
                tracing::debug!(remote = %entry.key(), alive, "Remote repository checked");
                entry.insert(record);
            }
        }
        true
    }

    /// Drop every expired record, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, record| !self.is_expired(record, now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh records sorted by URL
    pub fn snapshot(&self) -> Vec<AlivenessStatus> {
        let now = Instant::now();
        let mut statuses: Vec<AlivenessStatus> = self
            .entries
            .iter()
            .filter(|entry| !self.is_expired(entry.value(), now))
            .map(|entry| AlivenessStatus {
                url: entry.key().clone(),
                alive: entry.alive,
                last_checked: entry.checked_at,
            })
            .collect();
        statuses.sort_by(|a, b| a.url.cmp(&b.url));
        statuses
    }

    fn is_expired(&self, record: &AlivenessRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.observed_at) >= self.ttl
    }

    /// Record for `key` if present and not expired; expired ones are dropped
    fn fresh(&self, key: &str) -> Option<AlivenessRecord> {
        let now = Instant::now();
        let record = *self.entries.get(key)?;
        if !self.is_expired(&record, now) {
            return Some(record);
        }
        self.entries
            .remove_if(key, |_, record| self.is_expired(record, now));
        None
    }

    /// Evict expired records, then the oldest one if still full
    fn make_room(&self) {
        if self.purge_expired() > 0 && self.entries.len() < self.max_entries {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.observed_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::debug!(remote = %key, "Evicting oldest aliveness record");
            self.entries.remove(&key);
        }
    }
}

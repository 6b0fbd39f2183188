//! Server registration table.
//!
//! Holds one entry per live server: its rank and the monotonic instant of its
//! last contact. Ranks are handed out from a counter that only grows, so a
//! server evicted and later re-registered receives a new, higher rank.
//!
//! The table is plain data. Callers serialize access to it (the reference
//! service keeps it behind one mutex together with its logical clock), which
//! is what guarantees a single rank per name under concurrent first contact.

use std::{collections::HashMap, time::Duration};

use chorus_proto::payloads::ServerEntry;
use thiserror::Error;

/// Liveness timeout used by the reference deployment.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// First rank handed out.
pub const FIRST_RANK: u64 = 1;

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Server name was empty.
    #[error("server name must not be empty")]
    EmptyName,
}

/// Registry entry for one live server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration<I> {
    /// Rank assigned at first contact
    pub rank: u64,
    /// Monotonic instant of the most recent `rank` or `heartbeat`
    pub last_heartbeat: I,
}

/// Outcome of a `rank` or `heartbeat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAssignment {
    /// Rank held by the server
    pub rank: u64,
    /// True if this call created the entry
    pub first_contact: bool,
}

/// A server removed by [`Registry::sweep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eviction {
    /// Server name
    pub name: String,
    /// Rank it held
    pub rank: u64,
    /// Time since its last contact
    pub silent_for: Duration,
}

/// Rank and liveness table.
#[derive(Debug, Clone)]
pub struct Registry<I> {
    entries: HashMap<String, Registration<I>>,
    next_rank: u64,
    timeout: Duration,
}

impl<I> Registry<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    /// Create an empty registry with the given liveness timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { entries: HashMap::new(), next_rank: FIRST_RANK, timeout }
    }

    /// Liveness timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Return the rank of `name`, registering it if unseen.
    ///
    /// Looking up an existing entry does not refresh its liveness. Only
    /// first contact records `now`.
    pub fn rank(&mut self, name: &str, now: I) -> Result<RankAssignment, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        if let Some(entry) = self.entries.get(name) {
            return Ok(RankAssignment { rank: entry.rank, first_contact: false });
        }

        Ok(self.register(name, now))
    }

    /// Record liveness for `name`, registering it if unseen.
    pub fn heartbeat(&mut self, name: &str, now: I) -> Result<RankAssignment, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        if let Some(entry) = self.entries.get_mut(name) {
            entry.last_heartbeat = entry.last_heartbeat.max(now);
            return Ok(RankAssignment { rank: entry.rank, first_contact: false });
        }

        Ok(self.register(name, now))
    }

    fn register(&mut self, name: &str, now: I) -> RankAssignment {
        let rank = self.next_rank;
        self.next_rank = self.next_rank.saturating_add(1);
        self.entries.insert(name.to_string(), Registration { rank, last_heartbeat: now });
        RankAssignment { rank, first_contact: true }
    }

    /// Snapshot of all active servers, ordered by rank.
    pub fn list(&self) -> Vec<ServerEntry> {
        let mut list: Vec<ServerEntry> = self
            .entries
            .iter()
            .map(|(name, entry)| ServerEntry { name: name.clone(), rank: entry.rank })
            .collect();
        list.sort_by_key(|entry| entry.rank);
        list
    }

    /// Remove every entry silent for longer than the timeout.
    pub fn sweep(&mut self, now: I) -> Vec<Eviction> {
        let timeout = self.timeout;
        let mut evicted = Vec::new();

        self.entries.retain(|name, entry| {
            let silent_for = if now > entry.last_heartbeat {
                now - entry.last_heartbeat
            } else {
                Duration::ZERO
            };

            if silent_for > timeout {
                evicted.push(Eviction { name: name.clone(), rank: entry.rank, silent_for });
                false
            } else {
                true
            }
        });

        evicted.sort_by_key(|eviction| eviction.rank);
        evicted
    }

    /// Entry for `name`, if live.
    pub fn get(&self, name: &str) -> Option<&Registration<I>> {
        self.entries.get(name)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no server is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank the next first-seen server will receive.
    pub fn next_rank(&self) -> u64 {
        self.next_rank
    }
}

impl<I> Default for Registry<I>
where
    I: Copy + Ord + std::ops::Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::env::ManualInstant;

    fn at(secs: u64) -> ManualInstant {
        ManualInstant(Duration::from_secs(secs))
    }

    #[test]
    fn ranks_follow_first_seen_order() {
        let mut registry = Registry::default();

        let alpha = registry.rank("alpha", at(0)).unwrap();
        let beta = registry.rank("beta", at(0)).unwrap();
        let alpha_again = registry.rank("alpha", at(1)).unwrap();

        assert!(alpha.first_contact);
        assert!(!alpha_again.first_contact);
        assert_eq!(alpha.rank, alpha_again.rank);
        assert_ne!(alpha.rank, beta.rank);
        assert!(alpha.rank < beta.rank);
        assert_eq!(alpha.rank, FIRST_RANK);
    }

    #[test]
    fn heartbeat_registers_unseen_name() {
        let mut registry = Registry::default();
        let assignment = registry.heartbeat("gamma", at(0)).unwrap();

        assert!(assignment.first_contact);
        assert_eq!(registry.rank("gamma", at(1)).unwrap().rank, assignment.rank);
    }

    #[test]
    fn empty_name_leaves_table_unchanged() {
        let mut registry: Registry<ManualInstant> = Registry::default();

        assert_eq!(registry.rank("", at(0)), Err(RegistryError::EmptyName));
        assert_eq!(registry.heartbeat("", at(0)), Err(RegistryError::EmptyName));
        assert!(registry.is_empty());
        assert_eq!(registry.next_rank(), FIRST_RANK);
    }

    #[test]
    fn sweep_evicts_only_expired() {
        let mut registry = Registry::new(Duration::from_secs(30));
        registry.rank("stale", at(0)).unwrap();
        registry.rank("fresh", at(0)).unwrap();
        registry.heartbeat("fresh", at(25)).unwrap();

        assert!(registry.sweep(at(30)).is_empty(), "exactly at the timeout is still live");

        let evicted = registry.sweep(at(31));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].name, "stale");
        assert_eq!(evicted[0].silent_for, Duration::from_secs(31));

        let names: Vec<_> = registry.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["fresh".to_string()]);
    }

    #[test]
    fn rank_lookup_does_not_refresh_liveness() {
        let mut registry = Registry::new(Duration::from_secs(30));
        registry.rank("alpha", at(0)).unwrap();
        registry.rank("alpha", at(29)).unwrap();

        assert_eq!(registry.sweep(at(31)).len(), 1);
    }

    #[test]
    fn evicted_name_gets_a_higher_rank() {
        let mut registry = Registry::new(Duration::from_secs(30));
        let first = registry.rank("alpha", at(0)).unwrap().rank;
        registry.sweep(at(60));

        let second = registry.rank("alpha", at(61)).unwrap();
        assert!(second.first_contact);
        assert!(second.rank > first);
    }

    #[test]
    fn list_is_ordered_by_rank() {
        let mut registry = Registry::default();
        for name in ["delta", "alpha", "charlie", "bravo"] {
            registry.rank(name, at(0)).unwrap();
        }

        let ranks: Vec<_> = registry.list().into_iter().map(|e| e.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    proptest! {
        #[test]
        fn ranks_are_unique_per_live_name(names in prop::collection::vec("[a-e]{1,2}", 1..40)) {
            let mut registry = Registry::default();
            let mut seen = HashMap::new();

            for name in &names {
                let rank = registry.rank(name, at(0)).unwrap().rank;
                let previous = seen.entry(name.clone()).or_insert(rank);
                prop_assert_eq!(*previous, rank);
            }

            let mut ranks: Vec<_> = seen.values().copied().collect();
            ranks.sort_unstable();
            ranks.dedup();
            prop_assert_eq!(ranks.len(), seen.len());
        }

        #[test]
        fn heartbeating_within_timeout_survives(beats in prop::collection::vec(1u64..30, 1..50)) {
            let mut registry = Registry::new(Duration::from_secs(30));
            let mut now = 0;
            registry.rank("steady", at(now)).unwrap();

            for gap in beats {
                now += gap;
                prop_assert!(registry.sweep(at(now)).is_empty());
                registry.heartbeat("steady", at(now)).unwrap();
            }

            prop_assert_eq!(registry.len(), 1);
        }
    }
}

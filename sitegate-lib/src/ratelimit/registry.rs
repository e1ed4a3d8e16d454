use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::debug;
use tokio::time::Instant;

use crate::ratelimit::{GateConfig, Host, HostKey, HostStats, HostStatsMap};

/// Concurrency-safe map from host to its shared [`Host`] state.
///
/// Entries are created lazily on first use. Lookups and updates of
/// different hosts only contend on `DashMap` shard locks, never on a
/// single global lock, and the per-host read-modify-write happens under
/// the host's own mutex.
#[derive(Debug, Default)]
pub(crate) struct HostRegistry {
    hosts: DashMap<HostKey, Arc<Host>>,
}

impl HostRegistry {
    /// Return the single shared state for `key`, creating it on first access.
    ///
    /// The boolean is `true` if this call created the entry.
    pub(crate) fn get_or_create(&self, key: HostKey, now: Instant) -> (Arc<Host>, bool) {
        if let Some(host) = self.hosts.get(&key) {
            return (host.clone(), false);
        }

        // Handle the race where another caller created it in the meantime
        match self.hosts.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let host = Arc::new(Host::new(entry.key().clone(), now));
                (entry.insert(host).clone(), true)
            }
        }
    }

    /// Look up a host without creating it
    pub(crate) fn get(&self, key: &HostKey) -> Option<Arc<Host>> {
        self.hosts.get(key).map(|host| host.clone())
    }

    /// Drop every host which is idle and not referenced by an in-flight caller.
    ///
    /// Returns the number of evicted hosts. Dropping an idle host is never
    /// observable: a recreated entry computes the same start instant.
    pub(crate) fn sweep_idle(&self, now: Instant, config: &GateConfig) -> usize {
        let before = self.hosts.len();
        self.hosts.retain(|key, host| {
            // The map itself holds one reference
            let in_use = Arc::strong_count(host) > 1;
            let keep = in_use || !host.is_idle(now, config);
            if !keep {
                debug!("Evicting idle host {key}");
            }
            keep
        });
        before.saturating_sub(self.hosts.len())
    }

    /// Statistics of a single host, empty if it was never contacted
    pub(crate) fn host_stats(&self, key: &HostKey) -> HostStats {
        self.get(key).map(|host| host.stats()).unwrap_or_default()
    }

    /// Statistics of all currently known hosts
    pub(crate) fn all_host_stats(&self) -> HostStatsMap {
        self.hosts
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().stats()))
            .collect::<HashMap<_, _>>()
            .into()
    }

    pub(crate) fn len(&self) -> usize {
        self.hosts.len()
    }
}

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::key::HostKey;
use super::state::HostState;
use super::stats::HostStats;
use crate::ratelimit::GateConfig;

/// A single remote host and everything the gate remembers about it.
///
/// Each host maintains:
/// - The instant of its most recent gated start
/// - An optional Retry-After deadline announced by the server
/// - A rolling permit budget
/// - Statistics about how it has been paced
///
/// The state lock is only ever held for a short, synchronous
/// read-modify-write and never across an `.await`.
#[derive(Debug)]
pub struct Host {
    /// The hostname this instance manages
    pub key: HostKey,

    /// Pacing bookkeeping, see [`HostState`]
    state: Mutex<HostState>,

    /// Request statistics
    stats: Mutex<HostStats>,
}

impl Host {
    pub(crate) fn new(key: HostKey, now: Instant) -> Self {
        Self {
            key,
            state: Mutex::new(HostState::new(now)),
            stats: Mutex::new(HostStats::default()),
        }
    }

    /// Reserve the next start for this host and return when it may happen.
    ///
    /// Racing callers are serialized here, each one observing the
    /// reservation of the previous.
    pub(crate) fn reserve(&self, now: Instant, config: &GateConfig) -> Instant {
        self.state().reserve(now, config)
    }

    /// The active Retry-After deadline, if any
    #[must_use]
    pub fn cooldown_until(&self, now: Instant) -> Option<Instant> {
        self.state().cooldown_until(now)
    }

    /// Forbid new starts against this host for `duration` from `now`
    pub fn set_retry_after(&self, now: Instant, duration: Duration) {
        self.state().set_retry_after(now, duration);
    }

    /// Number of starts currently counted against the permit budget
    #[must_use]
    pub fn permits_in_use(&self) -> usize {
        self.state().permits_in_use()
    }

    pub(crate) fn is_idle(&self, now: Instant, config: &GateConfig) -> bool {
        self.state().is_idle(now, config)
    }

    /// Get a snapshot of the statistics for this host
    #[must_use]
    pub fn stats(&self) -> HostStats {
        self.stats_mut().clone()
    }

    pub(crate) fn record_start(&self, waited: Duration) {
        self.stats_mut().record_start(waited);
    }

    pub(crate) fn record_response(&self, status_code: u16) {
        self.stats_mut().record_response(status_code);
    }

    pub(crate) fn record_rate_limit(&self) {
        self.stats_mut().record_rate_limit();
    }

    pub(crate) fn record_retry(&self) {
        self.stats_mut().record_retry();
    }

    // Poisoned locks are recovered, the guarded data is plain bookkeeping
    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stats_mut(&self) -> MutexGuard<'_, HostStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

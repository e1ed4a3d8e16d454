use std::time::Duration;

use tokio::time::Instant;

use super::window::PermitWindow;
use crate::ratelimit::GateConfig;

/// Mutable pacing bookkeeping of a single host.
///
/// Every method takes `now` explicitly so that callers decide which clock
/// is used. All instants are [`tokio::time::Instant`]s.
#[derive(Debug, Clone)]
pub(crate) struct HostState {
    /// Reserved start of the most recent gated action
    last_request_at: Option<Instant>,
    /// No action may start before this instant
    retry_after_until: Option<Instant>,
    /// Starts counted against the permit budget
    window: PermitWindow,
    /// Last time anybody touched this host
    last_activity: Instant,
}

impl HostState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            last_request_at: None,
            retry_after_until: None,
            window: PermitWindow::default(),
            last_activity: now,
        }
    }

    /// Compute the instant at which the next action may start and reserve it.
    ///
    /// The returned instant is the latest of
    /// - the previous start plus `min_spacing`,
    /// - an active Retry-After deadline,
    /// - the first instant at which the permit window has room again.
    ///
    /// The reservation is recorded immediately, so the next caller computes
    /// its own start relative to this one, even before anybody has slept.
    pub(crate) fn reserve(&mut self, now: Instant, config: &GateConfig) -> Instant {
        self.last_activity = now;

        let mut ready_at = now;
        if let Some(last) = self.last_request_at {
            ready_at = ready_at.max(add_or_far_future(last, config.min_spacing));
        }
        if let Some(until) = self.cooldown_until(now) {
            ready_at = ready_at.max(until);
        }
        let ready_at = self.window.next_free(ready_at, config.permits, config.period);

        self.last_request_at = Some(ready_at);
        self.window.record(ready_at, config.period);
        ready_at
    }

    /// The active Retry-After deadline, if it lies in the future
    #[must_use]
    pub(crate) fn cooldown_until(&self, now: Instant) -> Option<Instant> {
        self.retry_after_until.filter(|&until| until > now)
    }

    /// Forbid any start for `duration` from `now`.
    ///
    /// An existing deadline which lies further ahead is kept.
    pub(crate) fn set_retry_after(&mut self, now: Instant, duration: Duration) {
        self.last_activity = now;
        let until = add_or_far_future(now, duration);
        self.retry_after_until = Some(match self.retry_after_until {
            Some(existing) => existing.max(until),
            None => until,
        });
    }

    /// Whether nothing recorded here can delay a future start anymore and
    /// the host has not been used for at least `idle_timeout`.
    #[must_use]
    pub(crate) fn is_idle(&self, now: Instant, config: &GateConfig) -> bool {
        if now.saturating_duration_since(self.last_activity) < config.idle_timeout {
            return false;
        }
        if self.cooldown_until(now).is_some() {
            return false;
        }
        self.last_request_at
            .is_none_or(|last| add_or_far_future(last, config.memory()) <= now)
    }

    /// Number of starts still counted against the permit budget
    #[must_use]
    pub(crate) fn permits_in_use(&self) -> usize {
        self.window.len()
    }
}

/// `at + duration`, saturating at [`far_future`]
pub(super) fn add_or_far_future(at: Instant, duration: Duration) -> Instant {
    at.checked_add(duration).unwrap_or_else(far_future)
}

/// An instant far enough ahead to act as "forever" without overflowing
fn far_future() -> Instant {
    // Roughly 30 years, the same bound tokio uses for its own timers
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

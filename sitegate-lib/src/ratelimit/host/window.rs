use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::state::add_or_far_future;

/// A rolling window of reserved start instants for one host.
///
/// At most `permits` starts may fall into any interval of length `period`.
/// Starts are always reserved in non-decreasing order, so the deque stays
/// sorted and the oldest entry sits at the front.
#[derive(Debug, Clone, Default)]
pub(crate) struct PermitWindow {
    starts: VecDeque<Instant>,
}

impl PermitWindow {
    /// Drop every start which no longer counts at `now`
    fn expire(&mut self, now: Instant, period: Duration) {
        while let Some(&oldest) = self.starts.front() {
            if add_or_far_future(oldest, period) <= now {
                self.starts.pop_front();
            } else {
                break;
            }
        }
    }

    /// Earliest instant at or after `candidate` at which one more start fits
    /// into the window.
    ///
    /// `permits` may have shrunk since older starts were recorded, so the
    /// window may hold more entries than currently allowed.
    #[must_use]
    pub(crate) fn next_free(&mut self, candidate: Instant, permits: u32, period: Duration) -> Instant {
        self.expire(candidate, period);

        let permits = usize::try_from(permits.max(1)).unwrap_or(usize::MAX);
        if self.starts.len() < permits {
            return candidate;
        }

        // The start that has to leave the window before a new one fits
        let blocking = self.starts[self.starts.len() - permits];
        candidate.max(add_or_far_future(blocking, period))
    }

    /// Consume one permit for a start at `at`
    pub(crate) fn record(&mut self, at: Instant, period: Duration) {
        self.expire(at, period);
        self.starts.push_back(at);
    }

    /// Number of starts currently counted
    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.starts.len()
    }
}

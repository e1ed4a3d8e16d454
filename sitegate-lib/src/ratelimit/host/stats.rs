use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;
use tokio::time::Instant;

/// A [`HashMap`] mapping hosts to their [`HostStats`]
#[derive(Debug, Default, Serialize)]
pub struct HostStatsMap(HashMap<String, HostStats>);

impl HostStatsMap {
    /// Sort host statistics by request count (descending order)
    #[must_use]
    pub fn sorted(&self) -> Vec<(String, HostStats)> {
        let mut sorted_hosts: Vec<_> = self.0.clone().into_iter().collect();
        sorted_hosts.sort_by(|(a_host, a), (b_host, b)| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a_host.cmp(b_host))
        });
        sorted_hosts
    }

    /// Number of hosts with recorded statistics
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no host has been contacted yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HashMap<String, HostStats>> for HostStatsMap {
    fn from(value: HashMap<String, HostStats>) -> Self {
        Self(value)
    }
}

/// Record and report how a [`crate::ratelimit::Host`] has been paced
#[derive(Debug, Clone, Default)]
pub struct HostStats {
    /// Number of gated starts (actions and requests, retries included)
    pub total_requests: u64,
    /// Number of responses which asked us to back off
    pub rate_limited: u64,
    /// Number of bounded retries performed after a Retry-After
    pub retries: u64,
    /// Total time callers spent waiting for their turn
    pub total_wait: Duration,
    /// Longest single wait for a turn
    pub longest_wait: Duration,
    /// Timestamp of the last rate limit response
    pub last_rate_limit: Option<Instant>,
    /// Status code counts
    pub status_codes: HashMap<u16, u64>,
}

impl HostStats {
    /// Record a gated start which had to wait `waited` for its turn
    pub fn record_start(&mut self, waited: Duration) {
        self.total_requests += 1;
        self.total_wait += waited;
        self.longest_wait = self.longest_wait.max(waited);
    }

    /// Record the status of a response received through the gate
    pub fn record_response(&mut self, status_code: u16) {
        *self.status_codes.entry(status_code).or_insert(0) += 1;
    }

    /// Record a response that carried a Retry-After we honored
    pub fn record_rate_limit(&mut self) {
        self.rate_limited += 1;
        self.last_rate_limit = Some(Instant::now());
    }

    /// Record a bounded retry
    pub const fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Get average wait per start
    #[must_use]
    pub fn average_wait(&self) -> Option<Duration> {
        if self.total_requests == 0 {
            return None;
        }
        let starts = u32::try_from(self.total_requests).unwrap_or(u32::MAX);
        Some(self.total_wait / starts)
    }

    /// Check if this host has asked us to back off recently
    #[must_use]
    pub fn is_currently_rate_limited(&self) -> bool {
        self.last_rate_limit
            .is_some_and(|last| last.elapsed() < Duration::from_secs(60))
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        let avg_wait = self
            .average_wait()
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));

        format!(
            "{} requests ({} rate limited, {} retried), avg wait: {}",
            self.total_requests, self.rate_limited, self.retries, avg_wait
        )
    }
}

impl Serialize for HostStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let average_wait_ms = self.average_wait().map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("HostStats", 6)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("rate_limited", &self.rate_limited)?;
        s.serialize_field("retries", &self.retries)?;
        s.serialize_field("average_wait_ms", &average_wait_ms)?;
        s.serialize_field("longest_wait_ms", &self.longest_wait.as_millis())?;
        s.serialize_field("status_codes", &self.status_codes)?;
        s.end()
    }
}

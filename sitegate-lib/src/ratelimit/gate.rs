use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use http::header::RETRY_AFTER;
use log::{debug, info, warn};
use reqwest::{Request, Response};
use tokio::time::{Instant, sleep_until};

use super::headers::{is_rate_limit_status, parse_retry_after};
use super::registry::HostRegistry;
use crate::chain::Next;
use crate::ratelimit::{ConfigFeed, GateConfig, Host, HostKey, HostStats, HostStatsMap};
use crate::Result;

/// Paces work against remote hosts and honors their requests to back off.
///
/// The gate is the single coordinator for every host the process talks to.
/// Before anything starts against a host, the caller is suspended until
///
/// - `min_spacing` has passed since the previous start on that host,
/// - a Retry-After deadline announced by the host has passed, and
/// - the host's permit budget has room for one more start.
///
/// Callers for different hosts never wait for each other. The order in which
/// concurrent callers for one host are released is not specified, only their
/// spacing is.
///
/// Cloning a gate is cheap and yields a handle to the same state.
///
/// # Examples
///
/// ```
/// use sitegate_lib::ratelimit::PolitenessGate;
///
/// # #[tokio::main]
/// # async fn main() {
/// let gate = PolitenessGate::default();
/// let chapter = gate
///     .await_then_run("novels.example.com", || async { "chapter 1" })
///     .await;
/// assert_eq!(chapter, "chapter 1");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PolitenessGate {
    /// Per-host state, created on demand
    registry: Arc<HostRegistry>,

    /// Live configuration
    feed: ConfigFeed,

    /// When idle hosts were last swept out of the registry
    last_sweep: Arc<Mutex<Instant>>,
}

impl Default for PolitenessGate {
    fn default() -> Self {
        Self::with_feed(ConfigFeed::default())
    }
}

impl PolitenessGate {
    /// Create a gate with a fixed starting configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: GateConfig) -> Result<Self> {
        Ok(Self::with_feed(ConfigFeed::new(config)?))
    }

    /// Create a gate driven by an existing configuration feed
    #[must_use]
    pub fn with_feed(feed: ConfigFeed) -> Self {
        Self {
            registry: Arc::new(HostRegistry::default()),
            feed,
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// The feed this gate reads its configuration from.
    ///
    /// Updates pushed into it apply to every subsequent start.
    #[must_use]
    pub const fn config_feed(&self) -> &ConfigFeed {
        &self.feed
    }

    /// Wait for the turn of `host`, then run `action` and return its result.
    ///
    /// Failures of the action are returned unchanged and never retried.
    pub async fn await_then_run<K, F, Fut, T>(&self, host: K, action: F) -> T
    where
        K: Into<HostKey>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let host = self.host(host.into());
        self.wait_turn(&host).await;
        action().await
    }

    /// Send `request` down the rest of the pipeline once it is the turn of
    /// its host.
    ///
    /// If the host answers with 429, 503 or 301 together with a `Retry-After`
    /// header, the cooldown is recorded and the request is sent exactly one
    /// more time after it. Whatever the retry returns is final, even if it is
    /// rate limited again.
    ///
    /// # Errors
    ///
    /// Returns an error if the request URL has no host, or if sending fails.
    pub async fn await_then_proceed(&self, request: Request, next: Next<'_>) -> Result<Response> {
        let host = self.host(HostKey::try_from(&request)?);

        // Requests with streaming bodies cannot be cloned
        let retry = request.try_clone();

        self.wait_turn(&host).await;
        let response = next.proceed(request).await?;
        host.record_response(response.status().as_u16());

        let Some(wait) = self.retry_after(&response) else {
            return Ok(response);
        };
        self.back_off(&host, wait);

        let Some(retry) = retry else {
            warn!(
                "Cannot retry request to {} after rate limiting: request body is not clonable",
                host.key
            );
            return Ok(response);
        };

        host.record_retry();
        self.wait_turn(&host).await;
        let response = next.proceed(retry).await?;
        host.record_response(response.status().as_u16());

        // No second retry, but later requests still honor the cooldown
        if let Some(wait) = self.retry_after(&response) {
            self.back_off(&host, wait);
        }
        Ok(response)
    }

    /// Forbid new starts against `host` for `duration` from now.
    ///
    /// Callers already waiting for their turn on that host wait for the
    /// cooldown too.
    pub fn set_retry_after<K: Into<HostKey>>(&self, host: K, duration: Duration) {
        let host = self.host(host.into());
        host.set_retry_after(Instant::now(), duration);
        debug!("Host {} cooling down for {duration:?}", host.key);
    }

    /// Statistics of a single host, empty if it was never contacted
    #[must_use]
    pub fn host_stats<K: Into<HostKey>>(&self, host: K) -> HostStats {
        self.registry.host_stats(&host.into())
    }

    /// Statistics of every host currently tracked
    #[must_use]
    pub fn all_host_stats(&self) -> HostStatsMap {
        self.registry.all_host_stats()
    }

    /// Number of hosts currently tracked
    #[must_use]
    pub fn host_count(&self) -> usize {
        self.registry.len()
    }

    /// Evict every idle host right away and return how many were dropped.
    ///
    /// This also happens automatically while new hosts are added.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        *self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner) = now;
        self.registry.sweep_idle(now, &self.feed.current())
    }

    fn host(&self, key: HostKey) -> Arc<Host> {
        let now = Instant::now();
        let (host, created) = self.registry.get_or_create(key, now);
        if created {
            self.maybe_sweep(now);
        }
        host
    }

    /// Sweep at most once per idle timeout
    fn maybe_sweep(&self, now: Instant) {
        let config = self.feed.current();
        {
            let mut last_sweep = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.saturating_duration_since(*last_sweep) < config.idle_timeout {
                return;
            }
            *last_sweep = now;
        }

        let evicted = self.registry.sweep_idle(now, &config);
        if evicted > 0 {
            debug!("Evicted {evicted} idle host(s)");
        }
    }

    /// Suspend until `host` may start the next action, and claim that start.
    async fn wait_turn(&self, host: &Host) {
        let started = Instant::now();
        loop {
            let now = Instant::now();
            let ready_at = host.reserve(now, &self.feed.current());
            if ready_at > now {
                debug!(
                    "Waiting {:?} for turn on {} ({} permits in use)",
                    ready_at - now,
                    host.key,
                    host.permits_in_use()
                );
                sleep_until(ready_at).await;
            }

            // A cooldown may have been recorded while we were asleep
            match host.cooldown_until(Instant::now()) {
                Some(until) => debug!("Host {} started cooling down until {until:?}", host.key),
                None => break,
            }
        }
        host.record_start(started.elapsed());
    }

    /// The wait demanded by a rate-limited response, if any
    fn retry_after(&self, response: &Response) -> Option<Duration> {
        if !is_rate_limit_status(response.status()) {
            return None;
        }
        let value = response.headers().get(RETRY_AFTER)?;
        Some(parse_retry_after(value, SystemTime::now(), &self.feed.current()))
    }

    fn back_off(&self, host: &Host, wait: Duration) {
        host.set_retry_after(Instant::now(), wait);
        host.record_rate_limit();
        info!("Host {} asked to back off, waiting {wait:?}", host.key);
    }
}

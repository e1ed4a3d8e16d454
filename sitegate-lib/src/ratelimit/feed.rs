//! Live tunables of the gate.
//!
//! A [`ConfigFeed`] is an observable cell holding the current [`GateConfig`].
//! Settings screens, config file watchers or any other producer push new
//! values into it while the gate is running, and every later start
//! computation sees them. Nothing is restarted and no host state is reset.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use log::{debug, warn};
use tokio::sync::watch;

use crate::Result;
use crate::ratelimit::GateConfig;

/// A single change to one tunable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigUpdate {
    /// New minimum spacing between two starts on one host
    MinSpacing(Duration),
    /// New number of starts per period
    Permits(u32),
    /// New length of the permit period
    Period(Duration),
    /// New cap for server-provided Retry-After values
    MaxRetryAfter(Duration),
    /// New idle time after which hosts may be evicted
    IdleTimeout(Duration),
}

impl ConfigUpdate {
    fn apply_to(self, config: &mut GateConfig) {
        match self {
            Self::MinSpacing(d) => config.min_spacing = d,
            Self::Permits(p) => config.permits = p,
            Self::Period(d) => config.period = d,
            Self::MaxRetryAfter(d) => config.max_retry_after = d,
            Self::IdleTimeout(d) => config.idle_timeout = d,
        }
    }
}

/// Shared, observable [`GateConfig`].
///
/// Cloning a feed yields another handle to the same cell.
#[derive(Debug, Clone)]
pub struct ConfigFeed {
    sender: Arc<watch::Sender<GateConfig>>,
}

impl Default for ConfigFeed {
    fn default() -> Self {
        Self {
            sender: Arc::new(watch::Sender::new(GateConfig::default())),
        }
    }
}

impl ConfigFeed {
    /// Create a feed starting out with `config`
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not pass [`GateConfig::validate`]
    pub fn new(config: GateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sender: Arc::new(watch::Sender::new(config)),
        })
    }

    /// The configuration in effect right now
    #[must_use]
    pub fn current(&self) -> GateConfig {
        *self.sender.borrow()
    }

    /// Observe configuration changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GateConfig> {
        self.sender.subscribe()
    }

    /// Replace the whole configuration
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid, in which case the previous
    /// configuration stays in effect
    pub fn replace(&self, config: GateConfig) -> Result<()> {
        config.validate()?;
        self.sender.send_if_modified(|current| {
            let changed = *current != config;
            *current = config;
            changed
        });
        Ok(())
    }

    /// Apply a single change
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting configuration would be invalid,
    /// in which case nothing changes
    pub fn apply(&self, update: ConfigUpdate) -> Result<()> {
        let mut outcome = Ok(());
        self.sender.send_if_modified(|current| {
            let mut next = *current;
            update.apply_to(&mut next);
            if let Err(e) = next.validate() {
                outcome = Err(e);
                return false;
            }
            let changed = next != *current;
            *current = next;
            changed
        });
        outcome
    }

    /// Set the minimum spacing between starts on one host
    pub fn set_min_spacing(&self, min_spacing: Duration) {
        // Any spacing is valid, zero disables it
        let _ = self.apply(ConfigUpdate::MinSpacing(min_spacing));
    }

    /// Set the number of starts allowed per period
    ///
    /// # Errors
    ///
    /// Returns an error if `permits` is zero
    pub fn set_permits(&self, permits: u32) -> Result<()> {
        self.apply(ConfigUpdate::Permits(permits))
    }

    /// Set the length of the permit period
    ///
    /// # Errors
    ///
    /// Returns an error if `period` is zero
    pub fn set_period(&self, period: Duration) -> Result<()> {
        self.apply(ConfigUpdate::Period(period))
    }

    /// Apply every update of `updates` until the stream ends.
    ///
    /// Invalid updates are logged and skipped. Only the latest value
    /// matters: an update replaced before any start observed it is simply
    /// never seen.
    pub async fn follow<S>(&self, updates: S)
    where
        S: Stream<Item = ConfigUpdate>,
    {
        let mut updates = std::pin::pin!(updates);
        while let Some(update) = updates.next().await {
            match self.apply(update) {
                Ok(()) => debug!("Applied configuration update {update:?}"),
                Err(e) => warn!("Ignoring configuration update {update:?}: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_feed_starts_with_defaults() {
        let feed = ConfigFeed::default();
        assert_eq!(feed.current(), GateConfig::default());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = GateConfig {
            permits: 0,
            ..GateConfig::default()
        };
        assert_eq!(ConfigFeed::new(config).unwrap_err(), ErrorKind::InvalidPermits(0));
    }

    #[test]
    fn test_setters_update_current() {
        let feed = ConfigFeed::default();
        feed.set_min_spacing(Duration::from_millis(300));
        feed.set_permits(12).unwrap();
        feed.set_period(Duration::from_secs(30)).unwrap();

        let config = feed.current();
        assert_eq!(config.min_spacing, Duration::from_millis(300));
        assert_eq!(config.permits, 12);
        assert_eq!(config.period, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_update_keeps_previous_value() {
        let feed = ConfigFeed::default();
        assert_eq!(feed.set_permits(0), Err(ErrorKind::InvalidPermits(0)));
        assert_eq!(
            feed.set_period(Duration::ZERO),
            Err(ErrorKind::InvalidPeriod(Duration::ZERO))
        );
        assert_eq!(
            feed.apply(ConfigUpdate::MaxRetryAfter(Duration::ZERO)),
            Err(ErrorKind::InvalidMaxRetryAfter(Duration::ZERO))
        );
        assert_eq!(feed.current(), GateConfig::default());
    }

    #[test]
    fn test_clones_share_the_cell() {
        let feed = ConfigFeed::default();
        let other = feed.clone();
        other.set_min_spacing(Duration::ZERO);
        assert_eq!(feed.current().min_spacing, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let feed = ConfigFeed::default();
        let mut receiver = feed.subscribe();

        feed.set_permits(7).unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow_and_update().permits, 7);

        // Setting the same value again is not a change
        feed.set_permits(7).unwrap();
        assert!(!receiver.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_follow_applies_stream_and_skips_invalid() {
        let feed = ConfigFeed::default();
        let updates = stream::iter(vec![
            ConfigUpdate::MinSpacing(Duration::from_millis(500)),
            ConfigUpdate::Permits(0),
            ConfigUpdate::Permits(3),
            ConfigUpdate::Period(Duration::from_secs(10)),
        ]);

        feed.follow(updates).await;

        let config = feed.current();
        assert_eq!(config.min_spacing, Duration::from_millis(500));
        assert_eq!(config.permits, 3);
        assert_eq!(config.period, Duration::from_secs(10));
    }
}

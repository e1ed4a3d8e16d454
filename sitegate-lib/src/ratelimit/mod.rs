//! Per-host request pacing and server-directed backoff.
//!
//! This module keeps a process from hammering any single remote host. Every
//! start of work against a host is spaced out from the previous one, bounded
//! by a rolling permit budget, and delayed while the host has asked us to back
//! off via `Retry-After`.
//!
//! # Architecture
//!
//! - [`HostKey`]: Represents a hostname for pacing
//! - [`Host`]: Pacing state and statistics of a single host
//! - [`PolitenessGate`]: Coordinates all hosts and suspends callers until their turn
//! - [`GateInterceptor`]: Installs the gate into a request [`crate::chain::Pipeline`]
//! - [`GateConfig`] and [`ConfigFeed`]: Live configuration shared by every host
//! - [`HostStats`]: Statistics tracking for each host

mod config;
mod feed;
mod gate;
mod headers;
mod host;
mod interceptor;
mod registry;

pub use config::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_RETRY_AFTER, DEFAULT_MIN_SPACING, DEFAULT_PERIOD,
    DEFAULT_PERMITS, GateConfig,
};
pub use feed::{ConfigFeed, ConfigUpdate};
pub use gate::PolitenessGate;
pub use host::{Host, HostKey, HostStats, HostStatsMap};
pub use interceptor::GateInterceptor;

#![allow(clippy::module_inception)]

mod host;
mod key;
mod state;
mod stats;
mod window;

pub use host::Host;
pub use key::HostKey;
pub use stats::{HostStats, HostStatsMap};

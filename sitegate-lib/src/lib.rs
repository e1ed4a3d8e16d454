//! `sitegate` keeps HTTP clients polite towards the sites they scrape.
//!
//! Every request to a host is spaced out from the previous one, limited by a
//! rolling permit budget, and held back while the host has asked for a break
//! via `Retry-After`. A rate-limited request is retried exactly once.
//!
//! "Hello world" example:
//! ```no_run
//! use sitegate_lib::{ClientBuilder, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!   let client = ClientBuilder::default().client()?;
//!   let response = client.get("https://example.com/chapter/1").await?;
//!   println!("{}", response.status());
//!   Ok(())
//! }
//! ```
//!
//! Work which isn't a plain HTTP request can be paced with the gate directly:
//!
//! ```
//! use sitegate_lib::ratelimit::{GateConfig, PolitenessGate};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> sitegate_lib::Result<()> {
//!   let gate = PolitenessGate::new(GateConfig {
//!       min_spacing: Duration::from_millis(10),
//!       ..GateConfig::default()
//!   })?;
//!   let pages = gate.await_then_run("example.com", || async { 42 }).await;
//!   assert_eq!(pages, 42);
//!   Ok(())
//! }
//! ```
// #![deny(missing_docs)]

mod client;
mod types;

pub mod chain;
pub mod ratelimit;

pub use client::{
    Client, ClientBuilder, DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
pub use types::*;

use crate::options::{Config, HeaderMapExt};
use anyhow::{Context, Result};
use http::HeaderMap;
use sitegate_lib::ratelimit::{ConfigFeed, PolitenessGate};
use sitegate_lib::{Client, ClientBuilder};
use std::time::Duration;

/// Creates a client according to the command-line config
pub(crate) fn create(cfg: &Config) -> Result<Client> {
    let headers = HeaderMap::from_header_pairs(&cfg.header)?;

    let feed = ConfigFeed::new(cfg.gate_config()?)?;
    let gate = PolitenessGate::with_feed(feed);

    ClientBuilder::builder()
        .gate(gate)
        .user_agent(cfg.user_agent.clone())
        .custom_headers(headers)
        .max_redirects(cfg.max_redirects)
        .timeout(Duration::from_secs(cfg.timeout))
        .build()
        .client()
        .context("Failed to create request client")
}

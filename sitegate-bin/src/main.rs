//! `sitegate` fetches URLs politely.
//!
//! Requests to the same host are spaced out and limited per time window.
//! Whenever a host answers with `429 Too Many Requests`,
//! `503 Service Unavailable` or `301 Moved Permanently` together with a
//! `Retry-After` header, all further requests to that host wait until the
//! server is ready again. Requests to other hosts are not affected.
//!
//! The sitegate binary is a wrapper around sitegate-lib.
//!
//! Fetch a couple of pages:
//! ```sh
//! sitegate https://example.com/chapter/1 https://example.com/chapter/2
//! ```
//!
//! Be gentler with a slow site:
//! ```sh
//! sitegate --min-spacing 3s --permits 2 --period 10s https://example.com/
//! ```
//!
//! Print what the gate did per host:
//! ```sh
//! sitegate --host-stats https://example.com/ https://example.org/
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![warn(
    absolute_paths_not_starting_with_crate,
    rustdoc::invalid_html_tags,
    missing_copy_implementations,
    missing_debug_implementations,
    semicolon_in_expressions_from_macros,
    unreachable_pub,
    unused_extern_crates,
    variant_size_differences,
    clippy::missing_const_for_fn
)]
#![deny(anonymous_parameters, macro_use_extern_crate)]
#![deny(missing_docs)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use futures::StreamExt;
use log::error;
#[cfg(feature = "native-tls")]
use openssl_sys as _; // required for vendored-openssl feature
use tokio::time::Instant;

use sitegate_lib::Client;

mod client;
mod host_stats;
mod logging;
mod options;
mod verbosity;

use crate::host_stats::HostStatsTable;
use crate::logging::init_logging;
use crate::options::{Config, SITEGATE_CONFIG_FILE, SitegateOptions};
use crate::verbosity::Verbosity;

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to `main()`
    // using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    FetchFailure = 2,
    ConfigFile = 3,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be run,
    // therefore we wrap the main code in another function to ensure that.
    let exit_code = run_main()?;
    std::process::exit(exit_code);
}

/// Merge all provided config options into one.
/// This includes a potential config file and command-line arguments.
fn load_config() -> Result<SitegateOptions> {
    let mut opts = SitegateOptions::parse();

    // Load a potentially existing config file and merge it into the config from
    // the CLI
    if let Some(config_file) = &opts.config_file {
        match Config::load_from_file(config_file) {
            Ok(c) => opts.config.merge(c),
            Err(e) => {
                bail!(
                    "Cannot load configuration file `{}`: {e:?}",
                    config_file.display()
                );
            }
        }
    } else {
        // Without an explicit config file, a `sitegate.toml` in the current
        // directory is picked up. An invalid default file is still an error.
        let default_config = PathBuf::from(SITEGATE_CONFIG_FILE);
        if default_config.is_file() {
            match Config::load_from_file(&default_config) {
                Ok(c) => opts.config.merge(c),
                Err(e) => {
                    bail!(
                        "Cannot load default configuration file `{}`: {e:?}",
                        default_config.display()
                    );
                }
            }
        }
    }

    if opts.config.max_concurrency == 0 {
        bail!("`max_concurrency` must be at least 1");
    }
    opts.config.gate_config()?;

    // Only now the verbosity of a config file is known
    init_logging(&opts.config.verbose);

    Ok(opts)
}

fn run_main() -> Result<i32> {
    let opts = match load_config() {
        Ok(opts) => opts,
        Err(e) => {
            init_logging(&Verbosity::default());
            error!("Error while loading config: {e:#}");
            return Ok(ExitCode::ConfigFile as i32);
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(&opts))
}

/// Outcome of fetching a single URL
struct Fetched {
    url: String,
    elapsed: Duration,
    status: sitegate_lib::Result<http::StatusCode>,
}

async fn fetch(client: &Client, url: String) -> Fetched {
    let start = Instant::now();
    let status = client.get(&url).await.map(|response| response.status());
    Fetched {
        url,
        elapsed: start.elapsed(),
        status,
    }
}

/// Run sitegate on the given URLs
async fn run(opts: &SitegateOptions) -> Result<i32> {
    let client = client::create(&opts.config)?;

    let mut results = futures::stream::iter(opts.urls.iter().cloned())
        .map(|url| fetch(&client, url))
        .buffer_unordered(opts.config.max_concurrency);

    let mut failures = 0usize;
    while let Some(fetched) = results.next().await {
        let elapsed = humantime::format_duration(Duration::from_millis(
            u64::try_from(fetched.elapsed.as_millis()).unwrap_or(u64::MAX),
        ));
        match fetched.status {
            Ok(status) => println!("{} {} [{elapsed}]", status.as_u16(), fetched.url),
            Err(e) => {
                failures += 1;
                eprintln!("[ERROR] {} [{elapsed}]: {e}", fetched.url);
            }
        }
    }

    if opts.config.host_stats {
        print!("{}", HostStatsTable(client.gate().all_host_stats()));
    }

    let exit_code = if failures == 0 {
        ExitCode::Success
    } else {
        ExitCode::FetchFailure
    };
    Ok(exit_code as i32)
}

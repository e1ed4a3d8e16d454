use crate::verbosity::Verbosity;
use anyhow::{Context, Error, Result, anyhow};
use clap::{Parser, builder::TypedValueParser};
use const_format::{concatcp, formatcp};
use http::{
    HeaderMap,
    header::{HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer};
use sitegate_lib::ratelimit::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_RETRY_AFTER, GateConfig,
};
use sitegate_lib::{DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use std::collections::HashMap;
use std::path::Path;
use std::{fs, path::PathBuf, str::FromStr, time::Duration};

pub(crate) const SITEGATE_CONFIG_FILE: &str = "sitegate.toml";

const DEFAULT_MAX_CONCURRENCY: usize = 16;

// this exists because clap requires `&str` type values for defaults
// whereas serde expects owned `String` types
const MAX_CONCURRENCY_STR: &str = concatcp!(DEFAULT_MAX_CONCURRENCY);
const MAX_REDIRECTS_STR: &str = concatcp!(DEFAULT_MAX_REDIRECTS);
const TIMEOUT_STR: &str = concatcp!(DEFAULT_TIMEOUT_SECS);
// We use a custom help message here because we want to show the default
// value of the config file, but also be able to check if the user has
// provided a custom value. If they didn't, we won't throw an error if
// the file doesn't exist.
const HELP_MSG_CONFIG_FILE: &str = formatcp!(
    "Configuration file to use\n\n[default: {}]",
    SITEGATE_CONFIG_FILE,
);

// Macro for generating default functions to be used by serde
macro_rules! default_function {
    ( $( $name:ident : $T:ty = $e:expr; )* ) => {
        $(
            #[allow(clippy::missing_const_for_fn)]
            fn $name() -> $T {
                $e
            }
        )*
    };
}

// Generate the functions for serde defaults
default_function! {
    max_concurrency: usize = DEFAULT_MAX_CONCURRENCY;
    max_redirects: usize = DEFAULT_MAX_REDIRECTS;
    user_agent: String = DEFAULT_USER_AGENT.to_string();
    timeout: u64 = DEFAULT_TIMEOUT_SECS;
    verbosity: Verbosity = Verbosity::default();
}

// Macro for merging configuration values
macro_rules! fold_in {
    ($cli:ident , $toml:ident ; $ty:ident { $(..$ignore:ident,)* $( $key:ident : $default:expr, )* } ) => {
        if (false) {
            #[allow(dead_code, unused, clippy::diverging_sub_expression)]
            let _check_fold_in_exhaustivity = $ty {
                $($key: unreachable!(), )*
                $($ignore: unreachable!(), )*
            };
        };
        $(
            if $cli.$key == $default && $toml.$key != $default {
                $cli.$key = $toml.$key;
            }
        )*
    };
}

/// Parse a single header into a [`HeaderName`] and [`HeaderValue`]
///
/// Headers are expected to be in format `Header-Name: Header-Value`.
/// The header name and value are trimmed of whitespace.
///
/// If the header contains multiple colons, the part after the first colon is
/// considered the value.
///
/// # Errors
///
/// This fails if the header does not contain a `:` character or
/// if the header name contains non-ASCII characters.
fn parse_single_header(header: &str) -> Result<(HeaderName, HeaderValue)> {
    let parts: Vec<&str> = header.splitn(2, ':').collect();
    match parts.as_slice() {
        [name, value] => {
            let name = name.trim();
            let name = HeaderName::from_str(name)
                .map_err(|e| anyhow!("Unable to convert header name '{name}': {e}"))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|e| anyhow!("Unable to read value of header with name '{name}': {e}"))?;
            Ok((name, value))
        }
        _ => Err(anyhow!(
            "Invalid header format. Expected colon-separated string in the format 'HeaderName: HeaderValue'"
        )),
    }
}

/// Parses a single HTTP header into a tuple of (String, String)
///
/// This does NOT merge multiple headers into one.
#[derive(Clone, Debug)]
struct HeaderParser;

impl TypedValueParser for HeaderParser {
    type Value = (String, String);

    fn parse_ref(
        &self,
        _cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &std::ffi::OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let header_str = value.to_str().ok_or_else(|| {
            clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                "Header value contains invalid UTF-8",
            )
        })?;

        match parse_single_header(header_str) {
            Ok((name, value)) => {
                let Ok(value) = value.to_str() else {
                    return Err(clap::Error::raw(
                        clap::error::ErrorKind::InvalidValue,
                        "Header value contains invalid UTF-8",
                    ));
                };

                Ok((name.to_string(), value.to_string()))
            }
            Err(e) => Err(clap::Error::raw(
                clap::error::ErrorKind::InvalidValue,
                e.to_string(),
            )),
        }
    }
}

impl clap::builder::ValueParserFactory for HeaderParser {
    type Parser = HeaderParser;
    fn value_parser() -> Self::Parser {
        HeaderParser
    }
}

/// Extension trait for converting a Vec of header pairs to a `HeaderMap`
pub(crate) trait HeaderMapExt {
    /// Convert a collection of header key-value pairs to a `HeaderMap`
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error>;
}

impl HeaderMapExt for HeaderMap {
    fn from_header_pairs(headers: &[(String, String)]) -> Result<HeaderMap, Error> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| anyhow!("Invalid header name '{name}': {e}"))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| anyhow!("Invalid header value '{value}': {e}"))?;
            header_map.insert(header_name, header_value);
        }
        Ok(header_map)
    }
}

/// sitegate fetches URLs politely: requests to the same host are spaced out,
/// limited per time window, and paused whenever the host answers with a
/// `Retry-After` header.
///
/// sitegate is powered by sitegate-lib.
#[derive(Parser, Debug)]
#[command(version, about, next_display_order = None)]
pub(crate) struct SitegateOptions {
    /// URLs to fetch
    #[arg(
        name = "urls",
        required = true,
        long_help = "URLs to fetch. Requests to different hosts run concurrently,
requests to the same host are paced by the gate."
    )]
    pub(crate) urls: Vec<String>,

    /// Configuration file to use
    #[arg(short, long = "config")]
    #[arg(help = HELP_MSG_CONFIG_FILE)]
    pub(crate) config_file: Option<PathBuf>,

    #[clap(flatten)]
    pub(crate) config: Config,
}

// Custom deserializer function for the header field
fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = HashMap::<String, String>::deserialize(deserializer)?;
    Ok(map.into_iter().collect())
}

/// The main configuration for sitegate
#[derive(Parser, Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Verbose program output
    #[clap(flatten)]
    #[serde(default = "verbosity")]
    pub(crate) verbose: Verbosity,

    /// Minimum interval between two requests to the same host
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        long_help = "Minimum interval between two requests to the same host,
e.g. `500ms` or `2s`. `0s` disables the spacing, leaving only the permit budget.

[default: 1s]"
    )]
    #[serde(default, with = "humantime_serde")]
    pub(crate) min_spacing: Option<Duration>,

    /// Number of requests per host allowed within one `--period`
    #[arg(long, help = "Number of requests per host allowed within one period [default: 5]")]
    #[serde(default)]
    pub(crate) permits: Option<u32>,

    /// Length of the rolling permit window
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        help = "Length of the rolling permit window [default: 5s]"
    )]
    #[serde(default, with = "humantime_serde")]
    pub(crate) period: Option<Duration>,

    /// Upper bound for waits requested via `Retry-After`
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        help = "Upper bound for waits requested via Retry-After [default: 1h]"
    )]
    #[serde(default, with = "humantime_serde")]
    pub(crate) max_retry_after: Option<Duration>,

    /// Forget hosts which have been idle for this long
    ///
    /// Only available in the configuration file.
    #[arg(skip)]
    #[serde(default, with = "humantime_serde")]
    pub(crate) idle_timeout: Option<Duration>,

    /// Maximum number of concurrent requests
    #[arg(long, default_value = &MAX_CONCURRENCY_STR)]
    #[serde(default = "max_concurrency")]
    pub(crate) max_concurrency: usize,

    /// Maximum number of allowed redirects
    ///
    /// `0` disables redirects, which makes `301` responses visible.
    #[arg(short, long, default_value = &MAX_REDIRECTS_STR)]
    #[serde(default = "max_redirects")]
    pub(crate) max_redirects: usize,

    /// Website timeout in seconds from connect to response finished
    #[arg(short, long, default_value = &TIMEOUT_STR)]
    #[serde(default = "timeout")]
    pub(crate) timeout: u64,

    /// User agent
    #[arg(short, long, default_value = DEFAULT_USER_AGENT)]
    #[serde(default = "user_agent")]
    pub(crate) user_agent: String,

    /// Set custom header for requests
    #[arg(
        short = 'H',
        long = "header",
        value_parser = HeaderParser,
        value_name = "HEADER:VALUE",
        long_help = "Set custom header for requests

You can specify custom headers in the format 'Name: Value'. For example, 'Accept: text/html'.
Multiple headers can be specified by using the flag multiple times.
The specified headers are used for ALL requests which don't set them already."
    )]
    #[serde(default)]
    #[serde(deserialize_with = "deserialize_headers")]
    pub(crate) header: Vec<(String, String)>,

    /// Show per-host statistics at the end
    #[arg(long)]
    #[serde(default)]
    pub(crate) host_stats: bool,
}

impl Config {
    /// Special handling for merging headers
    ///
    /// Adds the headers from the config file in `toml`, but keeps the values
    /// of headers which were given on the command line. Header names are
    /// compared case-insensitively.
    fn merge_headers(&mut self, toml: &[(String, String)]) {
        let lowercase = |(name, value): &(String, String)| (name.to_lowercase(), value.clone());

        // Later entries win, so the command line goes last
        let merged_map: HashMap<_, _> = toml
            .iter()
            .map(lowercase)
            .chain(self.header.iter().map(lowercase))
            .collect();

        let mut header: Vec<_> = merged_map.into_iter().collect();
        header.sort();
        self.header = header;
    }

    /// Load configuration from a file
    pub(crate) fn load_from_file(path: &Path) -> Result<Config> {
        // Read configuration file
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).with_context(|| "Failed to parse configuration file")
    }

    /// Merge the configuration from TOML into the CLI configuration
    pub(crate) fn merge(&mut self, toml: Config) {
        // Special handling for headers before fold_in!
        self.merge_headers(&toml.header);

        // NOTE: if you see an error within this macro call, check to make sure that
        // that the fields provided to fold_in! match all the fields of the Config struct.
        fold_in! {
            // Destination and source configs
            self, toml;

            Config {
                // Keys which are handled outside of fold_in
                ..header,

                // Keys with defaults to assign
                host_stats: false,
                idle_timeout: None,
                max_concurrency: DEFAULT_MAX_CONCURRENCY,
                max_redirects: DEFAULT_MAX_REDIRECTS,
                max_retry_after: None,
                min_spacing: None,
                period: None,
                permits: None,
                timeout: DEFAULT_TIMEOUT_SECS,
                user_agent: DEFAULT_USER_AGENT,
                verbose: Verbosity::default(),
            }
        }
    }

    /// The pacing configuration described by these options
    ///
    /// # Errors
    ///
    /// Fails if the permit budget cannot admit a single request
    pub(crate) fn gate_config(&self) -> Result<GateConfig> {
        let config = GateConfig {
            max_retry_after: self.max_retry_after.unwrap_or(DEFAULT_MAX_RETRY_AFTER),
            idle_timeout: self.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT),
            ..GateConfig::from_options(self.min_spacing, self.permits, self.period)
        };
        config.validate().context("Invalid pacing configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_custom_headers() {
        assert_eq!(
            parse_single_header("accept:text/html").unwrap(),
            (
                HeaderName::from_static("accept"),
                HeaderValue::from_static("text/html")
            )
        );
    }

    #[test]
    fn test_parse_custom_header_multiple_colons() {
        assert_eq!(
            parse_single_header("referer: https://example.com/chapter/1").unwrap(),
            (
                HeaderName::from_static("referer"),
                HeaderValue::from_static("https://example.com/chapter/1")
            )
        );
    }

    #[test]
    fn test_parse_invalid_header() {
        assert!(parse_single_header("no-colon-here").is_err());
        assert!(parse_single_header("bad header: value").is_err());
    }

    #[test]
    fn test_header_map_from_pairs() {
        let headers = HeaderMap::from_header_pairs(&[(
            "Accept-Language".to_string(),
            "en".to_string(),
        )])
        .unwrap();
        assert_eq!(headers["accept-language"], "en");
    }

    #[test]
    fn test_verify_app() {
        use clap::CommandFactory;
        SitegateOptions::command().debug_assert();
    }

    #[test]
    fn test_cli_flags() {
        let opts = SitegateOptions::parse_from([
            "sitegate",
            "--min-spacing",
            "250ms",
            "--permits",
            "3",
            "--period",
            "10s",
            "-H",
            "Accept: text/html",
            "https://example.com",
        ]);

        assert_eq!(opts.urls, vec!["https://example.com"]);
        assert_eq!(opts.config.min_spacing, Some(Duration::from_millis(250)));
        assert_eq!(opts.config.permits, Some(3));
        assert_eq!(opts.config.period, Some(Duration::from_secs(10)));
        assert_eq!(
            opts.config.header,
            vec![("accept".to_string(), "text/html".to_string())]
        );
    }

    #[test]
    fn test_merge_prefers_cli_values() {
        let mut cli = SitegateOptions::parse_from([
            "sitegate",
            "--permits",
            "2",
            "-H",
            "Accept: text/cli",
            "https://example.com",
        ])
        .config;
        let toml: Config = toml::from_str(
            r#"
            min_spacing = "750ms"
            permits = 9
            max_concurrency = 4
            idle_timeout = "1m"

            verbose = "debug"

            [header]
            Accept-Language = "en"
            Accept = "text/file"
            "#,
        )
        .unwrap();

        cli.merge(toml);

        assert_eq!(cli.permits, Some(2));
        assert_eq!(cli.min_spacing, Some(Duration::from_millis(750)));
        assert_eq!(cli.max_concurrency, 4);
        assert_eq!(cli.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(cli.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(cli.verbose.log_level_filter(), log::LevelFilter::Debug);
        assert_eq!(
            cli.header,
            vec![
                ("accept".to_string(), "text/cli".to_string()),
                ("accept-language".to_string(), "en".to_string()),
            ]
        );
    }

    #[test]
    fn test_merge_headers_from_file_only() {
        let mut cli = SitegateOptions::parse_from(["sitegate", "https://example.com"]).config;
        let toml: Config = toml::from_str("[header]\nX-Reader = \"sitegate\"\n").unwrap();

        cli.merge(toml);

        assert_eq!(
            cli.header,
            vec![("x-reader".to_string(), "sitegate".to_string())]
        );
    }

    #[test]
    fn test_gate_config_rejects_zero_retry_after_limit() {
        let config = SitegateOptions::parse_from([
            "sitegate",
            "--max-retry-after",
            "0s",
            "https://example.com",
        ])
        .config;
        assert!(config.gate_config().is_err());
    }

    #[test]
    fn test_config_file_rejects_unknown_keys() {
        assert!(toml::from_str::<Config>("request_interval = \"1s\"").is_err());
    }

    #[test]
    fn test_gate_config_defaults() {
        let config = SitegateOptions::parse_from(["sitegate", "https://example.com"]).config;
        assert_eq!(config.gate_config().unwrap(), GateConfig::default());
    }

    #[test]
    fn test_gate_config_rejects_zero_permits() {
        let config =
            SitegateOptions::parse_from(["sitegate", "--permits", "0", "https://example.com"])
                .config;
        assert!(config.gate_config().is_err());
    }
}

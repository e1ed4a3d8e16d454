//! Interpretation of the `Retry-After` response header.
//!
//! A server may answer with either a number of seconds or an HTTP date.
//! Both forms are turned into the duration to wait from "now". Values which
//! cannot be understood never fail a request: they fall back to the
//! configured spacing, so a broken header still slows the host down without
//! stalling it forever.

use http::{HeaderValue, StatusCode};
use log::warn;
use regex::Regex;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};
use thiserror::Error;

use crate::ratelimit::GateConfig;

/// `delay-seconds` form, e.g. `120`
static DELAY_SECONDS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

/// RFC 1123 shape, e.g. `Fri, 15 May 2015 15:34:21 GMT`, with the zone
/// split off so that equivalent UTC spellings can be accepted
static RFC_1123: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<date>[A-Za-z]{3}, \d{1,2} [A-Za-z]{3} \d{4} \d{2}:\d{2}:\d{2}) (?P<zone>[A-Za-z]+)$")
        .unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Unsupported time zone '{0}'")]
    TimeZoneError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Status codes after which a `Retry-After` header is honored.
///
/// Besides the usual 429 and 503, some sites answer overload with a
/// `301` carrying `Retry-After`.
#[must_use]
pub(crate) fn is_rate_limit_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::MOVED_PERMANENTLY
    )
}

/// Parse the "Retry-After" header as specified per
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
///
/// Dates in the past yield [`Duration::ZERO`].
pub(crate) fn try_parse_retry_after(
    value: &str,
    now: SystemTime,
) -> Result<Duration, RetryAfterParseError> {
    let value = value.trim();

    if DELAY_SECONDS.is_match(value) {
        // All digits but too large for u64 is still a (very long) delay
        return Ok(value
            .parse::<u64>()
            .map_or(Duration::MAX, Duration::from_secs));
    }

    let date = match RFC_1123.captures(value) {
        Some(captures) => match &captures["zone"] {
            zone if zone.eq_ignore_ascii_case("GMT") || zone.eq_ignore_ascii_case("UTC") => {
                format!("{} GMT", &captures["date"])
            }
            zone => return Err(RetryAfterParseError::TimeZoneError(zone.into())),
        },
        // RFC 850 and asctime dates are obsolete, but still valid HTTP dates
        None => value.to_string(),
    };

    httpdate::parse_http_date(&date)
        .map(|at| {
            at.duration_since(now)
                // if date is in the past, we can use ZERO
                .unwrap_or(Duration::ZERO)
        })
        .map_err(|_| RetryAfterParseError::ValueError(value.into()))
}

/// Turn a `Retry-After` header into the wait it demands.
///
/// Parsed values are capped at [`GateConfig::max_retry_after`]. Malformed
/// values are logged and replaced by the configured spacing, which is never
/// zero.
#[must_use]
pub(crate) fn parse_retry_after(value: &HeaderValue, now: SystemTime, config: &GateConfig) -> Duration {
    let parsed = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)
        .and_then(|value| try_parse_retry_after(value, now));

    match parsed {
        Ok(wait) => wait.min(config.max_retry_after),
        Err(e) => {
            let fallback = config.fallback_retry_after();
            warn!("Ignoring malformed Retry-After header ({e}), waiting {fallback:?} instead");
            fallback
        }
    }
}

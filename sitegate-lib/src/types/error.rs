use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;

/// Possible errors when interacting with `sitegate_lib`
///
/// Note that rate limiting itself is never reported through this type.
/// A throttled caller simply waits longer, and a host that keeps answering
/// with a rate-limit status after the single retry is surfaced as that
/// final response.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Network error while sending a request through the pipeline
    #[error("Network error while trying to connect to an endpoint via reqwest")]
    NetworkRequest(#[source] reqwest::Error),

    /// Error while building the underlying HTTP client
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// An URL without a host was handed to the gate
    #[error("URL is missing a host")]
    InvalidUrlHost,

    /// The URL of a request could not be parsed
    #[error("Cannot parse `{0}` as URL: {1}")]
    ParseUrl(String, #[source] url::ParseError),

    /// The given header name could not be parsed
    #[error("Header name could not be parsed.")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// The given header value could not be parsed
    #[error("Header value could not be parsed.")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The number of permits per period must be at least one
    #[error("Invalid permit count {0}: at least one request per period must be allowed")]
    InvalidPermits(u32),

    /// The permit period must be longer than zero
    #[error("Invalid permit period {0:?}: period must not be zero")]
    InvalidPeriod(Duration),

    /// The Retry-After cap must be longer than zero
    #[error("Invalid Retry-After limit {0:?}: rate-limited hosts must be given some time")]
    InvalidMaxRetryAfter(Duration),
}

impl ErrorKind {
    /// Return the underlying `reqwest` error, if any
    #[must_use]
    pub const fn reqwest_error(&self) -> Option<&reqwest::Error> {
        match self {
            Self::NetworkRequest(e) | Self::BuildRequestClient(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this error was caused by an invalid configuration value
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPermits(_) | Self::InvalidPeriod(_) | Self::InvalidMaxRetryAfter(_)
        )
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::NetworkRequest(e1), Self::NetworkRequest(e2))
            | (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::ParseUrl(s1, e1), Self::ParseUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::InvalidPermits(p1), Self::InvalidPermits(p2)) => p1 == p2,
            (Self::InvalidPeriod(d1), Self::InvalidPeriod(d2))
            | (Self::InvalidMaxRetryAfter(d1), Self::InvalidMaxRetryAfter(d2)) => d1 == d2,
            (Self::InvalidHeaderName(_), Self::InvalidHeaderName(_))
            | (Self::InvalidHeaderValue(_), Self::InvalidHeaderValue(_))
            | (Self::InvalidUrlHost, Self::InvalidUrlHost) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        match self {
            Self::NetworkRequest(e) | Self::BuildRequestClient(e) => e.to_string().hash(state),
            Self::ParseUrl(s, e) => (s, e.to_string()).hash(state),
            Self::InvalidPermits(p) => p.hash(state),
            Self::InvalidPeriod(d) | Self::InvalidMaxRetryAfter(d) => d.hash(state),
            Self::InvalidHeaderName(e) => e.to_string().hash(state),
            Self::InvalidHeaderValue(e) => e.to_string().hash(state),
            Self::InvalidUrlHost => std::mem::discriminant(self).hash(state),
        }
    }
}

impl From<(String, url::ParseError)> for ErrorKind {
    fn from(value: (String, url::ParseError)) -> Self {
        Self::ParseUrl(value.0, value.1)
    }
}

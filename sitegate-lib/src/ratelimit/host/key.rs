use serde::Deserialize;
use std::fmt;
use url::Url;

use crate::ErrorKind;
use crate::types::Result;

/// A normalized hostname used as the throttling key.
///
/// All URLs pointing to the same host share one key, no matter their scheme,
/// port, path or letter case. Ports are deliberately dropped: two services on
/// the same machine are paced together.
///
/// # Examples
///
/// ```
/// use sitegate_lib::ratelimit::HostKey;
/// use url::Url;
///
/// let url = Url::parse("https://Novels.Example.com:8443/chapter/12").unwrap();
/// let host_key = HostKey::try_from(&url).unwrap();
/// assert_eq!(host_key.as_str(), "novels.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub struct HostKey(String);

impl HostKey {
    /// Get the hostname as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the hostname as an owned String
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<&Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: &Url) -> Result<Self> {
        let host = url.host_str().ok_or(ErrorKind::InvalidUrlHost)?;
        Ok(HostKey::from(host))
    }
}

impl TryFrom<Url> for HostKey {
    type Error = ErrorKind;

    fn try_from(url: Url) -> Result<Self> {
        HostKey::try_from(&url)
    }
}

impl TryFrom<&reqwest::Request> for HostKey {
    type Error = ErrorKind;

    fn try_from(request: &reqwest::Request) -> Result<Self> {
        HostKey::try_from(request.url())
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for HostKey {
    fn from(host: String) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<&HostKey> for HostKey {
    fn from(key: &HostKey) -> Self {
        key.clone()
    }
}

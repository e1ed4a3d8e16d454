//! A polite HTTP client.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` sends requests through a [`PolitenessGate`] and returns
//! responses. `ClientBuilder` exposes a finer level of granularity for
//! building a `Client`.
#![allow(clippy::module_name_repetitions)]
use std::time::Duration;

use http::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, Request, Response};
use typed_builder::TypedBuilder;
use url::Url;

use crate::chain::{DefaultHeaders, Pipeline};
use crate::ratelimit::{GateConfig, GateInterceptor, PolitenessGate};
use crate::{ErrorKind, Result};

/// Default number of redirects before a request is deemed as failed, 5.
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
/// Default timeout in seconds before a request is deemed as failed, 20.
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
/// Default user agent, `sitegate-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("sitegate/", env!("CARGO_PKG_VERSION"));

/// Builder for [`Client`].
///
/// ```
/// use sitegate_lib::{ClientBuilder, Result};
///
/// # fn main() -> Result<()> {
/// let client = ClientBuilder::builder()
///     .user_agent("reader/1.0")
///     .build()
///     .client()?;
/// assert_eq!(client.gate().host_count(), 0);
/// # Ok(())
/// # }
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Gate to send every request through.
    ///
    /// Pass a gate to share pacing state between several clients. If unset,
    /// a new gate is created from [`ClientBuilder::config`].
    gate: Option<PolitenessGate>,

    /// Pacing configuration for a newly created gate.
    ///
    /// Ignored if [`ClientBuilder::gate`] is set.
    config: GateConfig,

    /// User-agent used for all requests which don't set their own.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Headers attached to every request which doesn't set them itself.
    custom_headers: HeaderMap,

    /// Maximum number of redirects per request before returning an error.
    ///
    /// Zero disables redirects, which is also the only way to observe a
    /// `301` carrying `Retry-After`.
    #[builder(default = DEFAULT_MAX_REDIRECTS)]
    max_redirects: usize,

    /// Response timeout per request.
    #[builder(default = Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))]
    timeout: Option<Duration>,
}

impl Default for ClientBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// The gate is always the first step of the pipeline, followed by the
    /// step attaching shared headers.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user agent contains characters other than ASCII 32-127.
    /// - The pacing configuration is invalid.
    /// - The reqwest client cannot be instantiated.
    pub fn client(self) -> Result<Client> {
        let Self {
            gate,
            config,
            user_agent,
            custom_headers: mut headers,
            max_redirects,
            timeout,
        } = self;

        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);
        }

        let redirect_policy = match max_redirects {
            0 => reqwest::redirect::Policy::none(),
            n => reqwest::redirect::Policy::limited(n),
        };
        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .redirect(redirect_policy);

        let reqwest_client = (match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        })
        .build()
        .map_err(ErrorKind::BuildRequestClient)?;

        let gate = match gate {
            Some(gate) => gate,
            None => PolitenessGate::new(config)?,
        };

        let pipeline = Pipeline::new(reqwest_client)
            .with(GateInterceptor::new(gate.clone()))
            .with(DefaultHeaders::new(headers));

        Ok(Client { pipeline, gate })
    }
}

/// Sends requests politely: one host at a time, honoring `Retry-After`.
///
/// See [`ClientBuilder`] which contains sane defaults for all configuration
/// options.
#[derive(Debug, Clone)]
pub struct Client {
    pipeline: Pipeline,
    gate: PolitenessGate,
}

impl Client {
    /// Send `request` once it is the turn of its host.
    ///
    /// # Errors
    ///
    /// Returns an `Err` if the request URL has no host or the request fails
    /// at the network level. HTTP error statuses, including a final
    /// rate-limited response, are returned as `Ok`.
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.pipeline.execute(request).await
    }

    /// `GET` the given URL.
    ///
    /// # Errors
    ///
    /// See [`Client::execute`]; additionally fails if `url` cannot be parsed.
    pub async fn get<T: AsRef<str>>(&self, url: T) -> Result<Response> {
        let url = url.as_ref();
        let url = Url::parse(url).map_err(|e| (url.to_string(), e))?;
        self.execute(Request::new(Method::GET, url)).await
    }

    /// The gate all requests of this client pass through
    #[must_use]
    pub const fn gate(&self) -> &PolitenessGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use http::StatusCode;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{ClientBuilder, DEFAULT_USER_AGENT};
    use crate::ErrorKind;
    use crate::ratelimit::{GateConfig, PolitenessGate};

    fn fast_config() -> GateConfig {
        GateConfig {
            min_spacing: Duration::from_millis(50),
            ..GateConfig::default()
        }
    }

    #[tokio::test]
    async fn test_default_user_agent_is_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", DEFAULT_USER_AGENT))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ClientBuilder::builder().build().client().unwrap();
        let response = client.get(mock_server.uri()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "reader/1.0"))
            .and(header("accept-language", "en"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut custom_headers = http::HeaderMap::new();
        custom_headers.insert("accept-language", "en".parse().unwrap());
        let client = ClientBuilder::builder()
            .user_agent("reader/1.0")
            .custom_headers(custom_headers)
            .build()
            .client()
            .unwrap();

        let response = client.get(mock_server.uri()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limited_request_is_retried_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/chapter"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/chapter"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ClientBuilder::builder()
            .config(fast_config())
            .build()
            .client()
            .unwrap();

        let start = Instant::now();
        let response = client.get(format!("{}/chapter", mock_server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_moved_permanently_is_seen_without_redirects() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("Retry-After", "1")
                    .insert_header("Location", "/elsewhere"),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let client = ClientBuilder::builder()
            .config(fast_config())
            .max_redirects(0_usize)
            .build()
            .client()
            .unwrap();

        let response = client.get(mock_server.uri()).await.unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[tokio::test]
    async fn test_clients_share_a_gate() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let gate = PolitenessGate::new(GateConfig {
            min_spacing: Duration::from_millis(500),
            ..GateConfig::default()
        })
        .unwrap();
        let first = ClientBuilder::builder().gate(gate.clone()).build().client().unwrap();
        let second = ClientBuilder::builder().gate(gate.clone()).build().client().unwrap();

        let start = Instant::now();
        first.get(mock_server.uri()).await.unwrap();
        second.get(mock_server.uri()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(gate.host_stats("127.0.0.1").total_requests, 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = ClientBuilder::builder()
            .config(GateConfig {
                permits: 0,
                ..GateConfig::default()
            })
            .build()
            .client();
        assert!(matches!(result, Err(ErrorKind::InvalidPermits(0))));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let client = ClientBuilder::default().client().unwrap();
        let result = client.get("not a url").await;
        assert!(matches!(result, Err(ErrorKind::ParseUrl(..))));
    }
}

//! An asynchronous request pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Interceptor`]s in front of a
//! [`Transport`]. Each interceptor receives the request together with
//! [`Next`], the rest of the pipeline, and decides whether, when and how
//! often to pass the request on.

use core::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use reqwest::{Request, Response};

use crate::{ErrorKind, Result};

/// One step of a [`Pipeline`]
#[async_trait]
pub trait Interceptor: Debug + Send + Sync {
    /// Handle `request`, usually by passing it on to `next`
    async fn intercept(&self, request: Request, next: Next<'_>) -> Result<Response>;
}

/// The end of a [`Pipeline`], which actually sends requests
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Send `request` and return the response
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response> {
        self.execute(request).await.map_err(ErrorKind::NetworkRequest)
    }
}

/// The remainder of a [`Pipeline`] as seen from one interceptor.
///
/// `Next` is `Copy`, so an interceptor may proceed more than once, e.g. to
/// retry a request.
#[derive(Debug, Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl Next<'_> {
    /// Pass `request` to the next interceptor, or send it if there is none
    ///
    /// # Errors
    ///
    /// Returns whatever error a later interceptor or the transport returns
    pub async fn proceed(self, request: Request) -> Result<Response> {
        match self.interceptors.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    interceptors: rest,
                    transport: self.transport,
                };
                current.intercept(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Ordered interceptors in front of a transport
#[derive(Debug, Clone)]
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    /// Create a pipeline without interceptors
    #[must_use]
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            interceptors: Vec::new(),
            transport: Arc::new(transport),
        }
    }

    /// Append an interceptor. Interceptors see requests in the order in
    /// which they were added.
    #[must_use]
    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Number of interceptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Whether the pipeline sends requests straight to the transport
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `request` through every interceptor and the transport
    ///
    /// # Errors
    ///
    /// Returns the first error raised along the pipeline
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let next = Next {
            interceptors: &self.interceptors,
            transport: self.transport.as_ref(),
        };
        next.proceed(request).await
    }
}

/// Attach shared headers (e.g. `User-Agent`) to requests which don't set
/// them already
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders(HeaderMap);

impl DefaultHeaders {
    /// Create the step from a set of headers
    #[must_use]
    pub const fn new(headers: HeaderMap) -> Self {
        Self(headers)
    }
}

#[async_trait]
impl Interceptor for DefaultHeaders {
    async fn intercept(&self, mut request: Request, next: Next<'_>) -> Result<Response> {
        for name in self.0.keys() {
            if request.headers().contains_key(name) {
                continue;
            }
            for value in self.0.get_all(name) {
                request.headers_mut().append(name.clone(), value.clone());
            }
        }
        next.proceed(request).await
    }
}

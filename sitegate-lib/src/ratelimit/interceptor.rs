use async_trait::async_trait;
use reqwest::{Request, Response};

use crate::Result;
use crate::chain::{Interceptor, Next};
use crate::ratelimit::PolitenessGate;

/// Installs a [`PolitenessGate`] into a [`crate::chain::Pipeline`].
///
/// The interceptor keeps no state of its own. It should be the first step of
/// the pipeline so that the bounded retry passes through every later step
/// again.
#[derive(Debug, Clone)]
pub struct GateInterceptor {
    gate: PolitenessGate,
}

impl GateInterceptor {
    /// Wrap `gate`
    #[must_use]
    pub const fn new(gate: PolitenessGate) -> Self {
        Self { gate }
    }

    /// The wrapped gate
    #[must_use]
    pub const fn gate(&self) -> &PolitenessGate {
        &self.gate
    }
}

#[async_trait]
impl Interceptor for GateInterceptor {
    async fn intercept(&self, request: Request, next: Next<'_>) -> Result<Response> {
        self.gate.await_then_proceed(request, next).await
    }
}

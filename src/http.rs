//! HTTP client with rate limiting for node REST endpoints.
//!
//! Wraps `reqwest::Client` to provide:
//! * Request throttling so bursts of player commands cannot flood a node
//! * Consistent timeouts, keepalive and `User-Agent`
//!
//! Rate limiting allows bursts up to the per-interval maximum; requests
//! beyond it are delayed, not rejected.

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Body, Method, Request, Url};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
pub struct Client {
    /// Unlimited request client for special cases.
    ///
    /// Direct access to the underlying client without rate limiting.
    pub unlimited: reqwest::Client,

    /// Rate limiter applied by [`execute`](Self::execute).
    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window over which request bursts are measured.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(5);

    /// Maximum calls allowed within each interval.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 50;

    /// Duration to keep idle connections alive.
    ///
    /// Prevents reconnection overhead between player commands.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Overall deadline for a single request.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client from the shared configuration.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit constants are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(&config.user_agent);

        // Rate limit own requests as to not flood the node.
        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request with the given method, URL and body.
    ///
    /// The request is raw: execute it with [`execute`](Self::execute).
    pub fn request<U, T>(&self, method: Method, url: U, body: T) -> Request
    where
        U: Into<Url>,
        T: Into<Body>,
    {
        let mut request = Request::new(method, url.into());
        let body_mut = request.body_mut();
        *body_mut = Some(body.into());

        request
    }

    /// Executes a request after waiting for rate-limit clearance.
    pub fn execute(&self, request: Request) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // No need to await with jitter because the level of concurrency is low.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}

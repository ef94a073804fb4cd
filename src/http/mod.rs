//! HTTP specialization of the retry engine.
//!
//! Each attempt rebuilds the request from a caller-supplied builder, sends it through a
//! [`Transport`], and then:
//! - on a transport failure, returns the [`TransportError`] for classification;
//! - on a status outside the expected set, drains the body up to the byte ceiling, closes it, and
//!   returns a [`StatusCodeError`] carrying status, headers, and the drained bytes;
//! - otherwise reads the body up to the byte ceiling, closes it, and decodes it.
//!
//! Defaults: five attempts in `NonRetryableWithReset` mode, 200ms constant backoff overridden by a
//! server `Retry-After` hint, a 2 MiB byte ceiling, and an early return for definitively
//! non-retryable statuses, decode failures, and invalid requests.
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use http::{Request, StatusCode};
//! use persevere::http::HttpRetrier;
//! use persevere::Context;
//!
//! #[derive(serde::Deserialize)]
//! struct Health { ok: bool }
//!
//! # async fn run() -> Result<(), persevere::http::HttpError> {
//! let retrier = HttpRetrier::builder().build().unwrap();
//! let health: Health = retrier
//!     .send(
//!         &Context::background(),
//!         |_ctx| Ok(Request::get("http://localhost:8080/health").body(Bytes::new())?),
//!         &[StatusCode::OK],
//!     )
//!     .await?;
//! # let _ = health.ok;
//! # Ok(())
//! # }
//! ```

mod decode;
mod error;
mod retry_after;
mod status;
mod transport;

pub use decode::{decode_response, decode_response_limited, decompress, media_type};
pub use error::{DecodeError, HttpError, StatusCodeError, TransportError};
pub use retry_after::parse_retry_after;
pub use status::{is_non_retryable_status, is_retryable_status, status_verdict};
pub use transport::{BoxBody, ResponseBody, Transport};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use serde::de::DeserializeOwned;

use crate::classify::Classification;
use crate::error::BuildError;
use crate::retry::{RetryOutcome, RetryPolicy, RetryPolicyBuilder};
use crate::{Backoff, Context, Jitter, MaxAttemptsMode, Sleeper};
use transport::{drain, read_limited};

/// Byte ceiling used for draining and decoding unless configured otherwise (2 MiB).
pub const DEFAULT_MAX_BYTES: usize = 2 * 1024 * 1024;

type HttpClassifyFn = Arc<dyn Fn(&Context, &HttpError) -> Classification + Send + Sync>;
type HttpEarlyReturnFn = Arc<dyn Fn(&Context, &HttpError) -> bool + Send + Sync>;
type StatusFallbackFn = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;

/// Retrying HTTP client.
#[derive(Clone)]
pub struct HttpRetrier {
    policy: RetryPolicy<HttpError>,
    transport: Arc<dyn Transport>,
    max_bytes: usize,
    unlisted_status: StatusFallbackFn,
}

impl std::fmt::Debug for HttpRetrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRetrier")
            .field("policy", &self.policy)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl HttpRetrier {
    pub fn builder() -> HttpRetrierBuilder {
        HttpRetrierBuilder::new()
    }

    pub fn policy(&self) -> &RetryPolicy<HttpError> {
        &self.policy
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Send with retries and decode the accepted body by content type (JSON or XML, optionally
    /// gzip-encoded).
    ///
    /// An empty `expected` slice accepts every status.
    pub async fn send<T, B>(
        &self,
        ctx: &Context,
        build: B,
        expected: &[StatusCode],
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Fn(&Context) -> Result<Request<Bytes>, HttpError>,
    {
        let limit = self.max_bytes;
        self.send_with(ctx, build, expected, |headers: &HeaderMap, body: &[u8]| {
            decode_response_limited::<T>(headers, body, limit)
        })
        .await
    }

    /// Send with retries and decode the accepted body with `decode`.
    pub async fn send_with<T, B, D>(
        &self,
        ctx: &Context,
        build: B,
        expected: &[StatusCode],
        decode: D,
    ) -> Result<T, HttpError>
    where
        B: Fn(&Context) -> Result<Request<Bytes>, HttpError>,
        D: Fn(&HeaderMap, &[u8]) -> Result<T, DecodeError>,
    {
        self.send_outcome(ctx, build, expected, decode).await.into_result()
    }

    /// Like [`send_with`](Self::send_with), reporting attempts and termination.
    pub async fn send_outcome<T, B, D>(
        &self,
        ctx: &Context,
        build: B,
        expected: &[StatusCode],
        decode: D,
    ) -> RetryOutcome<T, HttpError>
    where
        B: Fn(&Context) -> Result<Request<Bytes>, HttpError>,
        D: Fn(&HeaderMap, &[u8]) -> Result<T, DecodeError>,
    {
        let build = &build;
        let decode = &decode;
        self.policy
            .execute_outcome(ctx, move |attempt_ctx| {
                self.attempt(attempt_ctx, build, expected, decode)
            })
            .await
    }

    async fn attempt<T, B, D>(
        &self,
        ctx: Context,
        build: &B,
        expected: &[StatusCode],
        decode: &D,
    ) -> Result<T, HttpError>
    where
        B: Fn(&Context) -> Result<Request<Bytes>, HttpError>,
        D: Fn(&HeaderMap, &[u8]) -> Result<T, DecodeError>,
    {
        let request = build(&ctx)?;
        let (parts, mut body) = self.transport.round_trip(request).await?.into_parts();

        if !expected.is_empty() && !expected.contains(&parts.status) {
            let drained = drain(body, self.max_bytes).await;
            let retryable = status_verdict(parts.status)
                .unwrap_or_else(|| (self.unlisted_status)(parts.status));
            tracing::debug!(status = %parts.status, retryable, "unexpected status code");
            return Err(StatusCodeError {
                status: parts.status,
                retryable,
                headers: parts.headers,
                body: drained,
            }
            .into());
        }

        let read = read_limited(&mut body, self.max_bytes).await;
        body.close();
        let (bytes, truncated) = read?;
        if truncated {
            return Err(DecodeError::TooLarge { limit: self.max_bytes }.into());
        }
        Ok(decode(&parts.headers, &bytes)?)
    }
}

/// Stop-immediately rule used when no early-return predicate is configured.
fn is_terminal(err: &HttpError) -> bool {
    match err {
        HttpError::Status(e) => is_non_retryable_status(e.status),
        HttpError::Decode(_) | HttpError::Request(_) => true,
        HttpError::Context(e) => e.is_cancelled(),
        HttpError::Transport(_) => false,
    }
}

/// Builder for [`HttpRetrier`].
pub struct HttpRetrierBuilder {
    policy: RetryPolicyBuilder<HttpError>,
    transport: Option<Arc<dyn Transport>>,
    max_bytes: usize,
    classifier: HttpClassifyFn,
    early_return: Option<HttpEarlyReturnFn>,
    unlisted_status: StatusFallbackFn,
}

impl HttpRetrierBuilder {
    pub fn new() -> Self {
        Self {
            policy: RetryPolicyBuilder::new(),
            transport: None,
            max_bytes: DEFAULT_MAX_BYTES,
            classifier: Arc::new(|_: &Context, err: &HttpError| err.classification()),
            early_return: None,
            unlisted_status: Arc::new(|_: StatusCode| false),
        }
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.policy = self.policy.max_attempts(attempts);
        self
    }

    pub fn mode(mut self, mode: MaxAttemptsMode) -> Self {
        self.policy = self.policy.mode(mode);
        self
    }

    pub fn per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.policy = self.policy.per_attempt_timeout(timeout);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.policy = self.policy.backoff(backoff);
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.policy = self.policy.with_jitter(jitter);
        self
    }

    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.policy = self.policy.with_sleeper(sleeper);
        self
    }

    /// Ceiling for drained and decoded bodies.
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Verdict for status codes the built-in table does not list. Defaults to not retryable.
    pub fn unlisted_status<F>(mut self, fallback: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        self.unlisted_status = Arc::new(fallback);
        self
    }

    /// Replace the default classifier ([`HttpError::classification`]).
    pub fn classify<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Context, &HttpError) -> Classification + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Replace the default early-return rule.
    pub fn early_return<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context, &HttpError) -> bool + Send + Sync + 'static,
    {
        self.early_return = Some(Arc::new(predicate));
        self
    }

    pub fn build(self) -> Result<HttpRetrier, BuildError> {
        if self.max_bytes == 0 {
            return Err(BuildError::ZeroMaxBytes);
        }

        let classifier = self.classifier;
        let early_return: HttpEarlyReturnFn = match self.early_return {
            Some(predicate) => predicate,
            None => {
                let classifier = classifier.clone();
                Arc::new(move |ctx: &Context, err: &HttpError| {
                    is_terminal(err) && !classifier(ctx, err).is_retryable()
                })
            }
        };

        let policy = self
            .policy
            .classify(move |ctx, err| classifier(ctx, err))
            .early_return(move |ctx, err| early_return(ctx, err))
            .delay_hint(|_, err: &HttpError| err.retry_after())
            .build()?;

        let transport = self.transport.unwrap_or_else(|| Arc::new(reqwest::Client::new()));
        Ok(HttpRetrier {
            policy,
            transport,
            max_bytes: self.max_bytes,
            unlisted_status: self.unlisted_status,
        })
    }
}

impl Default for HttpRetrierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

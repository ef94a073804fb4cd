//! Tower integration: run any service with cloneable requests through a [`RetryPolicy`].
//!
//! ```rust
//! use persevere::{Context, ContextError, RetryLayer, RetryPolicy};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! #[derive(Debug)]
//! struct Unavailable;
//! impl From<ContextError> for Unavailable { fn from(_: ContextError) -> Self { Unavailable } }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<Unavailable>::builder().build().unwrap();
//! let svc = RetryLayer::new(policy, Context::background())
//!     .layer(service_fn(|req: u32| async move { Ok::<_, Unavailable>(req * 2) }));
//! assert_eq!(svc.oneshot(21).await.unwrap(), 42);
//! # });
//! ```

use futures::future::BoxFuture;
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

use crate::{Context, ContextError, RetryPolicy};

/// Layer wrapping services in [`RetryService`].
pub struct RetryLayer<E> {
    policy: RetryPolicy<E>,
    ctx: Context,
}

impl<E> RetryLayer<E> {
    /// Every call made through the produced services runs under `ctx`.
    pub fn new(policy: RetryPolicy<E>, ctx: Context) -> Self {
        Self { policy, ctx }
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self { policy: self.policy.clone(), ctx: self.ctx.clone() }
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = RetryService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, policy: self.policy.clone(), ctx: self.ctx.clone() }
    }
}

/// Service produced by [`RetryLayer`]. Each attempt clones the request and the inner service.
pub struct RetryService<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
    ctx: Context,
}

impl<S: Clone, E> Clone for RetryService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), policy: self.policy.clone(), ctx: self.ctx.clone() }
    }
}

impl<S, E, Request> Service<Request> for RetryService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Error: Into<E>,
    S::Future: Send + 'static,
    E: From<ContextError> + Send + 'static,
{
    type Response = S::Response;
    type Error = E;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let policy = self.policy.clone();
        let ctx = self.ctx.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            policy
                .execute(&ctx, move |_attempt_ctx| {
                    let svc = inner.clone();
                    let req = req.clone();
                    async move { svc.oneshot(req).await.map_err(Into::into) }
                })
                .await
        })
    }
}

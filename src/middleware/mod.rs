//! Middleware pipeline: composable before/after logic around route handlers.
//!
//! Each middleware receives the request [`Context`] and a [`Next`] cursor. It
//! may pass the request on, answer it directly (short-circuit), or decorate the
//! response coming back. The end of every chain is the handler the router
//! matched (or its `404` fallback).
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: cursor into the remaining chain.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`LoggerMiddleware`]: request/response logger.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::info;

use crate::{Response, context::Context};

/// Boxed future resolving to a [`Response`].
pub type BoxResponse = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Type-erased async request handler; the terminal link of a chain.
pub type Handler = Arc<dyn Fn(Context) -> BoxResponse + Send + Sync + 'static>;

/// A type-erased, reference-counted middleware function.
///
/// Construct one with [`from_middleware`].
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> BoxResponse + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// A cursor into the remaining middleware chain for a single request.
///
/// Consumed by [`Next::run`], so each middleware can forward a request at
/// most once.
pub struct Next {
    middlewares: Arc<[MiddlewareHandler]>,
    index: usize,
    endpoint: Handler,
}

impl Next {
    /// Positions a cursor at the start of `middlewares`, ending in `endpoint`.
    pub fn new(middlewares: Arc<[MiddlewareHandler]>, endpoint: Handler) -> Self {
        Self {
            middlewares,
            index: 0,
            endpoint,
        }
    }

    /// Invokes the next middleware, or the endpoint once the chain is exhausted.
    pub async fn run(mut self, ctx: Context) -> Response {
        match self.middlewares.get(self.index).cloned() {
            Some(handler) => {
                self.index += 1;
                handler(ctx, self).await
            }
            None => (self.endpoint)(ctx).await,
        }
    }
}

/// The core trait for all middleware.
///
/// Implementations are shared across Tokio tasks, so they must be
/// `Send + Sync`, and `handle` must return a `Send` future.
pub trait Middleware: Send + Sync {
    /// Handles the request, optionally delegating to `next`.
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse;
}

/// Logs method, path, status, and duration of every request.
///
/// ```text
/// POST /v1/resize - 201 (12.3ms)
/// ```
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let response = next.run(ctx).await;

            info!(
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                elapsed = ?start.elapsed(),
                "{} {} - {}",
                method,
                path,
                response.status().as_u16()
            );

            response
        })
    }
}

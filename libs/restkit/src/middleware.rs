//! Route handlers and the middleware that wraps them.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use futures::future::{BoxFuture, FutureExt};

type HandlerFn = dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync;

/// A cloneable async `Request -> Response` function.
///
/// Also a tower `Service`, so it can be mounted on an axum method router
/// directly.
#[derive(Clone)]
pub struct RouteHandler(Arc<HandlerFn>);

impl RouteHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        RouteHandler(Arc::new(move |req| f(req).boxed()))
    }

    pub fn call(&self, req: Request) -> BoxFuture<'static, Response> {
        (self.0)(req)
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RouteHandler")
    }
}

impl tower::Service<Request> for RouteHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let fut = RouteHandler::call(self, req);
        async move { Ok(fut.await) }.boxed()
    }
}

/// Maps one route handler to another.
pub type RequestMiddleware = Arc<dyn Fn(RouteHandler) -> RouteHandler + Send + Sync>;

/// Build a middleware from an async `(request, next)` function.
///
/// ```ignore
/// let log = from_fn(|req, next| async move {
///     tracing::info!(path = %req.uri().path(), "hit");
///     next.call(req).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> RequestMiddleware
where
    F: Fn(Request, RouteHandler) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: RouteHandler| {
        let f = f.clone();
        RouteHandler::new(move |req| f(req, next.clone()))
    })
}

/// Wrap `inner` so that `chain[0]` runs first.
pub fn apply_chain(inner: RouteHandler, chain: &[RequestMiddleware]) -> RouteHandler {
    chain.iter().rev().fold(inner, |next, mw| mw(next))
}

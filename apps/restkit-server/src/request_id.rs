//! Request ids and the per-request trace span.
//!
//! tower-http assigns and echoes `x-request-id`; [`tag_requests`] hands it to
//! resource handlers, and the pipeline records the `<resource>:<operation>`
//! route name on the span opened by [`http_span`].

use std::time::Duration;

use axum::extract::Request;
use axum::http::HeaderName;
use axum::response::Response;
use restkit::RequestMiddleware;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{field::Empty, Span};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const UNTAGGED: &str = "n/a";

/// Request id carried in request extensions, readable through
/// `RequestContext::extensions`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTag(pub String);

impl RequestTag {
    pub fn of<B>(req: &axum::http::Request<B>) -> Self {
        let id = req
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(UNTAGGED);
        RequestTag(id.to_owned())
    }
}

/// Short url-safe ids for requests that arrive without one.
#[derive(Clone, Copy, Default)]
pub struct NanoIds;

impl MakeRequestId for NanoIds {
    fn make_request_id<B>(&mut self, _req: &axum::http::Request<B>) -> Option<RequestId> {
        nanoid::nanoid!().parse().ok().map(RequestId::new)
    }
}

/// Resource middleware exposing the request id to handlers.
pub fn tag_requests() -> RequestMiddleware {
    restkit::from_fn(|mut req: Request, next| async move {
        let tag = RequestTag::of(&req);
        req.extensions_mut().insert(tag);
        next.call(req).await
    })
}

/// Span for one HTTP exchange. `route` is filled in by the resource pipeline,
/// `status` and `latency_ms` by [`record_outcome`].
pub fn http_span(req: &Request) -> Span {
    let RequestTag(request_id) = RequestTag::of(req);
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id = %request_id,
        route = Empty,
        status = Empty,
        latency_ms = Empty
    )
}

pub fn record_outcome(resp: &Response, latency: Duration, span: &Span) {
    span.record("status", resp.status().as_u16());
    span.record("latency_ms", latency.as_millis() as u64);
    tracing::debug!(parent: span, "response sent");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use restkit::RouteHandler;

    fn echo_tag() -> RouteHandler {
        RouteHandler::new(|req: Request| async move {
            let tag = req
                .extensions()
                .get::<RequestTag>()
                .map(|t| t.0.clone())
                .unwrap_or_default();
            Response::new(Body::from(tag))
        })
    }

    async fn tag_seen(req: Request) -> String {
        let handler = tag_requests()(echo_tag());
        let resp = handler.call(req).await;
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn handlers_see_the_header_value() {
        let req = axum::http::Request::builder()
            .header(REQUEST_ID_HEADER, "req-42")
            .body(Body::empty())
            .unwrap();
        assert_eq!(tag_seen(req).await, "req-42");
    }

    #[tokio::test]
    async fn untagged_requests_are_marked() {
        assert_eq!(tag_seen(Request::new(Body::empty())).await, UNTAGGED);
    }

    #[test]
    fn generated_ids_are_valid_header_values() {
        let req = Request::new(Body::empty());
        let id = NanoIds.make_request_id(&req).unwrap();
        assert_eq!(id.header_value().len(), 21);
    }
}

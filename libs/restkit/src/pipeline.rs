//! Per-route request orchestration.
//!
//! authenticate -> negotiate format -> parse payload -> invoke handler ->
//! project -> envelope -> serialize. The first failing stage writes the
//! response.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::http::request::Parts;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::envelope::Envelope;
use crate::error::{ApiError, SerializeError};
use crate::handler::{Payload, RequestContext, ResourceHandler};
use crate::middleware::RouteHandler;
use crate::pagination::build_next_link;
use crate::rules::OutputProjection;
use crate::serializer::{ResponseSerializer, SerializerRegistry, DEFAULT_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    ReadList,
    Update,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::Create,
        Operation::Read,
        Operation::ReadList,
        Operation::Update,
        Operation::Delete,
    ];

    /// Suffix of the route name, `<resource>:<suffix>`.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::ReadList => "readList",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn method(self) -> Method {
        match self {
            Operation::Create => Method::POST,
            Operation::Read | Operation::ReadList => Method::GET,
            Operation::Update => Method::PUT,
            Operation::Delete => Method::DELETE,
        }
    }

    /// Whether the route addresses a single item by `{id}`.
    pub fn targets_item(self) -> bool {
        matches!(
            self,
            Operation::Read | Operation::Update | Operation::Delete
        )
    }

    pub fn reads_body(self) -> bool {
        matches!(self, Operation::Create | Operation::Update)
    }

    pub fn success_status(self) -> StatusCode {
        match self {
            Operation::Create => StatusCode::CREATED,
            _ => StatusCode::OK,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) struct Pipeline<H: ResourceHandler> {
    pub(crate) handler: Arc<H>,
    pub(crate) operation: Operation,
    pub(crate) serializers: Arc<SerializerRegistry>,
    pub(crate) projection: Arc<OutputProjection>,
    pub(crate) config: Arc<ApiConfig>,
}

impl<H: ResourceHandler> Pipeline<H> {
    pub(crate) fn into_route_handler(self) -> RouteHandler {
        let this = Arc::new(self);
        RouteHandler::new(move |req| {
            let this = this.clone();
            async move { this.handle(req).await }
        })
    }

    async fn handle(&self, req: Request) -> Response {
        let (mut parts, body) = req.into_parts();
        let ctx = request_context(&mut parts).await;
        let resource = self.handler.resource_name();
        let operation = self.operation;
        let route = format!("{resource}:{operation}");
        tracing::Span::current().record("route", route.as_str());

        if let Err(e) = self.handler.authenticate(&ctx).await {
            tracing::warn!(resource, %operation, error = %e, "authentication rejected");
            return ApiError::Unauthorized(e.to_string()).into_response();
        }

        let format = ctx
            .query_param("format")
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FORMAT);
        let Some(serializer) = self.serializers.get(format) else {
            tracing::warn!(resource, %operation, format, "unsupported response format");
            return ApiError::UnsupportedFormat(format.to_string()).into_response();
        };

        tracing::debug!(resource, %operation, version = %ctx.version, "dispatching");
        match self.dispatch(&ctx, body).await {
            Ok(envelope) => write_envelope(serializer.as_ref(), operation.success_status(), envelope),
            Err(e) => {
                tracing::error!(resource, %operation, error = %e, "request failed");
                e.render(serializer.as_ref())
            }
        }
    }

    async fn dispatch(&self, ctx: &RequestContext, body: Body) -> Result<Envelope, ApiError> {
        let h = &self.handler;
        let version = ctx.version.as_str();
        let id = ctx.path_param("id");

        let item = match self.operation {
            Operation::Create => {
                let payload = self.read_payload(body).await?;
                h.create_resource(ctx, payload, version).await
            }
            Operation::Read => h.read_resource(ctx, id, version).await,
            Operation::Update => {
                let payload = self.read_payload(body).await?;
                h.update_resource(ctx, id, payload, version).await
            }
            Operation::Delete => h.delete_resource(ctx, id, version).await,
            Operation::ReadList => {
                let limit = self.limit(ctx);
                let cursor = ctx.query_param("next").unwrap_or("");
                let page = h
                    .read_resource_list(ctx, limit, cursor, version)
                    .await
                    .map_err(ApiError::Handler)?;
                let next = build_next_link(&ctx.uri, &ctx.headers, page.next_cursor());
                let items = page
                    .resources
                    .iter()
                    .map(|r| self.project(r))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Envelope::success(Value::Array(items)).with_next(next));
            }
        }
        .map_err(ApiError::Handler)?;

        Ok(Envelope::success(self.project(&item)?))
    }

    fn project<R: Serialize>(&self, resource: &R) -> Result<Value, ApiError> {
        let value = serde_json::to_value(resource).map_err(SerializeError::from)?;
        Ok(self.projection.apply(value))
    }

    fn limit(&self, ctx: &RequestContext) -> usize {
        ctx.query_param("limit")
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|&l| l > 0)
            .unwrap_or(self.config.default_limit)
    }

    async fn read_payload(&self, body: Body) -> Result<Payload, ApiError> {
        let bytes = axum::body::to_bytes(body, self.config.max_body_bytes)
            .await
            .map_err(|e| ApiError::Handler(anyhow::anyhow!("failed to read request body: {e}")))?;
        serde_json::from_slice::<Payload>(&bytes)
            .map_err(|e| ApiError::Handler(anyhow::anyhow!("invalid request payload: {e}")))
    }
}

fn write_envelope(
    serializer: &dyn ResponseSerializer,
    status: StatusCode,
    envelope: Envelope,
) -> Response {
    match serializer.serialize(&envelope.into_payload()) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, serializer.content_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize response");
            ApiError::Serialization(e).into_response()
        }
    }
}

/// Split a request head into the handler-facing context.
pub(crate) async fn request_context(parts: &mut Parts) -> RequestContext {
    let path_params: HashMap<String, String> = RawPathParams::from_request_parts(parts, &())
        .await
        .map(|params| {
            params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let mut query = HashMap::new();
    if let Some(q) = parts.uri.query() {
        for (k, v) in url::form_urlencoded::parse(q.as_bytes()) {
            query.entry(k.into_owned()).or_insert_with(|| v.into_owned());
        }
    }

    let version = path_params
        .get("version")
        .map(|v| v.strip_prefix('v').unwrap_or(v).to_string())
        .unwrap_or_default();

    RequestContext {
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        headers: parts.headers.clone(),
        extensions: std::mem::take(&mut parts.extensions),
        path_params,
        query,
        version,
    }
}

use std::time::Duration;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use restkit::ApiRegistry;
use runtime::ServerConfig;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::request_id::{http_span, record_outcome, NanoIds, REQUEST_ID_HEADER};

async fn health() -> &'static str {
    "ok"
}

/// API routes plus `/health`, wrapped in the HTTP stack.
///
/// Outermost to innermost: SetRequestId -> PropagateRequestId -> Trace ->
/// Timeout -> BodyLimit. Resource handlers get the id from the
/// `tag_requests` middleware registered with each resource.
pub fn build_app(api: &ApiRegistry, server: &ServerConfig) -> Router {
    let mut router = api
        .router()
        .route("/health", get(health))
        .layer(RequestBodyLimitLayer::new(api.config().max_body_bytes));

    if server.timeout_sec > 0 {
        router = router.layer(TimeoutLayer::new(Duration::from_secs(server.timeout_sec)));
    }

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(http_span)
                .on_response(record_outcome),
        )
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
        .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, NanoIds))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(app: Router, server: &ServerConfig) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((server.host.as_str(), server.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", server.host, server.port))?;
    tracing::info!("HTTP server bound on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!(e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("HTTP server shutting down gracefully");
}

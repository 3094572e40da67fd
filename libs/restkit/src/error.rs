use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::envelope::Envelope;
use crate::rules::RuleError;
use crate::serializer::{JsonSerializer, ResponseSerializer};

/// Request-time failures of the dispatch pipeline.
///
/// Each variant maps to exactly one status code. Everything except
/// `Unauthorized` is written as a failure envelope.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Authentication rejected. The message is written verbatim as the body.
    #[error("{0}")]
    Unauthorized(String),

    #[error("Format not implemented: {0}")]
    UnsupportedFormat(String),

    /// Payload decoding or business logic failure.
    #[error("{0}")]
    Handler(anyhow::Error),

    #[error(transparent)]
    Serialization(#[from] SerializeError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::UnsupportedFormat(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Handler(_) | ApiError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render through the given serializer. Falls back to JSON if the
    /// serializer itself fails on the failure envelope.
    pub fn render(self, serializer: &dyn ResponseSerializer) -> Response {
        let status = self.status();
        if let ApiError::Unauthorized(msg) = self {
            return (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                msg,
            )
                .into_response();
        }

        let envelope = Envelope::failure(self.to_string()).into_payload();
        match serializer.serialize(&envelope) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, serializer.content_type().to_string())],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize error envelope");
                ApiError::Serialization(e).into_response()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let json = JsonSerializer;
        if let ApiError::Serialization(_) = &self {
            // Last resort, must not recurse.
            let body = Envelope::failure(self.to_string()).into_payload();
            let bytes = serde_json::to_vec(&body).unwrap_or_default();
            return (
                self.status(),
                [(header::CONTENT_TYPE, json.content_type().to_string())],
                bytes,
            )
                .into_response();
        }
        self.render(&json)
    }
}

/// Failures of a [`ResponseSerializer`].
#[derive(thiserror::Error, Debug)]
pub enum SerializeError {
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml encoding failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Custom(String),
}

/// Resource/rule wiring defects found by `ApiRegistry::validate_rules`.
#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("resource '{resource}' has no prototype")]
    NilPrototype { resource: String },

    #[error("resource '{resource}' prototype must be a struct, found {found}")]
    NotAStruct { resource: String, found: String },

    #[error("resource '{resource}' has an invalid rule")]
    InvalidRule {
        resource: String,
        #[source]
        source: RuleError,
    },
}

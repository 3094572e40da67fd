//! # restkit - resource dispatch for axum
//!
//! Implement [`ResourceHandler`] for a domain type, hand it to an
//! [`ApiRegistry`], and get five REST routes with authentication, response
//! format negotiation, rule-driven field projection, cursor links and a
//! uniform `{result|error, success[, next]}` envelope.
//!
//! ## Example
//!
//! ```rust,ignore
//! use restkit::{ApiRegistry, ResourceHandler, ResourceSchema};
//!
//! #[derive(serde::Serialize, ResourceSchema)]
//! struct Widget { id: String, name: String }
//!
//! struct Widgets;
//!
//! #[restkit::async_trait]
//! impl ResourceHandler for Widgets {
//!     type Resource = Widget;
//!     fn resource_name(&self) -> &str { "widgets" }
//!     // create_resource, read_resource, ...
//! }
//!
//! let api = ApiRegistry::new();
//! api.register_resource_handler(Widgets, []);
//! api.validate_rules()?;
//! let app = api.router();
//! ```

// Lets the derive's `::restkit::` paths resolve inside this crate too.
extern crate self as restkit;

pub use async_trait::async_trait;

pub mod config;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod pagination;
pub mod pipeline;
pub mod registry;
pub mod router_cache;
pub mod rules;
pub mod schema;
pub mod serializer;

pub use config::ApiConfig;
pub use envelope::Envelope;
pub use error::{ApiError, ConfigurationError, SerializeError};
pub use handler::{Payload, RequestContext, ResourceHandler, ResourceList};
pub use middleware::{from_fn, RequestMiddleware, RouteHandler};
pub use pipeline::Operation;
pub use registry::{ApiRegistry, NamedRoute};
pub use rules::{
    apply_output_rules, check_output_keys, filter_input, validate_field, OutputProjection, Rule,
    RuleError,
};
pub use schema::{FieldSchema, FieldType, ResourceSchema, Schema, StructSchema};
pub use serializer::{JsonSerializer, ResponseSerializer, SerializerRegistry, YamlSerializer, DEFAULT_FORMAT};

pub use restkit_macros::ResourceSchema;

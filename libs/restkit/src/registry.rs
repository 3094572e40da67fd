//! Resource registration and route wiring.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{MethodFilter, MethodRouter};
use axum::Router;
use parking_lot::RwLock;

use crate::config::ApiConfig;
use crate::error::ConfigurationError;
use crate::handler::ResourceHandler;
use crate::middleware::{apply_chain, RequestMiddleware, RouteHandler};
use crate::pipeline::{Operation, Pipeline};
use crate::router_cache::RouterCache;
use crate::rules::{check_output_keys, validate_field, OutputProjection};
use crate::schema::ResourceSchema;
use crate::serializer::{ResponseSerializer, SerializerRegistry};

/// One entry of the route table: `<resource>:<operation>` bound to a method,
/// an axum path template and the fully wrapped handler.
#[derive(Debug, Clone)]
pub struct NamedRoute {
    pub name: String,
    pub method: Method,
    pub path: String,
    pub handler: RouteHandler,
}

type Validator = Box<dyn Fn() -> Result<(), ConfigurationError> + Send + Sync>;

struct Registration {
    routes: Vec<NamedRoute>,
    validate: Validator,
}

struct Inner {
    config: Arc<ApiConfig>,
    serializers: Arc<SerializerRegistry>,
    resources: RwLock<BTreeMap<String, Registration>>,
    router: RouterCache<Router>,
}

/// Maps resource names to handlers and renders them as axum routes.
///
/// Cheap to clone; clones share the same tables.
#[derive(Clone)]
pub struct ApiRegistry {
    inner: Arc<Inner>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::with_config(ApiConfig::default())
    }

    pub fn with_config(config: ApiConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                serializers: Arc::new(SerializerRegistry::new()),
                resources: RwLock::new(BTreeMap::new()),
                router: RouterCache::empty(),
            }),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Register `handler` under its resource name, replacing any previous
    /// registration of that name. `middleware[0]` becomes the outermost layer
    /// of each of the five routes.
    pub fn register_resource_handler<H>(
        &self,
        handler: H,
        middleware: impl IntoIterator<Item = RequestMiddleware>,
    ) where
        H: ResourceHandler,
    {
        let handler = Arc::new(handler);
        let name = handler.resource_name().to_string();
        let chain: Vec<RequestMiddleware> = middleware.into_iter().collect();
        let projection = Arc::new(OutputProjection::compile(
            &handler.rules(),
            &H::Resource::schema(),
        ));

        let prefix = self.inner.config.normalized_prefix();
        let routes = Operation::ALL
            .iter()
            .map(|&operation| {
                let pipeline = Pipeline {
                    handler: handler.clone(),
                    operation,
                    serializers: self.inner.serializers.clone(),
                    projection: projection.clone(),
                    config: self.inner.config.clone(),
                };
                NamedRoute {
                    name: format!("{name}:{operation}"),
                    method: operation.method(),
                    path: route_path(&prefix, &name, operation),
                    handler: apply_chain(pipeline.into_route_handler(), &chain),
                }
            })
            .collect();

        let validate: Validator = {
            let handler = handler.clone();
            Box::new(move || validate_handler(handler.as_ref()))
        };

        let replaced = {
            let mut resources = self.inner.resources.write();
            let replaced = resources
                .insert(name.clone(), Registration { routes, validate })
                .is_some();
            // routers are built under the read lock, so none can be stored
            // from the old table after this
            self.inner.router.invalidate();
            replaced
        };

        if replaced {
            tracing::info!(resource = %name, "resource handler replaced");
        } else {
            tracing::info!(resource = %name, middleware = chain.len(), "resource handler registered");
        }
    }

    pub fn register_response_serializer(
        &self,
        format: impl Into<String>,
        serializer: Arc<dyn ResponseSerializer>,
    ) {
        let format = format.into();
        tracing::debug!(format = %format, "registering response serializer");
        self.inner.serializers.register(format, serializer);
    }

    pub fn unregister_response_serializer(&self, format: &str) -> bool {
        self.inner.serializers.unregister(format)
    }

    /// Registered format names in lexicographic order.
    pub fn available_formats(&self) -> Vec<String> {
        self.inner.serializers.available_formats()
    }

    /// Check every registered handler's rules against its prototype.
    ///
    /// Run once before serving; any error is a wiring defect and should abort
    /// startup.
    pub fn validate_rules(&self) -> Result<(), ConfigurationError> {
        let resources = self.inner.resources.read();
        for (name, reg) in resources.iter() {
            (reg.validate)()?;
            tracing::debug!(resource = %name, "rules validated");
        }
        Ok(())
    }

    pub fn route(&self, name: &str) -> Option<NamedRoute> {
        let (resource, _) = name.split_once(':')?;
        self.inner
            .resources
            .read()
            .get(resource)?
            .routes
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn route_names(&self) -> Vec<String> {
        self.inner
            .resources
            .read()
            .values()
            .flat_map(|reg| reg.routes.iter().map(|r| r.name.clone()))
            .collect()
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.inner.resources.read().keys().cloned().collect()
    }

    /// Render the route table. The result is cached until the next
    /// registration.
    pub fn router(&self) -> Router {
        if let Some(cached) = self.inner.router.load() {
            return Router::clone(&cached);
        }
        let resources = self.inner.resources.read();
        let router = self.inner.router.get_or_build(|| build_router(&resources));
        Router::clone(&router)
    }
}

fn build_router(resources: &BTreeMap<String, Registration>) -> Router {
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();
    for reg in resources.values() {
        for route in &reg.routes {
            let Ok(filter) = MethodFilter::try_from(route.method.clone()) else {
                tracing::warn!(route = %route.name, method = %route.method, "unroutable method");
                continue;
            };
            let entry = by_path.remove(&route.path).unwrap_or_default();
            by_path.insert(route.path.clone(), entry.on_service(filter, route.handler.clone()));
        }
    }
    tracing::debug!(paths = by_path.len(), "router rebuilt");
    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| router.route(&path, methods))
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ApiRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRegistry")
            .field("resources", &self.resource_names())
            .field("formats", &self.available_formats())
            .finish()
    }
}

fn route_path(prefix: &str, resource: &str, operation: Operation) -> String {
    if operation.targets_item() {
        format!("{prefix}/{{version}}/{resource}/{{id}}")
    } else {
        format!("{prefix}/{{version}}/{resource}")
    }
}

fn validate_handler<H: ResourceHandler>(handler: &H) -> Result<(), ConfigurationError> {
    let rules = handler.rules();
    if rules.is_empty() {
        return Ok(());
    }
    let resource = handler.resource_name().to_string();
    let schema = handler
        .empty_resource()
        .ok_or_else(|| ConfigurationError::NilPrototype {
            resource: resource.clone(),
        })?;
    let Some(fields) = schema.as_struct() else {
        return Err(ConfigurationError::NotAStruct {
            resource,
            found: schema.describe(),
        });
    };
    let invalid = |source| ConfigurationError::InvalidRule {
        resource: resource.clone(),
        source,
    };
    for rule in &rules {
        validate_field(fields, rule).map_err(invalid)?;
    }
    check_output_keys(fields, &rules).map_err(invalid)
}

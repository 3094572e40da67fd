//! In-memory `widgets` resource.

use std::collections::BTreeMap;
use std::ops::Bound;

use anyhow::{anyhow, bail, Context};
use parking_lot::RwLock;
use restkit::{
    async_trait, filter_input, FieldType, Payload, RequestContext, ResourceHandler, ResourceList,
    ResourceSchema, Rule,
};
use serde::{Deserialize, Serialize};

use crate::request_id::RequestTag;

pub const RESOURCE: &str = "widgets";
const SUPPORTED_VERSIONS: &[&str] = &["1"];

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WidgetsConfig {
    /// Bearer token required on every request when set.
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ResourceSchema)]
pub struct Widget {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub quantity: u32,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NewWidget {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    quantity: u32,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WidgetPatch {
    name: Option<String>,
    description: Option<String>,
    quantity: Option<u32>,
    tags: Option<Vec<String>>,
}

pub struct WidgetHandler {
    config: WidgetsConfig,
    store: RwLock<BTreeMap<String, Widget>>,
}

impl WidgetHandler {
    pub fn new(config: WidgetsConfig) -> Self {
        Self {
            config,
            store: RwLock::new(BTreeMap::new()),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, payload: Payload) -> anyhow::Result<T> {
        let payload = filter_input(payload, &self.rules(), &Widget::schema());
        serde_json::from_value(serde_json::Value::Object(payload)).context("invalid widget payload")
    }
}

fn check_version(version: &str) -> anyhow::Result<()> {
    if SUPPORTED_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(anyhow!("unsupported API version '{version}'"))
    }
}

fn request_id(ctx: &RequestContext) -> &str {
    ctx.extensions
        .get::<RequestTag>()
        .map(|r| r.0.as_str())
        .unwrap_or("n/a")
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[async_trait]
impl ResourceHandler for WidgetHandler {
    type Resource = Widget;

    fn resource_name(&self) -> &str {
        RESOURCE
    }

    async fn authenticate(&self, ctx: &RequestContext) -> anyhow::Result<()> {
        match &self.config.auth_token {
            Some(expected) if ctx.bearer_token() != Some(expected.as_str()) => {
                bail!("Not authorized")
            }
            _ => Ok(()),
        }
    }

    fn rules(&self) -> Vec<Rule> {
        vec![
            Rule::new("id").typed(FieldType::String).output_only(),
            Rule::new("created_at")
                .alias("created")
                .typed(FieldType::String)
                .output_only(),
            Rule::new("updated_at")
                .alias("updated")
                .typed(FieldType::String)
                .output_only(),
            Rule::new("quantity").typed(FieldType::Uint),
        ]
    }

    async fn create_resource(
        &self,
        ctx: &RequestContext,
        payload: Payload,
        version: &str,
    ) -> anyhow::Result<Widget> {
        check_version(version)?;
        let new: NewWidget = self.decode(payload)?;
        if new.name.trim().is_empty() {
            bail!("widget name must not be empty");
        }

        let ts = now();
        let widget = Widget {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            description: new.description,
            quantity: new.quantity,
            tags: new.tags,
            created_at: ts.clone(),
            updated_at: ts,
        };
        self.store.write().insert(widget.id.clone(), widget.clone());
        tracing::info!(id = %widget.id, request_id = request_id(ctx), "widget created");
        Ok(widget)
    }

    async fn read_resource(
        &self,
        _ctx: &RequestContext,
        id: &str,
        version: &str,
    ) -> anyhow::Result<Widget> {
        check_version(version)?;
        self.store
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("widget '{id}' not found"))
    }

    async fn read_resource_list(
        &self,
        _ctx: &RequestContext,
        limit: usize,
        cursor: &str,
        version: &str,
    ) -> anyhow::Result<ResourceList<Widget>> {
        check_version(version)?;
        let lower = if cursor.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(cursor.to_string())
        };

        let store = self.store.read();
        let mut page: Vec<Widget> = store
            .range((lower, Bound::Unbounded))
            .take(limit.saturating_add(1))
            .map(|(_, w)| w.clone())
            .collect();

        let next = if page.len() > limit {
            page.truncate(limit);
            page.last().map(|w| w.id.clone())
        } else {
            None
        };
        Ok(ResourceList {
            resources: page,
            cursor: next,
        })
    }

    async fn update_resource(
        &self,
        ctx: &RequestContext,
        id: &str,
        payload: Payload,
        version: &str,
    ) -> anyhow::Result<Widget> {
        check_version(version)?;
        let patch: WidgetPatch = self.decode(payload)?;

        let mut store = self.store.write();
        let widget = store
            .get_mut(id)
            .ok_or_else(|| anyhow!("widget '{id}' not found"))?;
        if let Some(name) = patch.name {
            if name.trim().is_empty() {
                bail!("widget name must not be empty");
            }
            widget.name = name;
        }
        if patch.description.is_some() {
            widget.description = patch.description;
        }
        if let Some(quantity) = patch.quantity {
            widget.quantity = quantity;
        }
        if let Some(tags) = patch.tags {
            widget.tags = tags;
        }
        widget.updated_at = now();
        tracing::info!(id, request_id = request_id(ctx), "widget updated");
        Ok(widget.clone())
    }

    async fn delete_resource(
        &self,
        ctx: &RequestContext,
        id: &str,
        version: &str,
    ) -> anyhow::Result<Widget> {
        check_version(version)?;
        let widget = self
            .store
            .write()
            .remove(id)
            .ok_or_else(|| anyhow!("widget '{id}' not found"))?;
        tracing::info!(id, request_id = request_id(ctx), "widget deleted");
        Ok(widget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_app;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use restkit::ApiRegistry;
    use runtime::ServerConfig;
    use serde_json::{json, Value};
    use tower::util::ServiceExt; // for `oneshot`

    fn app(config: WidgetsConfig) -> Router {
        let api = ApiRegistry::new();
        api.register_resource_handler(WidgetHandler::new(config), [crate::request_id::tag_requests()]);
        api.validate_rules().unwrap();
        build_app(&api, &ServerConfig::default())
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri).header("host", "localhost:8087");
        if body.is_some() {
            req = req.header("content-type", "application/json");
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn crud_roundtrip() {
        let app = app(WidgetsConfig::default());

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/widgets",
            Some(json!({"name": "gear", "quantity": 3, "created": "ignored"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created = &body["result"];
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["name"], "gear");
        assert_eq!(created["quantity"], 3);
        assert!(created["created"].is_string());
        assert!(created.get("created_at").is_none());

        let (status, body) = send(&app, "GET", &format!("/api/v1/widgets/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["id"], id.as_str());

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/widgets/{id}"),
            Some(json!({"quantity": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["quantity"], 9);
        assert_eq!(body["result"]["name"], "gear");

        let (status, _) = send(&app, "DELETE", &format!("/api/v1/widgets/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "GET", &format!("/api/v1/widgets/{id}"), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": format!("widget '{id}' not found"), "success": false}));
    }

    #[tokio::test]
    async fn list_pages_with_next_link() {
        let app = app(WidgetsConfig::default());
        for name in ["a", "b", "c"] {
            send(&app, "POST", "/api/v1/widgets", Some(json!({"name": name}))).await;
        }

        let (status, first) = send(&app, "GET", "/api/v1/widgets?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["result"].as_array().unwrap().len(), 2);
        let next = first["next"].as_str().unwrap();
        assert!(next.starts_with("http://localhost:8087?next="));

        let cursor = next.split_once("?next=").unwrap().1;
        let (_, second) =
            send(&app, "GET", &format!("/api/v1/widgets?limit=2&next={cursor}"), None).await;
        assert_eq!(second["result"].as_array().unwrap().len(), 1);
        assert!(second.get("next").is_none());
    }

    #[tokio::test]
    async fn bearer_token_is_enforced() {
        let app = app(WidgetsConfig {
            auth_token: Some("s3cret".into()),
        });

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/widgets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Not authorized");

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/widgets")
                    .header("authorization", "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rejects_bad_input_and_versions() {
        let app = app(WidgetsConfig::default());

        let (status, body) =
            send(&app, "POST", "/api/v1/widgets", Some(json!({"name": "x", "colour": "red"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "invalid widget payload");

        let (status, body) = send(&app, "GET", "/api/v2/widgets", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "unsupported API version '2'");
    }

    #[test]
    fn rules_match_schema() {
        let handler = WidgetHandler::new(WidgetsConfig::default());
        let schema = Widget::schema();
        let fields = schema.as_struct().unwrap();
        for rule in handler.rules() {
            restkit::validate_field(fields, &rule).unwrap();
        }
    }
}

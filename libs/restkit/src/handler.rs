use std::collections::HashMap;

use async_trait::async_trait;
use axum::http::{Extensions, HeaderMap, Method, Uri};
use serde::Serialize;

use crate::rules::Rule;
use crate::schema::{ResourceSchema, Schema};

/// Decoded create/update request body.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// One page returned by `read_resource_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceList<R> {
    pub resources: Vec<R>,
    /// Opaque continuation token. `None` or empty means last page.
    pub cursor: Option<String>,
}

impl<R> ResourceList<R> {
    pub fn new(resources: Vec<R>) -> Self {
        Self {
            resources,
            cursor: None,
        }
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub(crate) fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// Request-scoped view handed to every handler call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub extensions: Extensions,
    /// Route parameters (`version`, `id`).
    pub path_params: HashMap<String, String>,
    /// Query parameters, first occurrence wins.
    pub query: HashMap<String, String>,
    /// API version from the route with any leading `v` removed.
    pub version: String,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn path_param(&self, name: &str) -> &str {
        self.path_params.get(name).map(String::as_str).unwrap_or("")
    }

    /// Token of an `Authorization: Bearer ..` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }
}

/// Domain side of one REST resource.
///
/// Implementors supply the five CRUD operations; the registry turns them
/// into routes with authentication, format negotiation, rule projection and
/// the response envelope.
#[async_trait]
pub trait ResourceHandler: Send + Sync + 'static {
    type Resource: Serialize + ResourceSchema + Send + 'static;

    /// Unique key; also the route name prefix and path segment.
    fn resource_name(&self) -> &str;

    /// Structural prototype used to validate rules. `None` is a wiring error.
    fn empty_resource(&self) -> Option<Schema> {
        Some(Self::Resource::schema())
    }

    async fn authenticate(&self, _ctx: &RequestContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn rules(&self) -> Vec<Rule> {
        Vec::new()
    }

    async fn create_resource(
        &self,
        ctx: &RequestContext,
        payload: Payload,
        version: &str,
    ) -> anyhow::Result<Self::Resource>;

    async fn read_resource(
        &self,
        ctx: &RequestContext,
        id: &str,
        version: &str,
    ) -> anyhow::Result<Self::Resource>;

    async fn read_resource_list(
        &self,
        ctx: &RequestContext,
        limit: usize,
        cursor: &str,
        version: &str,
    ) -> anyhow::Result<ResourceList<Self::Resource>>;

    async fn update_resource(
        &self,
        ctx: &RequestContext,
        id: &str,
        payload: Payload,
        version: &str,
    ) -> anyhow::Result<Self::Resource>;

    async fn delete_resource(
        &self,
        ctx: &RequestContext,
        id: &str,
        version: &str,
    ) -> anyhow::Result<Self::Resource>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut ctx = RequestContext::default();
        assert_eq!(ctx.bearer_token(), None);

        ctx.headers
            .insert("authorization", HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(ctx.bearer_token(), Some("s3cret"));

        ctx.headers
            .insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(ctx.bearer_token(), None);
    }

    #[test]
    fn empty_cursor_is_no_cursor() {
        let page = ResourceList::new(vec![1, 2]).with_cursor("");
        assert_eq!(page.next_cursor(), None);
        let page = ResourceList::new(vec![1]).with_cursor("abc");
        assert_eq!(page.next_cursor(), Some("abc"));
    }
}

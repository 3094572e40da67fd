#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use parking_lot::Mutex;
use restkit::{
    async_trait, FieldType, Payload, RequestContext, ResourceHandler, ResourceList,
    ResourceSchema, Rule, Schema, StructSchema,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, ResourceSchema)]
pub struct TestResource {
    pub foo: String,
}

impl TestResource {
    pub fn new(foo: &str) -> Self {
        Self { foo: foo.into() }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Prototype {
    #[default]
    Typed,
    Nil,
    Scalar(FieldType),
    Struct(StructSchema),
}

/// What each call observed, for assertions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Call {
    pub op: &'static str,
    pub id: String,
    pub version: String,
    pub payload: Option<Payload>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// Scriptable handler: every operation returns `result`, or fails with
/// `fail_with` when set.
#[derive(Clone)]
pub struct MockHandler {
    pub name: String,
    pub rules: Vec<Rule>,
    pub auth_error: Option<String>,
    pub fail_with: Option<String>,
    pub result: TestResource,
    pub list: Vec<TestResource>,
    pub cursor: Option<String>,
    pub prototype: Prototype,
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub empty_resource_calls: Arc<AtomicUsize>,
}

impl MockHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
            auth_error: None,
            fail_with: None,
            result: TestResource::new("bar"),
            list: Vec::new(),
            cursor: None,
            prototype: Prototype::Typed,
            calls: Arc::default(),
            empty_resource_calls: Arc::default(),
        }
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn returning(mut self, foo: &str) -> Self {
        self.result = TestResource::new(foo);
        self
    }

    pub fn failing(mut self, msg: &str) -> Self {
        self.fail_with = Some(msg.into());
        self
    }

    pub fn unauthorized(mut self, msg: &str) -> Self {
        self.auth_error = Some(msg.into());
        self
    }

    pub fn listing(mut self, items: &[&str], cursor: Option<&str>) -> Self {
        self.list = items.iter().map(|s| TestResource::new(s)).collect();
        self.cursor = cursor.map(str::to_string);
        self
    }

    pub fn prototype(mut self, prototype: Prototype) -> Self {
        self.prototype = prototype;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn empty_resource_calls(&self) -> usize {
        self.empty_resource_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) -> anyhow::Result<()> {
        self.calls.lock().push(call);
        match &self.fail_with {
            Some(msg) => Err(anyhow::anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ResourceHandler for MockHandler {
    type Resource = TestResource;

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn empty_resource(&self) -> Option<Schema> {
        self.empty_resource_calls.fetch_add(1, Ordering::SeqCst);
        match &self.prototype {
            Prototype::Typed => Some(TestResource::schema()),
            Prototype::Nil => None,
            Prototype::Scalar(t) => Some(Schema::Scalar(*t)),
            Prototype::Struct(s) => Some(Schema::Struct(s.clone())),
        }
    }

    async fn authenticate(&self, _ctx: &RequestContext) -> anyhow::Result<()> {
        match &self.auth_error {
            Some(msg) => Err(anyhow::anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    fn rules(&self) -> Vec<Rule> {
        self.rules.clone()
    }

    async fn create_resource(
        &self,
        _ctx: &RequestContext,
        payload: Payload,
        version: &str,
    ) -> anyhow::Result<TestResource> {
        self.record(Call {
            op: "create",
            version: version.into(),
            payload: Some(payload),
            ..Default::default()
        })?;
        Ok(self.result.clone())
    }

    async fn read_resource(
        &self,
        _ctx: &RequestContext,
        id: &str,
        version: &str,
    ) -> anyhow::Result<TestResource> {
        self.record(Call {
            op: "read",
            id: id.into(),
            version: version.into(),
            ..Default::default()
        })?;
        Ok(self.result.clone())
    }

    async fn read_resource_list(
        &self,
        _ctx: &RequestContext,
        limit: usize,
        cursor: &str,
        version: &str,
    ) -> anyhow::Result<ResourceList<TestResource>> {
        self.record(Call {
            op: "readList",
            version: version.into(),
            limit: Some(limit),
            cursor: Some(cursor.into()),
            ..Default::default()
        })?;
        Ok(ResourceList {
            resources: self.list.clone(),
            cursor: self.cursor.clone(),
        })
    }

    async fn update_resource(
        &self,
        _ctx: &RequestContext,
        id: &str,
        payload: Payload,
        version: &str,
    ) -> anyhow::Result<TestResource> {
        self.record(Call {
            op: "update",
            id: id.into(),
            version: version.into(),
            payload: Some(payload),
            ..Default::default()
        })?;
        Ok(self.result.clone())
    }

    async fn delete_resource(
        &self,
        _ctx: &RequestContext,
        id: &str,
        version: &str,
    ) -> anyhow::Result<TestResource> {
        self.record(Call {
            op: "delete",
            id: id.into(),
            version: version.into(),
            ..Default::default()
        })?;
        Ok(self.result.clone())
    }
}

pub fn request(method: &str, uri: &str, body: Option<&str>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_string(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

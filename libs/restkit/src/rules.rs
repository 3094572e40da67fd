//! Field-level projection rules
//!
//! A [`Rule`] renames a field on output, declares it output-only, and may pin
//! the field's type. Rules are checked against the resource's [`Schema`] once
//! at startup (see [`validate_field`]) and compiled into an
//! [`OutputProjection`] at registration, so the per-request work is a single
//! pass over the serialized object.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::handler::Payload;
use crate::schema::{FieldType, ResourceSchema, Schema, StructSchema};

/// Handling policy for one field of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Rust identifier of the field on the resource type.
    pub field: String,
    /// Output key override. Empty keeps the serialized key.
    #[serde(default)]
    pub field_alias: String,
    /// Emitted on output, rejected on input.
    #[serde(default)]
    pub output_only: bool,
    #[serde(default, rename = "type")]
    pub field_type: FieldType,
}

impl Rule {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Default::default()
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.field_alias = alias.into();
        self
    }

    pub fn output_only(mut self) -> Self {
        self.output_only = true;
        self
    }

    pub fn typed(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule does not name a field")]
    EmptyField,
    #[error("field '{field}' does not exist on {type_name}")]
    UnknownField {
        field: String,
        type_name: &'static str,
    },
    #[error("field '{field}' is declared as {declared} but is {actual}")]
    TypeMismatch {
        field: String,
        declared: FieldType,
        actual: FieldType,
    },
    #[error("fields '{first}' and '{second}' are both emitted as '{key}'")]
    AliasCollision {
        key: String,
        first: String,
        second: String,
    },
}

/// Check one rule against a struct's descriptor table.
pub fn validate_field(schema: &StructSchema, rule: &Rule) -> Result<(), RuleError> {
    if rule.field.is_empty() {
        return Err(RuleError::EmptyField);
    }
    let field = schema
        .field(&rule.field)
        .ok_or_else(|| RuleError::UnknownField {
            field: rule.field.clone(),
            type_name: schema.type_name,
        })?;
    if rule.field_type.is_specified() && rule.field_type != field.field_type {
        return Err(RuleError::TypeMismatch {
            field: rule.field.clone(),
            declared: rule.field_type,
            actual: field.field_type,
        });
    }
    Ok(())
}

/// Check that no two fields end up under the same output key once aliases
/// are applied.
pub fn check_output_keys(schema: &StructSchema, rules: &[Rule]) -> Result<(), RuleError> {
    let projection = OutputProjection::for_struct(rules, schema);
    let mut emitted: HashMap<&str, &str> = HashMap::with_capacity(schema.fields.len());
    for field in &schema.fields {
        let key = projection.output_key(field.key);
        if let Some(first) = emitted.insert(key, field.name) {
            return Err(RuleError::AliasCollision {
                key: key.to_string(),
                first: first.to_string(),
                second: field.name.to_string(),
            });
        }
    }
    Ok(())
}

/// Output key renames compiled from a rule set.
#[derive(Debug, Clone, Default)]
pub struct OutputProjection {
    // serialized key -> alias
    renames: HashMap<String, String>,
}

impl OutputProjection {
    /// Compile rules against a schema. Rules naming unknown fields are ignored
    /// here; `validate_field` is where they are reported.
    pub fn compile(rules: &[Rule], schema: &Schema) -> Self {
        match schema.as_struct() {
            Some(schema) => Self::for_struct(rules, schema),
            None => Self::default(),
        }
    }

    fn for_struct(rules: &[Rule], schema: &StructSchema) -> Self {
        let renames = rules
            .iter()
            .filter(|r| !r.field_alias.is_empty())
            .filter_map(|r| {
                schema
                    .field(&r.field)
                    .map(|f| (f.key.to_string(), r.field_alias.clone()))
            })
            .collect();
        Self { renames }
    }

    /// Key a field serialized under `key` is emitted as.
    pub fn output_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.renames.get(key).map(String::as_str).unwrap_or(key)
    }

    pub fn is_identity(&self) -> bool {
        self.renames.is_empty()
    }

    /// Rename keys of a serialized resource. Non-object values pass through.
    pub fn apply(&self, value: Value) -> Value {
        if self.is_identity() {
            return value;
        }
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| match self.renames.get(&k) {
                        Some(alias) => (alias.clone(), v),
                        None => (k, v),
                    })
                    .collect(),
            ),
            other => other,
        }
    }
}

/// Serialize a resource and apply output rules to it.
pub fn apply_output_rules<R>(resource: &R, rules: &[Rule]) -> Result<Value, serde_json::Error>
where
    R: Serialize + ResourceSchema,
{
    let value = serde_json::to_value(resource)?;
    Ok(OutputProjection::compile(rules, &R::schema()).apply(value))
}

/// Bring an inbound payload in line with the rules: aliased keys are mapped
/// back to the serialized key and output-only fields are dropped.
pub fn filter_input(mut payload: Payload, rules: &[Rule], schema: &Schema) -> Payload {
    let Some(schema) = schema.as_struct() else {
        return payload;
    };
    for rule in rules {
        let Some(field) = schema.field(&rule.field) else {
            continue;
        };
        let aliased = !rule.field_alias.is_empty() && rule.field_alias != field.key;
        if rule.output_only {
            payload.remove(field.key);
            if aliased {
                payload.remove(&rule.field_alias);
            }
            continue;
        }
        if aliased {
            if let Some(v) = payload.remove(&rule.field_alias) {
                payload.insert(field.key.to_string(), v);
            }
        }
    }
    payload
}

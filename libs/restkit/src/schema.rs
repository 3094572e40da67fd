//! Field descriptor tables for resource types
//!
//! Rules address fields by their Rust identifier, while the wire format uses
//! whatever key serde emits. A [`Schema`] bridges the two: it is produced once
//! per type (usually by `#[derive(ResourceSchema)]`) and consulted when rules
//! are validated at startup and compiled at registration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared or observed type of a resource field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// No constraint. Only meaningful on a [`crate::Rule`].
    #[default]
    Unspecified,
    Bool,
    /// Any signed integer.
    Int,
    /// Any unsigned integer.
    Uint,
    Float,
    String,
    /// Vectors, sets, arrays and slices.
    Sequence,
    Map,
    /// Nested structs, enums and anything else.
    Object,
}

impl FieldType {
    pub fn is_specified(self) -> bool {
        self != FieldType::Unspecified
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Unspecified => "unspecified",
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Uint => "uint",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Sequence => "sequence",
            FieldType::Map => "map",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One serializable field of a struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Rust identifier of the field.
    pub name: &'static str,
    /// Key the field is serialized under.
    pub key: &'static str,
    pub field_type: FieldType,
}

impl FieldSchema {
    pub const fn new(name: &'static str, key: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            key,
            field_type,
        }
    }
}

/// Descriptor table for a struct type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructSchema {
    pub type_name: &'static str,
    pub fields: Vec<FieldSchema>,
}

impl StructSchema {
    pub fn new(type_name: &'static str, fields: Vec<FieldSchema>) -> Self {
        Self { type_name, fields }
    }

    /// Look a field up by its Rust identifier.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look a field up by its serialized key.
    pub fn field_by_key(&self, key: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Structural shape of a prototype resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schema {
    Struct(StructSchema),
    Scalar(FieldType),
}

impl Schema {
    pub fn as_struct(&self) -> Option<&StructSchema> {
        match self {
            Schema::Struct(s) => Some(s),
            Schema::Scalar(_) => None,
        }
    }

    /// Short human-readable description, used in configuration errors.
    pub fn describe(&self) -> String {
        match self {
            Schema::Struct(s) => format!("struct {}", s.type_name),
            Schema::Scalar(t) => t.to_string(),
        }
    }
}

/// Types that can describe their own serialized shape.
///
/// Derive it with `#[derive(ResourceSchema)]` on structs with named fields.
pub trait ResourceSchema {
    fn schema() -> Schema;
}

macro_rules! scalar_schema {
    ($kind:ident => $($ty:ty),+ $(,)?) => {
        $(
            impl ResourceSchema for $ty {
                fn schema() -> Schema {
                    Schema::Scalar(FieldType::$kind)
                }
            }
        )+
    };
}

scalar_schema!(Int => i8, i16, i32, i64, i128, isize);
scalar_schema!(Uint => u8, u16, u32, u64, u128, usize);
scalar_schema!(Float => f32, f64);
scalar_schema!(Bool => bool);
scalar_schema!(String => String, char);

impl<T> ResourceSchema for Vec<T> {
    fn schema() -> Schema {
        Schema::Scalar(FieldType::Sequence)
    }
}

impl ResourceSchema for serde_json::Value {
    fn schema() -> Schema {
        Schema::Scalar(FieldType::Object)
    }
}

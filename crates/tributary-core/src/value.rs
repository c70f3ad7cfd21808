//! Values and type descriptors: the data model for Tributary.
//!
//! Every channel carries a [`Value`]. Transformers describe what they accept
//! and produce with a [`ValueType`], which composers check once at
//! construction time rather than on every item.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A JSON-like value flowing between transformers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Record(IndexMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Record(fields) => Some(fields),
            _ => None,
        }
    }

    /// Short name of this value's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Record(_) => "record",
        }
    }
}

/// Values display as compact JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(arr: Vec<T>) -> Self {
        Value::Array(arr.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(fields: IndexMap<String, Value>) -> Self {
        Value::Record(fields)
    }
}

/// Describes the values a transformer accepts or produces.
///
/// `Any` means "not declared": it is compatible with every other descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ValueType {
    #[default]
    Any,
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Record(RecordType),
}

impl ValueType {
    /// Whether this descriptor says anything about the value.
    pub fn is_known(&self) -> bool {
        !matches!(self, ValueType::Any)
    }

    pub fn as_record(&self) -> Option<&RecordType> {
        match self {
            ValueType::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Check whether values described by `self` may be handed to something
    /// expecting `expected`.
    pub fn compatible_with(&self, expected: &ValueType) -> bool {
        !self.is_known() || !expected.is_known() || self == expected
    }

    /// The zero value for this descriptor.
    pub fn zero_value(&self) -> Value {
        match self {
            ValueType::Any | ValueType::Null => Value::Null,
            ValueType::Bool => Value::Bool(false),
            ValueType::Int => Value::Int(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::String => Value::String(String::new()),
            ValueType::Array => Value::Array(Vec::new()),
            ValueType::Record(record) => Value::Record(record.zero_fields()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Null => f.write_str("null"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::String => f.write_str("string"),
            ValueType::Array => f.write_str("array"),
            ValueType::Record(record) => write!(f, "{record}"),
        }
    }
}

/// One declared field of a record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Field name; also the key used in record values.
    pub name: String,
    /// Alternative name accepted when selecting fields by name.
    pub alias: Option<String>,
    pub ty: ValueType,
}

/// An ordered list of fields. Position is meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordType {
    fields: Vec<FieldDecl>,
}

impl RecordType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn field(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            alias: None,
            ty,
        });
        self
    }

    /// Append a field that can also be selected by `alias`.
    pub fn aliased_field(
        mut self,
        name: impl Into<String>,
        alias: impl Into<String>,
        ty: ValueType,
    ) -> Self {
        self.fields.push(FieldDecl {
            name: name.into(),
            alias: Some(alias.into()),
            ty,
        });
        self
    }

    /// Append an already-built declaration.
    pub fn push(&mut self, decl: FieldDecl) {
        self.fields.push(decl);
    }

    pub fn fields(&self) -> &[FieldDecl] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A record value with every field set to its zero value.
    pub fn zero_fields(&self) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.ty.zero_value()))
            .collect()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("record{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.ty)?;
        }
        f.write_str("}")
    }
}

/// Rust types that map onto a [`ValueType`].
///
/// Used by adapters to turn ordinary functions into transformers.
pub trait Typed: Sized {
    /// Descriptor for values of this type.
    fn value_type() -> ValueType;

    /// Convert from a value, handing the value back if the shape is wrong.
    fn from_value(value: Value) -> Result<Self, Value>;

    fn into_value(self) -> Value;
}

impl Typed for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        Ok(value)
    }

    fn into_value(self) -> Value {
        self
    }
}

impl Typed for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl Typed for i64 {
    fn value_type() -> ValueType {
        ValueType::Int
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Int(n) => Ok(n),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl Typed for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Float(n) => Ok(n),
            Value::Int(n) => Ok(n as f64),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl Typed for String {
    fn value_type() -> ValueType {
        ValueType::String
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl Typed for Vec<Value> {
    fn value_type() -> ValueType {
        ValueType::Array
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::Array(items) => Ok(items),
            other => Err(other),
        }
    }

    fn into_value(self) -> Value {
        Value::Array(self)
    }
}

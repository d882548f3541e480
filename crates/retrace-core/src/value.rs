//! Recorded value representation.
//!
//! [`TraceValue`] is the durable counterpart of a live host value: every
//! argument, receiver snapshot, env capture and outcome in a trace is one of
//! these variants. Structural recursion over it (type narrowing, literal
//! emission) is exhaustive and checked by the compiler.
//!
//! Non-finite numbers do not exist in JSON, so `Number` persists them as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A recorded host value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TraceValue {
    Undefined,
    Null,
    Bool(bool),
    Number(#[serde(with = "number_repr")] f64),
    /// Arbitrary-precision integer in decimal text.
    BigInt(String),
    String(String),
    Array(Vec<TraceValue>),
    Set(Vec<TraceValue>),
    /// Keyed map entries in insertion order.
    Map(Vec<(TraceValue, TraceValue)>),
    /// ISO-8601 timestamp.
    Date(String),
    /// Raw byte buffer.
    Binary(Vec<u8>),
    /// Typed view over a buffer (`Float32Array`, `DataView`, ...).
    View {
        kind: String,
        elements: Vec<TraceValue>,
    },
    /// Composite value; `class` is set for instances of a named class.
    Object {
        class: Option<String>,
        fields: IndexMap<String, TraceValue>,
    },
    Error {
        name: String,
        message: String,
    },
}

impl TraceValue {
    /// Builds a class-less object from `(name, value)` pairs.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TraceValue)>) -> Self {
        TraceValue::Object {
            class: None,
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Builds an instance of `class` from `(name, value)` pairs.
    pub fn instance<K: Into<String>>(
        class: impl Into<String>,
        fields: impl IntoIterator<Item = (K, TraceValue)>,
    ) -> Self {
        TraceValue::Object {
            class: Some(class.into()),
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TraceValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, TraceValue::Undefined)
    }

    /// Fields of an object-shaped value.
    pub fn fields(&self) -> Option<&IndexMap<String, TraceValue>> {
        match self {
            TraceValue::Object { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Reads one field of an object-shaped value.
    pub fn field(&self, name: &str) -> Option<&TraceValue> {
        self.fields().and_then(|fields| fields.get(name))
    }

    /// Elements of a sequence-shaped value (array, set or view).
    pub fn elements(&self) -> Option<&[TraceValue]> {
        match self {
            TraceValue::Array(items) | TraceValue::Set(items) => Some(items),
            TraceValue::View { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_label(&self) -> &'static str {
        match self {
            TraceValue::Undefined => "undefined",
            TraceValue::Null => "null",
            TraceValue::Bool(_) => "bool",
            TraceValue::Number(_) => "number",
            TraceValue::BigInt(_) => "bigint",
            TraceValue::String(_) => "string",
            TraceValue::Array(_) => "array",
            TraceValue::Set(_) => "set",
            TraceValue::Map(_) => "map",
            TraceValue::Date(_) => "date",
            TraceValue::Binary(_) => "binary",
            TraceValue::View { .. } => "view",
            TraceValue::Object { .. } => "object",
            TraceValue::Error { .. } => "error",
        }
    }
}

impl From<serde_json::Value> for TraceValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => TraceValue::Null,
            serde_json::Value::Bool(b) => TraceValue::Bool(b),
            serde_json::Value::Number(n) => TraceValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => TraceValue::String(s),
            serde_json::Value::Array(items) => {
                TraceValue::Array(items.into_iter().map(TraceValue::from).collect())
            }
            serde_json::Value::Object(map) => TraceValue::Object {
                class: None,
                fields: map.into_iter().map(|(k, v)| (k, TraceValue::from(v))).collect(),
            },
        }
    }
}

impl From<f64> for TraceValue {
    fn from(n: f64) -> Self {
        TraceValue::Number(n)
    }
}

impl From<&str> for TraceValue {
    fn from(s: &str) -> Self {
        TraceValue::String(s.to_string())
    }
}

impl From<bool> for TraceValue {
    fn from(b: bool) -> Self {
        TraceValue::Bool(b)
    }
}

mod number_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_str("-Infinity")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Finite(f64),
        Symbol(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Finite(n) => Ok(n),
            Repr::Symbol(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid number symbol '{other}'"))),
            },
        }
    }
}

//! Dynamic SQL values.
//!
//! [`SqlValue`] is the single value type that flows through the builder: it
//! renders to a PostgreSQL literal in predicate position and binds as a
//! positional parameter in payload position.

use std::fmt;
use std::sync::Arc;

use bytes::BytesMut;
use chrono::NaiveDateTime;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// Render format for timestamp literals.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

type ToSqlError = Box<dyn std::error::Error + Sync + Send>;

/// A dynamic value accepted by the SQL builder.
#[derive(Clone)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Text.
    Text(String),
    /// Timestamp without time zone, rendered as local wall-clock time.
    Timestamp(NaiveDateTime),
    /// Array of values.
    Array(Vec<SqlValue>),
    /// Arbitrary JSON payload.
    Json(serde_json::Value),
    /// Deferred value: invoked with no arguments at render or bind time,
    /// then dispatched again on the returned value.
    Lazy(Arc<dyn Fn() -> SqlValue + Send + Sync>),
}

impl SqlValue {
    /// Resolves deferred values; everything else is returned as-is.
    #[must_use]
    pub fn resolved(&self) -> Self {
        match self {
            Self::Lazy(produce) => produce().resolved(),
            other => other.clone(),
        }
    }

    /// Returns whether the resolved value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.resolved(), Self::Null)
    }

    /// Convenience constructor for a deferred value.
    pub fn lazy(produce: impl Fn() -> SqlValue + Send + Sync + 'static) -> Self {
        Self::Lazy(Arc::new(produce))
    }
}

impl fmt::Debug for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Text(v) => f.debug_tuple("Text").field(v).finish(),
            Self::Timestamp(v) => f.debug_tuple("Timestamp").field(v).finish(),
            Self::Array(v) => f.debug_tuple("Array").field(v).finish(),
            Self::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl PartialEq for SqlValue {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(value: NaiveDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Vec<SqlValue>> for SqlValue {
    fn from(value: Vec<SqlValue>) -> Self {
        Self::Array(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(0.0)), Self::Int),
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            },
            object => Self::Json(object),
        }
    }
}

// Serialization feeds the cache fingerprint: it must be deterministic for a
// fixed value, so deferred values are resolved before serializing.
impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Timestamp(v) => {
                serializer.serialize_str(&v.format(TIMESTAMP_FORMAT).to_string())
            },
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            },
            Self::Json(v) => v.serialize(serializer),
            Self::Lazy(produce) => produce().serialize(serializer),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => v.to_sql(ty, out),
            Self::Int(v) => int_to_sql(*v, ty, out),
            Self::Float(v) => float_to_sql(*v, ty, out),
            Self::Text(v) => v.to_sql(ty, out),
            Self::Timestamp(v) => timestamp_to_sql(*v, ty, out),
            Self::Array(items) => items.to_sql(ty, out),
            Self::Json(v) => json_to_sql(v, ty, out),
            Self::Lazy(produce) => produce().resolved().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Dynamic values adapt to whatever the statement expects.
        true
    }

    to_sql_checked!();
}

/// Binds an integer, adapting to the parameter type the statement expects.
#[allow(clippy::cast_precision_loss)]
fn int_to_sql(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
    match ty.name() {
        "int2" => i16::try_from(value)?.to_sql(ty, out),
        "int4" => i32::try_from(value)?.to_sql(ty, out),
        "float4" | "float8" => (value as f64).to_sql(ty, out),
        "numeric" => Decimal::from(value).to_sql(ty, out),
        "text" | "varchar" => value.to_string().to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

/// Binds a float, adapting to the parameter type the statement expects.
fn float_to_sql(value: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, ToSqlError> {
    match ty.name() {
        "numeric" => Decimal::from_f64(value)
            .ok_or_else(|| -> ToSqlError { format!("{value} is not a valid numeric").into() })?
            .to_sql(ty, out),
        "float4" => {
            #[allow(clippy::cast_possible_truncation)]
            let narrowed = value as f32;
            narrowed.to_sql(ty, out)
        },
        "text" | "varchar" => value.to_string().to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

/// Binds a timestamp, adapting to the parameter type the statement expects.
fn timestamp_to_sql(
    value: NaiveDateTime,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, ToSqlError> {
    match ty.name() {
        "timestamptz" => chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
            value,
            chrono::Utc,
        )
        .to_sql(ty, out),
        "date" => value.date().to_sql(ty, out),
        "text" | "varchar" => value.format(TIMESTAMP_FORMAT).to_string().to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

/// Binds a JSON value, falling back to its text rendering for text columns.
fn json_to_sql(
    value: &serde_json::Value,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, ToSqlError> {
    match ty.name() {
        "text" | "varchar" => value.to_string().to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

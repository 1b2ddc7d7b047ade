//! Typed SQL parameter values.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A typed value that can be bound as a SQL parameter.
///
/// This enum covers the value kinds Spectro's query generator can produce
/// from a schema-described column. It deliberately does not try to mirror
/// every Postgres type; composite/range/custom types round-trip as `Json`.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Array(Vec<SqlParam>),
}

impl SqlParam {
    /// The Postgres type name this parameter should be cast to, if any.
    ///
    /// Used when a placeholder needs an explicit `::type` cast to disambiguate
    /// an untyped literal (e.g. for array parameters, or `NULL` in a context
    /// Postgres can't infer from).
    pub fn pg_type(&self) -> Option<&'static str> {
        match self {
            SqlParam::Null => None,
            SqlParam::Bool(_) => Some("boolean"),
            SqlParam::Int(_) => Some("bigint"),
            SqlParam::Float(_) => Some("double precision"),
            SqlParam::Text(_) => Some("text"),
            SqlParam::Bytes(_) => Some("bytea"),
            SqlParam::Json(_) => Some("jsonb"),
            SqlParam::Uuid(_) => Some("uuid"),
            SqlParam::Timestamp(_) => Some("timestamptz"),
            SqlParam::Array(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlParam::Null)
    }
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(v as i64)
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<f32> for SqlParam {
    fn from(v: f32) -> Self {
        SqlParam::Float(v as f64)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(v: Vec<u8>) -> Self {
        SqlParam::Bytes(v)
    }
}

impl From<serde_json::Value> for SqlParam {
    fn from(v: serde_json::Value) -> Self {
        SqlParam::Json(v)
    }
}

impl From<Uuid> for SqlParam {
    fn from(v: Uuid) -> Self {
        SqlParam::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlParam {
    fn from(v: DateTime<Utc>) -> Self {
        SqlParam::Timestamp(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => SqlParam::Null,
        }
    }
}

impl<T: Into<SqlParam>> From<Vec<T>> for SqlParam {
    fn from(v: Vec<T>) -> Self {
        SqlParam::Array(v.into_iter().map(Into::into).collect())
    }
}

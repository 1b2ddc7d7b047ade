//! Polymorphic primary-key abstraction.
//!
//! Generated entity types are generic over which concrete Rust type backs
//! their primary key (`Uuid`, `i64`, `String`); the `PrimaryKeyType`
//! capability lets the rest of the crate (row mapper, repository, preload
//! engine) work uniformly across all three without reflection.

use spectro_sql::SqlParam;
use uuid::Uuid;

use crate::error::Error;

/// A Postgres column type a primary key can be backed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkFieldType {
    Uuid,
    Int,
    Text,
}

/// Capability implemented by every concrete primary-key type.
pub trait PrimaryKeyType: Clone + Send + Sync + 'static {
    fn to_postgres_value(&self) -> SqlParam;
    fn from_postgres_value(value: &SqlParam) -> Result<Self, Error>
    where
        Self: Sized;
    fn default_value() -> Self;
    fn field_type() -> PkFieldType;
}

impl PrimaryKeyType for Uuid {
    fn to_postgres_value(&self) -> SqlParam {
        SqlParam::Uuid(*self)
    }

    fn from_postgres_value(value: &SqlParam) -> Result<Self, Error> {
        match value {
            SqlParam::Uuid(u) => Ok(*u),
            SqlParam::Text(s) => Uuid::parse_str(s).map_err(|e| Error::InvalidData {
                schema: String::new(),
                column: "id".to_string(),
                reason: format!("cannot decode uuid from text: {e}"),
            }),
            other => Err(Error::InvalidData {
                schema: String::new(),
                column: "id".to_string(),
                reason: format!("cannot decode uuid from {other:?}"),
            }),
        }
    }

    fn default_value() -> Self {
        Uuid::new_v4()
    }

    fn field_type() -> PkFieldType {
        PkFieldType::Uuid
    }
}

impl PrimaryKeyType for i64 {
    fn to_postgres_value(&self) -> SqlParam {
        SqlParam::Int(*self)
    }

    fn from_postgres_value(value: &SqlParam) -> Result<Self, Error> {
        match value {
            SqlParam::Int(i) => Ok(*i),
            other => Err(Error::InvalidData {
                schema: String::new(),
                column: "id".to_string(),
                reason: format!("cannot decode int64 from {other:?}"),
            }),
        }
    }

    fn default_value() -> Self {
        0
    }

    fn field_type() -> PkFieldType {
        PkFieldType::Int
    }
}

impl PrimaryKeyType for String {
    fn to_postgres_value(&self) -> SqlParam {
        SqlParam::Text(self.clone())
    }

    fn from_postgres_value(value: &SqlParam) -> Result<Self, Error> {
        match value {
            SqlParam::Text(s) => Ok(s.clone()),
            other => Err(Error::InvalidData {
                schema: String::new(),
                column: "id".to_string(),
                reason: format!("cannot decode text from {other:?}"),
            }),
        }
    }

    fn default_value() -> Self {
        String::new()
    }

    fn field_type() -> PkFieldType {
        PkFieldType::Text
    }
}

/// A type-erased, hashable primary/foreign key value.
///
/// This is the currency the preload engine and row mapper use to key
/// `parent_pk -> [child]` maps without knowing the concrete `PrimaryKeyType`
/// of any particular entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimaryKeyValue {
    Uuid(Uuid),
    Int(i64),
    Text(String),
}

impl PrimaryKeyValue {
    pub fn to_postgres_value(&self) -> SqlParam {
        match self {
            PrimaryKeyValue::Uuid(u) => SqlParam::Uuid(*u),
            PrimaryKeyValue::Int(i) => SqlParam::Int(*i),
            PrimaryKeyValue::Text(s) => SqlParam::Text(s.clone()),
        }
    }

    pub fn from_sql_param(value: &SqlParam) -> Result<Self, Error> {
        match value {
            SqlParam::Uuid(u) => Ok(PrimaryKeyValue::Uuid(*u)),
            SqlParam::Int(i) => Ok(PrimaryKeyValue::Int(*i)),
            SqlParam::Text(s) => Ok(PrimaryKeyValue::Text(s.clone())),
            other => Err(Error::InvalidData {
                schema: String::new(),
                column: "id".to_string(),
                reason: format!("cannot key a primary/foreign key value on {other:?}"),
            }),
        }
    }
}

impl From<Uuid> for PrimaryKeyValue {
    fn from(v: Uuid) -> Self {
        PrimaryKeyValue::Uuid(v)
    }
}

impl From<i64> for PrimaryKeyValue {
    fn from(v: i64) -> Self {
        PrimaryKeyValue::Int(v)
    }
}

impl From<String> for PrimaryKeyValue {
    fn from(v: String) -> Self {
        PrimaryKeyValue::Text(v)
    }
}

/// Marker capability exposing an entity's primary key as a type-erased,
/// hashable quantity. Blanket-implemented via [`crate::entity::Entity`].
pub trait PrimaryKeyWrapper {
    fn primary_key(&self) -> PrimaryKeyValue;
}

/// Marker capability exposing a named foreign-key column as a type-erased
/// value, skipping nulls. Blanket-implemented via [`crate::entity::Entity`].
pub trait ForeignKeyWrapper {
    fn foreign_key(&self, column_name: &str) -> Option<PrimaryKeyValue>;
}

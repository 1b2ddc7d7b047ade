//! Schema descriptors and the process-wide schema registry.
//!
//! A plain data description of a table's shape, held behind a `RwLock` so
//! every entity can register itself once (typically from a
//! `lazy_static`/`OnceLock` call site) and every other part of the crate can
//! look the description up by name without re-deriving it from the `Entity`
//! impl each time.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::pk::PkFieldType;

/// One column of a mapped table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Name of the Rust struct field this column maps to.
    pub field_name: String,
    /// Name of the column in Postgres.
    pub column_name: String,
    /// Logical value type, used to pick a decode/encode path.
    pub value_type: ColumnType,
    pub nullable: bool,
    pub has_default: bool,
}

/// The logical value types Spectro understands for a mapped column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
    Timestamp,
    Json,
    Bytes,
}

/// The cardinality of a declared relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    HasMany,
    HasOne,
    BelongsTo,
    ManyToMany,
}

/// A declared relationship from one schema to another.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelationshipInfo {
    pub name: String,
    pub kind: RelationKind,
    pub related_schema_name: String,
    /// The foreign-key column name. `None` means "apply convention": for
    /// `has_many`/`has_one` this is `snake_case(parent_schema) + "_id"` on
    /// the related table; for `belongs_to` it is `relation_name + "_id"` on
    /// this table. An explicit `fk_override` on the preload spec always
    /// wins over either.
    pub foreign_key: Option<String>,
    /// Present only for `ManyToMany`: the junction table name, plus the two
    /// columns on it pointing back to each side.
    pub junction_table: Option<JunctionInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JunctionInfo {
    pub table_name: String,
    pub this_fk: String,
    pub other_fk: String,
}

/// The full shape of a mapped table, as declared by an [`crate::entity::Entity`]
/// implementation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub schema_name: String,
    pub table_name: String,
    pub primary_key: PrimaryKeyDescriptor,
    pub columns: Vec<ColumnInfo>,
    pub relationships: Vec<RelationshipInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimaryKeyDescriptor {
    pub field_name: String,
    pub column_name: String,
    pub pk_type: PkFieldType,
}

impl SchemaDescriptor {
    /// Columns eligible for an `INSERT`: every mapped column except ones
    /// that carry a database-side default and were left unset — callers
    /// decide that at the repository layer, this just lists the candidates.
    pub fn insertable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter()
    }

    pub fn column(&self, column_name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.column_name == column_name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipInfo> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Resolve the foreign-key column a preload against `relationship`
    /// should group children by, honoring the explicit-override-always-wins
    /// rule and falling back to the `has_many`/`has_one` vs. `belongs_to`
    /// naming convention otherwise.
    pub fn resolve_foreign_key(&self, relationship: &RelationshipInfo) -> String {
        if let Some(fk) = &relationship.foreign_key {
            return fk.clone();
        }
        match relationship.kind {
            RelationKind::HasMany | RelationKind::HasOne => {
                format!("{}_id", to_snake_case(&self.schema_name))
            }
            RelationKind::BelongsTo => format!("{}_id", relationship.name),
            RelationKind::ManyToMany => relationship
                .junction_table
                .as_ref()
                .map(|j| j.this_fk.clone())
                .unwrap_or_else(|| format!("{}_id", to_snake_case(&self.schema_name))),
        }
    }
}

/// Convert a `PascalCase` or already-`snake_case` schema name to
/// `snake_case`, the convention Postgres table/column names follow.
pub fn to_snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    for (i, ch) in input.chars().enumerate() {
        if ch.is_uppercase() {
            if i != 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Process-wide registry of [`SchemaDescriptor`]s, keyed by schema name: one
/// entry per entity type, registered once at process start. Registration is
/// idempotent: re-registering the same schema name with an identical
/// descriptor is a no-op, but a mismatched re-registration is a programmer
/// error surfaced as [`Error::InvalidSchema`].
#[derive(Clone, Default)]
pub struct SchemaRegistry {
    inner: Arc<RwLock<HashMap<String, SchemaDescriptor>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, descriptor: SchemaDescriptor) -> Result<()> {
        let mut guard = self.inner.write().await;
        match guard.get(&descriptor.schema_name) {
            Some(existing) if *existing == descriptor => Ok(()),
            Some(existing) => Err(Error::InvalidSchema {
                name: descriptor.schema_name.clone(),
                reason: format!(
                    "schema already registered with a different shape (existing table \"{}\", new table \"{}\")",
                    existing.table_name, descriptor.table_name
                ),
            }),
            None => {
                guard.insert(descriptor.schema_name.clone(), descriptor);
                Ok(())
            }
        }
    }

    pub async fn lookup(&self, schema_name: &str) -> Option<SchemaDescriptor> {
        self.inner.read().await.get(schema_name).cloned()
    }

    pub async fn require(&self, schema_name: &str) -> Result<SchemaDescriptor> {
        self.lookup(schema_name).await.ok_or_else(|| Error::InvalidSchema {
            name: schema_name.to_string(),
            reason: "no schema registered under this name".to_string(),
        })
    }
}

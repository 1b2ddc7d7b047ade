//! The N+1-safe preload engine.
//!
//! Given a batch of already-fetched parent rows and a declared relationship,
//! this issues exactly one additional query (two for many-to-many, to also
//! resolve the junction table) and groups the results by parent primary key,
//! rather than querying once per parent the way a naive accessor would.

use std::collections::HashMap;

use spectro_sql::identifier::QualifiedIdentifier;
use spectro_sql::{Expr, SelectBuilder};

use crate::connection::Connection;
use crate::entity::{Entity, Preloadable};
use crate::error::Result;
use crate::pk::PrimaryKeyValue;
use crate::schema::{RelationKind, RelationshipInfo};

/// A request to eager-load one relationship, optionally nested further.
#[derive(Clone, Debug)]
pub struct PreloadSpec {
    pub relation_name: String,
    /// Overrides the foreign-key naming convention for this one preload.
    pub fk_override: Option<String>,
    /// Relationships to preload on the *related* rows, once fetched.
    pub nested: Vec<PreloadSpec>,
}

impl PreloadSpec {
    pub fn new(relation_name: impl Into<String>) -> Self {
        Self {
            relation_name: relation_name.into(),
            fk_override: None,
            nested: Vec::new(),
        }
    }

    pub fn with_fk_override(mut self, column: impl Into<String>) -> Self {
        self.fk_override = Some(column.into());
        self
    }

    pub fn with_nested(mut self, spec: PreloadSpec) -> Self {
        self.nested.push(spec);
        self
    }

    fn resolve_foreign_key(&self, relationship: &RelationshipInfo, owner_schema_name: &str, owner: &crate::schema::SchemaDescriptor) -> String {
        if let Some(fk) = &self.fk_override {
            return fk.clone();
        }
        let _ = owner_schema_name;
        owner.resolve_foreign_key(relationship)
    }
}

/// Batch-fetch the `has_many` (or `has_one`) side of a relationship: rows in
/// the related table whose foreign key points back at one of `owner_keys`.
///
/// Returns a map from parent primary key to every matching related row,
/// built from a single `WHERE fk IN (...)` query regardless of how many
/// parents were passed in.
pub async fn load_to_many<Related: Entity + Preloadable>(
    conn: &Connection,
    owner_keys: &[PrimaryKeyValue],
    relationship: &RelationshipInfo,
    owner_schema: &crate::schema::SchemaDescriptor,
    spec: &PreloadSpec,
) -> Result<HashMap<PrimaryKeyValue, Vec<Related>>> {
    let mut grouped: HashMap<PrimaryKeyValue, Vec<Related>> = HashMap::new();
    if owner_keys.is_empty() {
        return Ok(grouped);
    }

    let fk_column = spec.resolve_foreign_key(relationship, &owner_schema.schema_name, owner_schema);
    let related_schema = Related::schema();
    let table = QualifiedIdentifier::unqualified(related_schema.table_name.clone());
    let params: Vec<_> = dedup(owner_keys).into_iter().map(|pk| pk.to_postgres_value()).collect();

    let fragment = SelectBuilder::new()
        .all_columns()
        .from_table(&table)
        .where_expr(Expr::in_list(&fk_column, params))
        .build();

    let rows = conn.fetch_all(fragment.sql(), fragment.params()).await?;
    let mut entities = Vec::with_capacity(rows.len());
    let mut fk_values = Vec::with_capacity(rows.len());
    for row in &rows {
        entities.push(Related::from_row(row)?);
        fk_values.push(fk_value_of(row, &fk_column)?);
    }

    if !spec.nested.is_empty() {
        Related::apply_preloads(&mut entities, &spec.nested, conn).await?;
    }

    for (entity, fk_value) in entities.into_iter().zip(fk_values) {
        grouped.entry(fk_value).or_default().push(entity);
    }
    Ok(grouped)
}

/// Batch-fetch the `belongs_to` side of a relationship: the one related row
/// each owner's foreign key points at.
///
/// Returns a map from *related* primary key to the related row, so the
/// caller can look up `owner.foreign_key(...)` against it. A single
/// `WHERE id IN (...)` query regardless of how many owners were passed in.
pub async fn load_to_one<Related: Entity + Preloadable>(
    conn: &Connection,
    related_keys: &[PrimaryKeyValue],
    spec: &PreloadSpec,
) -> Result<HashMap<PrimaryKeyValue, Related>> {
    let mut by_pk = HashMap::new();
    if related_keys.is_empty() {
        return Ok(by_pk);
    }

    let related_schema = Related::schema();
    let table = QualifiedIdentifier::unqualified(related_schema.table_name.clone());
    let pk_column = related_schema.primary_key.column_name.clone();
    let params: Vec<_> = dedup(related_keys).into_iter().map(|pk| pk.to_postgres_value()).collect();

    let fragment = SelectBuilder::new()
        .all_columns()
        .from_table(&table)
        .where_expr(Expr::in_list(&pk_column, params))
        .build();

    let rows = conn.fetch_all(fragment.sql(), fragment.params()).await?;
    let mut entities = Vec::with_capacity(rows.len());
    for row in &rows {
        entities.push(Related::from_row(row)?);
    }

    if !spec.nested.is_empty() {
        Related::apply_preloads(&mut entities, &spec.nested, conn).await?;
    }

    for entity in entities {
        by_pk.insert(entity.primary_key_value(), entity);
    }
    Ok(by_pk)
}

/// Batch-fetch a `many_to_many` relationship through its junction table.
///
/// Issues two queries: one against the junction table to discover which
/// related primary keys belong to which owner, and one against the related
/// table itself for the rows those keys name. Still independent of how many
/// owners were passed in.
pub async fn load_many_to_many<Related: Entity + Preloadable>(
    conn: &Connection,
    owner_keys: &[PrimaryKeyValue],
    relationship: &RelationshipInfo,
    spec: &PreloadSpec,
) -> Result<HashMap<PrimaryKeyValue, Vec<Related>>> {
    let mut grouped: HashMap<PrimaryKeyValue, Vec<Related>> = HashMap::new();
    if owner_keys.is_empty() {
        return Ok(grouped);
    }
    let junction = relationship.junction_table.as_ref().ok_or_else(|| {
        crate::error::Error::RelationshipError {
            schema: relationship.related_schema_name.clone(),
            relation: relationship.name.clone(),
            reason: "many_to_many relationship is missing its junction table info".to_string(),
        }
    })?;

    let junction_table = QualifiedIdentifier::unqualified(junction.table_name.clone());
    let owner_params: Vec<_> = dedup(owner_keys).into_iter().map(|pk| pk.to_postgres_value()).collect();
    let junction_fragment = SelectBuilder::new()
        .column(&junction.this_fk)
        .column(&junction.other_fk)
        .from_table(&junction_table)
        .where_expr(Expr::in_list(&junction.this_fk, owner_params))
        .build();

    let junction_rows = conn
        .fetch_all(junction_fragment.sql(), junction_fragment.params())
        .await?;

    let mut owner_to_related: HashMap<PrimaryKeyValue, Vec<PrimaryKeyValue>> = HashMap::new();
    let mut all_related_keys: Vec<PrimaryKeyValue> = Vec::new();
    for row in &junction_rows {
        let owner_pk = fk_value_of(row, &junction.this_fk)?;
        let related_pk = fk_value_of(row, &junction.other_fk)?;
        all_related_keys.push(related_pk.clone());
        owner_to_related.entry(owner_pk).or_default().push(related_pk);
    }

    let related_by_pk = load_to_one::<Related>(conn, &all_related_keys, spec).await?;

    for (owner_pk, related_pks) in owner_to_related {
        let mut related_rows = Vec::with_capacity(related_pks.len());
        for related_pk in related_pks {
            if let Some(related) = related_by_pk.get(&related_pk) {
                related_rows.push(related.clone());
            }
        }
        grouped.insert(owner_pk, related_rows);
    }
    Ok(grouped)
}

/// Decide which batched query a relationship needs and run it, dispatching
/// on [`RelationKind`]. This is the single entry point the repository layer
/// calls for each [`PreloadSpec`] on a fetched page of rows. If the spec
/// carries nested specs, the matching `load_*` helper recurses into them via
/// `Related::apply_preloads` once the related rows are back, so a
/// `with_nested` chain resolves bottom-up in the same N+1-safe fashion. This
/// function does not itself know how to splice the top-level result back
/// into a particular struct's `LazyRelation` field — that glue belongs to the
/// hand-written (or generated) `Preloadable` impl, which alone knows the
/// field's concrete type.
pub async fn resolve_to_many<Related: Entity + Preloadable>(
    conn: &Connection,
    owner_keys: &[PrimaryKeyValue],
    relationship: &RelationshipInfo,
    owner_schema: &crate::schema::SchemaDescriptor,
    spec: &PreloadSpec,
) -> Result<HashMap<PrimaryKeyValue, Vec<Related>>> {
    match relationship.kind {
        RelationKind::HasMany | RelationKind::HasOne => {
            load_to_many::<Related>(conn, owner_keys, relationship, owner_schema, spec).await
        }
        RelationKind::ManyToMany => {
            load_many_to_many::<Related>(conn, owner_keys, relationship, spec).await
        }
        RelationKind::BelongsTo => {
            let by_pk = load_to_one::<Related>(conn, owner_keys, spec).await?;
            Ok(by_pk.into_iter().map(|(k, v)| (k, vec![v])).collect())
        }
    }
}

fn dedup(keys: &[PrimaryKeyValue]) -> Vec<PrimaryKeyValue> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        if seen.insert(key.clone()) {
            out.push(key.clone());
        }
    }
    out
}

fn fk_value_of(row: &sqlx::postgres::PgRow, column: &str) -> Result<PrimaryKeyValue> {
    use crate::connection::column_to_param;
    for type_name in ["UUID", "INT8", "TEXT"] {
        if let Ok(param) = column_to_param(row, column, type_name) {
            if let Ok(value) = PrimaryKeyValue::from_sql_param(&param) {
                return Ok(value);
            }
        }
    }
    column_to_param(row, column, "TEXT").and_then(|p| PrimaryKeyValue::from_sql_param(&p))
}

//! The repository: one write/read surface per connection, built entirely
//! out of the query algebra and `spectro-sql`'s statement builders. This is
//! the layer application code is meant to actually call — `Query` stays a
//! lower-level building block the repository's `query()` hands out.

use spectro_sql::identifier::QualifiedIdentifier;
use spectro_sql::{ConflictTarget, DeleteBuilder, Expr, InsertBuilder, SelectBuilder, SqlParam, UpdateBuilder};

use crate::connection::Connection;
use crate::entity::{Entity, Preloadable};
use crate::error::{Error, Result};
use crate::pk::PrimaryKeyValue;
use crate::query::Query;

/// A repository bound to one [`Connection`] — either a pooled handle or a
/// single checked-out transaction. Every method here is connection-agnostic:
/// the same code path serves both, since `Connection` itself dispatches on
/// which variant it holds.
#[derive(Clone, Debug)]
pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a fresh query against `E`. Terminal operations on the returned
    /// `Query` still take a `&Connection` explicitly — `repo.connection()`
    /// supplies it — so a caller building several queries against the same
    /// repository never pays for cloning the repository itself.
    pub fn query<E: Entity + Preloadable>(&self) -> Query<E> {
        Query::new()
    }

    /// Fetch one row by primary key, if it exists.
    pub async fn get<E: Entity>(&self, pk: PrimaryKeyValue) -> Result<Option<E>> {
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let fragment = SelectBuilder::new()
            .all_columns()
            .from_table(&table)
            .where_expr(Expr::eq(&schema.primary_key.column_name, pk.to_postgres_value()))
            .limit(1)
            .build();
        let row = self.conn.fetch_optional(fragment.sql(), fragment.params()).await?;
        row.as_ref().map(E::from_row).transpose()
    }

    /// Fetch one row by primary key, failing with [`Error::NotFound`] if it
    /// doesn't exist.
    pub async fn get_or_fail<E: Entity>(&self, pk: PrimaryKeyValue) -> Result<E> {
        self.get::<E>(pk.clone()).await?.ok_or_else(|| Error::NotFound {
            schema: E::schema().schema_name.clone(),
            pk: format!("{pk:?}"),
        })
    }

    /// Build the column/value lists one row contributes to an `INSERT`,
    /// rejecting a non-nullable column with no database default left unset.
    /// Columns left `Null` that do carry a default are omitted entirely so
    /// Postgres applies its own default rather than writing an explicit
    /// `NULL` over it.
    fn insert_row<E: Entity>(entity: &E, include_pk: bool) -> Result<(Vec<String>, Vec<SqlParam>)> {
        let schema = E::schema();
        let mut columns = Vec::new();
        let mut values = Vec::new();
        if include_pk {
            columns.push(schema.primary_key.column_name.clone());
            values.push(entity.primary_key_value().to_postgres_value());
        }
        for col in schema.insertable_columns() {
            let value = entity.column_value(&col.column_name);
            if value.is_null() {
                if col.has_default {
                    continue;
                }
                if !col.nullable {
                    return Err(Error::InvalidData {
                        schema: schema.schema_name.clone(),
                        column: col.column_name.clone(),
                        reason: "non-nullable column with no database default was left unset".to_string(),
                    });
                }
            }
            columns.push(col.column_name.clone());
            values.push(value);
        }
        Ok((columns, values))
    }

    pub async fn insert<E: Entity>(&self, entity: &E, include_pk: bool) -> Result<E> {
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let (columns, values) = Self::insert_row(entity, include_pk)?;
        let fragment = InsertBuilder::new()
            .into_table(&table)
            .columns(columns)
            .values(values)
            .returning_all()
            .build();
        let row = self
            .conn
            .fetch_optional(fragment.sql(), fragment.params())
            .await?
            .ok_or_else(|| Error::InternalError("insert returned no row".to_string()))?;
        E::from_row(&row)
    }

    /// Insert every row of `entities` in a single statement. An empty slice
    /// is a no-op: no SQL is issued and an empty `Vec` comes back.
    pub async fn insert_all<E: Entity>(&self, entities: &[E], include_pk: bool) -> Result<Vec<E>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let (columns, first_row) = Self::insert_row(&entities[0], include_pk)?;
        let mut rows = vec![first_row];
        for entity in &entities[1..] {
            let (cols, values) = Self::insert_row(entity, include_pk)?;
            if cols != columns {
                return Err(Error::InvalidData {
                    schema: schema.schema_name.clone(),
                    column: String::new(),
                    reason: "every row in a batch insert must set the same columns".to_string(),
                });
            }
            rows.push(values);
        }
        let fragment = InsertBuilder::new()
            .into_table(&table)
            .columns(columns)
            .values_batch(rows)
            .map_err(|e| Error::InvalidQuery(e.to_string()))?
            .returning_all()
            .build();
        let rows = self.conn.fetch_all(fragment.sql(), fragment.params()).await?;
        rows.iter().map(E::from_row).collect()
    }

    /// Insert every row of `entities`, resolving a conflict on `target` by
    /// updating `update_columns` from `EXCLUDED` (or doing nothing if
    /// `update_columns` is empty). Always includes the primary key column,
    /// since an upsert's conflict target is the row's identity.
    pub async fn upsert<E: Entity>(
        &self,
        entities: &[E],
        target: ConflictTarget,
        update_columns: &[String],
    ) -> Result<Vec<E>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let (columns, first_row) = Self::insert_row(&entities[0], true)?;
        let mut rows = vec![first_row];
        for entity in &entities[1..] {
            let (cols, values) = Self::insert_row(entity, true)?;
            if cols != columns {
                return Err(Error::InvalidData {
                    schema: schema.schema_name.clone(),
                    column: String::new(),
                    reason: "every row in a batch upsert must set the same columns".to_string(),
                });
            }
            rows.push(values);
        }
        let mut builder = InsertBuilder::new()
            .into_table(&table)
            .columns(columns)
            .values_batch(rows)
            .map_err(|e| Error::InvalidQuery(e.to_string()))?;
        builder = if update_columns.is_empty() {
            builder.on_conflict_do_nothing()
        } else {
            let set = update_columns
                .iter()
                .map(|col| {
                    let mut excluded = spectro_sql::SqlFragment::new();
                    excluded.push(&format!("EXCLUDED.{}", spectro_sql::escape_ident(col)));
                    (col.clone(), excluded)
                })
                .collect();
            builder.on_conflict_do_update(target, set)
        };
        let fragment = builder.returning_all().build();
        let rows = self.conn.fetch_all(fragment.sql(), fragment.params()).await?;
        rows.iter().map(E::from_row).collect()
    }

    /// Apply a partial update to the row matching `entity`'s primary key,
    /// failing with [`Error::NotFound`] if no row matched.
    pub async fn update<E: Entity>(&self, entity: &E, changes: &[(String, SqlParam)]) -> Result<E> {
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let mut builder = UpdateBuilder::new().table(&table);
        for (column, value) in changes {
            builder = builder.set(column, value.clone());
        }
        let fragment = builder
            .where_expr(Expr::eq(
                &schema.primary_key.column_name,
                entity.primary_key_value().to_postgres_value(),
            ))
            .returning_all()
            .build();
        let row = self.conn.fetch_optional(fragment.sql(), fragment.params()).await?;
        match row {
            Some(row) => E::from_row(&row),
            None => Err(Error::NotFound {
                schema: schema.schema_name.clone(),
                pk: format!("{:?}", entity.primary_key_value()),
            }),
        }
    }

    /// Delete the row matching `entity`'s primary key. Deleting a
    /// already-absent row is not an error: the repository's job is to make
    /// sure the row is gone, and it already is.
    pub async fn delete<E: Entity>(&self, entity: &E) -> Result<()> {
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let fragment = DeleteBuilder::new()
            .from_table(&table)
            .where_expr(Expr::eq(
                &schema.primary_key.column_name,
                entity.primary_key_value().to_postgres_value(),
            ))
            .build();
        self.conn.execute(fragment.sql(), fragment.params()).await?;
        Ok(())
    }

    /// Run `f` inside a transaction, committing on success and rolling back
    /// (then propagating the error as [`Error::TransactionFailed`]) on
    /// failure.
    pub async fn transaction<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(Repository) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let tx_conn = self.conn.begin().await?;
        let tx_repo = Repository::new(tx_conn.clone());
        match f(tx_repo).await {
            Ok(value) => {
                tx_conn.commit().await?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx_conn.rollback().await;
                Err(err.into_transaction_failed())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pk::{PkFieldType, PrimaryKeyValue};
    use crate::schema::{ColumnInfo, ColumnType, PrimaryKeyDescriptor, SchemaDescriptor};
    use std::sync::OnceLock;

    #[derive(Clone)]
    struct Tag {
        id: uuid::Uuid,
        name: String,
    }

    impl Entity for Tag {
        fn schema() -> &'static SchemaDescriptor {
            static SCHEMA: OnceLock<SchemaDescriptor> = OnceLock::new();
            SCHEMA.get_or_init(|| SchemaDescriptor {
                schema_name: "Tag".to_string(),
                table_name: "tags".to_string(),
                primary_key: PrimaryKeyDescriptor {
                    field_name: "id".to_string(),
                    column_name: "id".to_string(),
                    pk_type: PkFieldType::Uuid,
                },
                columns: vec![ColumnInfo {
                    field_name: "name".to_string(),
                    column_name: "name".to_string(),
                    value_type: ColumnType::Text,
                    nullable: false,
                    has_default: false,
                }],
                relationships: vec![],
            })
        }

        fn from_row(_row: &sqlx::postgres::PgRow) -> std::result::Result<Self, Error> {
            unreachable!("not exercised without a live database")
        }

        fn column_value(&self, column_name: &str) -> SqlParam {
            match column_name {
                "name" => SqlParam::Text(self.name.clone()),
                _ => SqlParam::Null,
            }
        }

        fn primary_key_value(&self) -> PrimaryKeyValue {
            PrimaryKeyValue::Uuid(self.id)
        }
    }

    #[derive(Clone)]
    struct StrictTag {
        id: uuid::Uuid,
    }

    impl Entity for StrictTag {
        fn schema() -> &'static SchemaDescriptor {
            static SCHEMA: OnceLock<SchemaDescriptor> = OnceLock::new();
            SCHEMA.get_or_init(|| SchemaDescriptor {
                schema_name: "StrictTag".to_string(),
                table_name: "strict_tags".to_string(),
                primary_key: PrimaryKeyDescriptor {
                    field_name: "id".to_string(),
                    column_name: "id".to_string(),
                    pk_type: PkFieldType::Uuid,
                },
                columns: vec![ColumnInfo {
                    field_name: "slug".to_string(),
                    column_name: "slug".to_string(),
                    value_type: ColumnType::Text,
                    nullable: false,
                    has_default: false,
                }],
                relationships: vec![],
            })
        }

        fn from_row(_row: &sqlx::postgres::PgRow) -> std::result::Result<Self, Error> {
            unreachable!("not exercised without a live database")
        }

        fn column_value(&self, _column_name: &str) -> SqlParam {
            // never sets "slug" -- simulates a caller leaving a required
            // column unset.
            SqlParam::Null
        }

        fn primary_key_value(&self) -> PrimaryKeyValue {
            PrimaryKeyValue::Uuid(self.id)
        }
    }

    #[test]
    fn insert_row_rejects_missing_non_nullable_column() {
        let row = StrictTag { id: uuid::Uuid::new_v4() };
        let err = Repository::insert_row(&row, false).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }

    #[test]
    fn insert_row_includes_pk_when_requested() {
        let tag = Tag {
            id: uuid::Uuid::new_v4(),
            name: "swift".to_string(),
        };
        let (columns, values) = Repository::insert_row(&tag, true).unwrap();
        assert_eq!(columns[0], "id");
        assert!(matches!(values[0], SqlParam::Uuid(_)));
    }

    #[tokio::test]
    async fn insert_all_on_empty_slice_issues_no_query() {
        // connect_lazy never touches the network until the first query runs,
        // so this proves the empty-slice short-circuit fires before any SQL
        // would be built against a connection that isn't actually there.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/spectro_test_unused")
            .unwrap();
        let repo = Repository::new(Connection::Pool(pool));
        let result = repo.insert_all::<Tag>(&[], false).await.unwrap();
        assert!(result.is_empty());
    }
}

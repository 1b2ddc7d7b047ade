//! The query algebra: an immutable, composable description of a `SELECT`
//! against one entity, plus the terminal operations that actually run it.
//!
//! Every builder method takes `self` by value and returns a new `Query`,
//! built up fluently by application code one combinator at a time.

pub mod preload;

use std::marker::PhantomData;

use spectro_sql::identifier::QualifiedIdentifier;
use spectro_sql::{escape_ident, Expr, OrderExpr, SelectBuilder, SqlFragment};

use crate::connection::{column_to_param, Connection};
use crate::entity::{Entity, Preloadable};
use crate::error::{Error, Result};
use preload::PreloadSpec;

/// Which SQL join variant a [`JoinSpec`] lowers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// One side of a join's `ON` predicate: a column qualified by its table
/// alias, per §4.6's "two-sided column reference with an operator".
#[derive(Clone, Debug)]
pub struct JoinColumn {
    pub alias: String,
    pub column: String,
}

impl JoinColumn {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

/// A join's `ON` predicate: `left <op> right`, both sides qualified by
/// (alias, column). No parameters — join predicates compare two columns,
/// never a literal value, so there's nothing here for the generator to bind.
#[derive(Clone, Debug)]
pub struct JoinCondition {
    pub left: JoinColumn,
    pub op: &'static str,
    pub right: JoinColumn,
}

impl JoinCondition {
    pub fn eq(left: JoinColumn, right: JoinColumn) -> Self {
        Self { left, op: "=", right }
    }

    fn render(&self) -> String {
        format!(
            "{}.{} {} {}.{}",
            escape_ident(&self.left.alias),
            escape_ident(&self.left.column),
            self.op,
            escape_ident(&self.right.alias),
            escape_ident(&self.right.column)
        )
    }
}

/// One join against the query's base table: which related table, under
/// which alias, joined `Inner` or `Left`, on which predicate.
#[derive(Clone, Debug)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    pub condition: JoinCondition,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, table: impl Into<String>, alias: impl Into<String>, condition: JoinCondition) -> Self {
        Self {
            kind,
            table: table.into(),
            alias: alias.into(),
            condition,
        }
    }
}

/// An aggregate terminal operation's target column.
#[derive(Clone, Debug)]
enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

/// An immutable query against entity `E`. Cheap to clone and share; every
/// combinator returns a new value rather than mutating in place.
#[derive(Clone)]
pub struct Query<E: Entity> {
    filters: Vec<Expr>,
    order: Vec<OrderExpr>,
    limit: Option<i64>,
    offset: Option<i64>,
    joins: Vec<JoinSpec>,
    preloads: Vec<PreloadSpec>,
    for_update: bool,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            joins: Vec::new(),
            preloads: Vec::new(),
            for_update: false,
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Query<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `WHERE` condition, `AND`-combined with any already present.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn order_by(mut self, expr: OrderExpr) -> Self {
        self.order.push(expr);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Lock matching rows with `FOR UPDATE`. Only meaningful inside a
    /// transaction; running this against a pooled connection still works,
    /// it just releases the lock as soon as the implicit transaction around
    /// the single statement ends.
    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    /// Add a join against the query's base table. Joins only affect row
    /// shape for raw SQL inspection purposes here — `all`/`first` still map
    /// each result row back to `E` alone, so a join is primarily useful to
    /// filter or order by a related table's columns via `Expr::qualified_column`.
    pub fn join(mut self, spec: JoinSpec) -> Self {
        self.joins.push(spec);
        self
    }

    /// Record an eager-load request against this query's results. The
    /// engine in [`preload`] resolves these after the main rows come back.
    pub fn with_preload(mut self, spec: PreloadSpec) -> Self {
        self.preloads.push(spec);
        self
    }

    pub fn preloads(&self) -> &[PreloadSpec] {
        &self.preloads
    }

    fn combined_filter(&self) -> Option<Expr> {
        if self.filters.is_empty() {
            None
        } else {
            Some(Expr::and_all(self.filters.clone()))
        }
    }

    fn build_select(&self) -> SqlFragment {
        let schema = E::schema();
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let mut builder = if self.joins.is_empty() {
            SelectBuilder::new().all_columns().from_table(&table)
        } else {
            // Project only the base table's columns so `E::from_row` still
            // sees exactly the columns its schema declares, regardless of
            // what a joined table's row shape looks like.
            SelectBuilder::new()
                .all_columns_from(&schema.table_name)
                .from_table_as(&table, &schema.table_name)
        };

        for join in &self.joins {
            let target = QualifiedIdentifier::unqualified(join.table.clone());
            let condition = join.condition.render();
            builder = match join.kind {
                JoinKind::Inner => builder.inner_join_as(&target.name, &join.alias, &condition),
                JoinKind::Left => builder.left_join_as(&target.name, &join.alias, &condition),
            };
        }

        if let Some(filter) = self.combined_filter() {
            builder = builder.where_expr(filter);
        }
        for order in &self.order {
            builder = builder.order_by(order.clone());
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        let mut fragment = builder.build();
        if self.for_update {
            fragment.push(" FOR UPDATE");
        }
        fragment
    }

    /// Build the aggregate's `SELECT` expression. `SUM`/`MIN`/`MAX` are cast
    /// to `DOUBLE PRECISION`: Postgres returns `NUMERIC`/`BIGINT` for these
    /// over an integer column, which would otherwise fail to decode into the
    /// `f64` this crate's numeric aggregates promise (§4.5).
    fn build_aggregate(&self, aggregate: Aggregate) -> SqlFragment {
        let schema = E::schema();
        let expr = match aggregate {
            Aggregate::Count => "count(*)".to_string(),
            Aggregate::Sum(col) => format!("CAST(sum({col}) AS DOUBLE PRECISION)"),
            Aggregate::Avg(col) => format!("CAST(avg({col}) AS DOUBLE PRECISION)"),
            Aggregate::Min(col) => format!("CAST(min({col}) AS DOUBLE PRECISION)"),
            Aggregate::Max(col) => format!("CAST(max({col}) AS DOUBLE PRECISION)"),
        };
        let table = QualifiedIdentifier::unqualified(schema.table_name.clone());
        let mut builder = SelectBuilder::new()
            .column_raw(SqlFragment::raw(expr))
            .from_table(&table);
        if let Some(filter) = self.combined_filter() {
            builder = builder.where_expr(filter);
        }
        builder.build()
    }

    pub async fn count(&self, conn: &Connection) -> Result<u64> {
        let fragment = self.build_aggregate(Aggregate::Count);
        let row = conn.fetch_optional(fragment.sql(), fragment.params()).await?;
        match row {
            Some(row) => match column_to_param(&row, "count", "INT8")? {
                spectro_sql::SqlParam::Int(n) => u64::try_from(n).map_err(|_| Error::ResultDecodingFailed {
                    column: "count".to_string(),
                    reason: format!("count(*) returned a negative value: {n}"),
                }),
                other => Err(Error::ResultDecodingFailed {
                    column: "count".to_string(),
                    reason: format!("expected an integer, got {other:?}"),
                }),
            },
            None => Ok(0),
        }
    }

    pub async fn sum(&self, conn: &Connection, column: &str) -> Result<Option<f64>> {
        self.numeric_aggregate(conn, Aggregate::Sum(column.to_string())).await
    }

    pub async fn avg(&self, conn: &Connection, column: &str) -> Result<Option<f64>> {
        self.numeric_aggregate(conn, Aggregate::Avg(column.to_string())).await
    }

    pub async fn min(&self, conn: &Connection, column: &str) -> Result<Option<f64>> {
        self.numeric_aggregate(conn, Aggregate::Min(column.to_string())).await
    }

    pub async fn max(&self, conn: &Connection, column: &str) -> Result<Option<f64>> {
        self.numeric_aggregate(conn, Aggregate::Max(column.to_string())).await
    }

    async fn numeric_aggregate(&self, conn: &Connection, aggregate: Aggregate) -> Result<Option<f64>> {
        let alias = match &aggregate {
            Aggregate::Sum(_) => "sum",
            Aggregate::Avg(_) => "avg",
            Aggregate::Min(_) => "min",
            Aggregate::Max(_) => "max",
            Aggregate::Count => "count",
        };
        let fragment = self.build_aggregate(aggregate);
        let row = conn.fetch_optional(fragment.sql(), fragment.params()).await?;
        match row {
            Some(row) => match column_to_param(&row, alias, "FLOAT8")? {
                spectro_sql::SqlParam::Float(f) => Ok(Some(f)),
                spectro_sql::SqlParam::Int(i) => Ok(Some(i as f64)),
                spectro_sql::SqlParam::Null => Ok(None),
                other => Err(Error::ResultDecodingFailed {
                    column: alias.to_string(),
                    reason: format!("expected a number, got {other:?}"),
                }),
            },
            None => Ok(None),
        }
    }
}

impl<E: Entity + Preloadable> Query<E> {
    /// Run the query and return every matching row, mapped to `E`, with any
    /// requested relations eager-loaded before returning.
    pub async fn all(&self, conn: &Connection) -> Result<Vec<E>> {
        let fragment = self.build_select();
        let rows = conn.fetch_all(fragment.sql(), fragment.params()).await?;
        let mut entities = rows.iter().map(E::from_row).collect::<Result<Vec<E>>>()?;
        E::apply_preloads(&mut entities, &self.preloads, conn).await?;
        Ok(entities)
    }

    /// Run the query and return the first matching row, if any, with any
    /// requested relations eager-loaded before returning.
    pub async fn first(&self, conn: &Connection) -> Result<Option<E>> {
        let limited = self.clone().limit(1);
        let fragment = limited.build_select();
        let row = conn.fetch_optional(fragment.sql(), fragment.params()).await?;
        let Some(row) = row else { return Ok(None) };
        let mut entities = vec![E::from_row(&row)?];
        E::apply_preloads(&mut entities, &self.preloads, conn).await?;
        Ok(entities.pop())
    }

    /// Run the query and return the first matching row, failing with
    /// [`Error::NotFound`] if there isn't one.
    pub async fn first_or_fail(&self, conn: &Connection) -> Result<E> {
        self.first(conn).await?.ok_or_else(|| Error::NotFound {
            schema: E::schema().schema_name.clone(),
            pk: "<query>".to_string(),
        })
    }
}

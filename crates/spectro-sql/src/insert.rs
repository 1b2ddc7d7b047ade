//! INSERT statement builder.

use crate::{
    builder::SqlFragment,
    error::SqlGenError,
    identifier::{escape_ident, from_qi, QualifiedIdentifier},
    param::SqlParam,
};

/// Builder for INSERT statements.
#[derive(Clone, Debug, Default)]
pub struct InsertBuilder {
    table: Option<SqlFragment>,
    columns: Vec<String>,
    values: Vec<Vec<SqlFragment>>,
    on_conflict: Option<OnConflict>,
    returning: Vec<SqlFragment>,
}

/// What an `ON CONFLICT` clause targets.
#[derive(Clone, Debug)]
pub enum ConflictTarget {
    /// `ON CONFLICT (col1, col2, ...)`
    Columns(Vec<String>),
    /// `ON CONFLICT ON CONSTRAINT name`
    Constraint(String),
}

#[derive(Clone, Debug)]
pub enum OnConflict {
    DoNothing,
    DoUpdate {
        target: ConflictTarget,
        set: Vec<(String, SqlFragment)>,
        where_clause: Option<SqlFragment>,
    },
}

impl InsertBuilder {
    /// Create a new INSERT builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target table.
    pub fn into_table(mut self, qi: &QualifiedIdentifier) -> Self {
        self.table = Some(SqlFragment::raw(from_qi(qi)));
        self
    }

    /// Set the columns to insert.
    pub fn columns(mut self, cols: Vec<String>) -> Self {
        self.columns = cols;
        self
    }

    /// Add a single row of values.
    pub fn values(mut self, vals: Vec<SqlParam>) -> Self {
        let row: Vec<SqlFragment> = vals
            .into_iter()
            .map(|v| {
                let mut frag = SqlFragment::new();
                frag.push_param(v);
                frag
            })
            .collect();
        self.values.push(row);
        self
    }

    /// Add a row of raw SQL values.
    pub fn values_raw(mut self, vals: Vec<SqlFragment>) -> Self {
        self.values.push(vals);
        self
    }

    /// Add every row of a bulk insert at once.
    ///
    /// Unlike repeated calls to [`Self::values`], this rejects a batch of
    /// zero rows outright: a caller that meant to insert N rows and wound up
    /// with an empty `Vec` should get an error, not a silent `DEFAULT VALUES`
    /// single-row insert.
    pub fn values_batch(mut self, rows: Vec<Vec<SqlParam>>) -> Result<Self, SqlGenError> {
        if rows.is_empty() {
            return Err(SqlGenError::EmptyBatch);
        }
        for row in rows {
            self = self.values(row);
        }
        Ok(self)
    }

    /// Set ON CONFLICT DO NOTHING.
    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.on_conflict = Some(OnConflict::DoNothing);
        self
    }

    /// Set ON CONFLICT DO UPDATE, targeting a set of columns.
    pub fn on_conflict_do_update(
        mut self,
        target: ConflictTarget,
        set: Vec<(String, SqlFragment)>,
    ) -> Self {
        self.on_conflict = Some(OnConflict::DoUpdate {
            target,
            set,
            where_clause: None,
        });
        self
    }

    /// Add RETURNING clause.
    pub fn returning(mut self, column: &str) -> Self {
        self.returning
            .push(SqlFragment::raw(escape_ident(column)));
        self
    }

    /// Add RETURNING * clause.
    pub fn returning_all(mut self) -> Self {
        self.returning.push(SqlFragment::raw("*"));
        self
    }

    /// Build the INSERT statement.
    pub fn build(self) -> SqlFragment {
        let mut result = SqlFragment::new();

        result.push("INSERT INTO ");

        if let Some(table) = self.table {
            result.append(table);
        }

        // Columns
        if !self.columns.is_empty() {
            result.push(" (");
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    result.push(", ");
                }
                result.push(&escape_ident(col));
            }
            result.push(")");
        }

        // VALUES
        if !self.values.is_empty() {
            result.push(" VALUES ");
            for (i, row) in self.values.into_iter().enumerate() {
                if i > 0 {
                    result.push(", ");
                }
                result.push("(");
                for (j, val) in row.into_iter().enumerate() {
                    if j > 0 {
                        result.push(", ");
                    }
                    result.append(val);
                }
                result.push(")");
            }
        } else {
            result.push(" DEFAULT VALUES");
        }

        // ON CONFLICT
        if let Some(conflict) = self.on_conflict {
            match conflict {
                OnConflict::DoNothing => {
                    result.push(" ON CONFLICT DO NOTHING");
                }
                OnConflict::DoUpdate {
                    target,
                    set,
                    where_clause,
                } => {
                    result.push(" ON CONFLICT ");
                    match target {
                        ConflictTarget::Columns(columns) => {
                            result.push("(");
                            for (i, col) in columns.iter().enumerate() {
                                if i > 0 {
                                    result.push(", ");
                                }
                                result.push(&escape_ident(col));
                            }
                            result.push(")");
                        }
                        ConflictTarget::Constraint(name) => {
                            result.push("ON CONSTRAINT ");
                            result.push(&escape_ident(&name));
                        }
                    }
                    result.push(" DO UPDATE SET ");
                    for (i, (col, val)) in set.into_iter().enumerate() {
                        if i > 0 {
                            result.push(", ");
                        }
                        result.push(&escape_ident(&col));
                        result.push(" = ");
                        result.append(val);
                    }
                    if let Some(where_sql) = where_clause {
                        result.push(" WHERE ");
                        result.append(where_sql);
                    }
                }
            }
        }

        // RETURNING
        if !self.returning.is_empty() {
            result.push(" RETURNING ");
            for (i, ret) in self.returning.into_iter().enumerate() {
                if i > 0 {
                    result.push(", ");
                }
                result.append(ret);
            }
        }

        result
    }
}

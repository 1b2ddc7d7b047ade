//! Parameterized SQL fragment builder for Spectro.
//!
//! Provides a safe way to construct SQL queries without string concatenation,
//! using parameterized queries to prevent SQL injection. This crate knows
//! nothing about schemas, entities, or the query algebra above it — it only
//! renders already-decided SQL shapes into a `(sql, params)` pair.

mod builder;
mod error;
mod expr;
pub mod identifier;
mod param;
mod select;
mod insert;
mod update;
mod delete;

pub use builder::{SqlBuilder, SqlFragment};
pub use error::SqlGenError;
pub use expr::{Expr, OrderExpr};
pub use identifier::{escape_ident, quote_literal, from_qi, QualifiedIdentifier};
pub use param::SqlParam;
pub use select::SelectBuilder;
pub use insert::{ConflictTarget, InsertBuilder, OnConflict};
pub use update::UpdateBuilder;
pub use delete::DeleteBuilder;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        SqlBuilder, SqlFragment, SqlGenError, SqlParam,
        SelectBuilder, InsertBuilder, UpdateBuilder, DeleteBuilder,
        ConflictTarget, OnConflict,
        Expr, OrderExpr,
        escape_ident, quote_literal, from_qi,
    };
}

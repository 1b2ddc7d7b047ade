//! Errors the SQL generator itself can raise.
//!
//! Distinct from `spectro_core::Error` — this crate has no notion of schemas
//! or connections, only of malformed requests to build SQL.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlGenError {
    /// A bulk operation was asked to build SQL for zero rows. Emitting the
    /// single-row builder's fallback (`DEFAULT VALUES`) here would silently
    /// insert a row of defaults instead of doing nothing, so this is rejected
    /// before any SQL is produced.
    #[error("cannot build SQL for an empty batch")]
    EmptyBatch,
}

//! Runtime support for Spectro: schema registration, row mapping, SQL
//! generation via `spectro-sql`, the query algebra, lazy relations, the
//! N+1-safe preload engine, the repository, the migration runner, and the
//! connection/transaction core everything else runs against.
//!
//! This crate is deliberately a runtime library, not a macro crate: it
//! defines the shape (`Entity`, `HasRelation`, `Preloadable`) a derive macro
//! would target, and hand-written impls of that shape are exercised
//! throughout the test suite in lieu of generated code.

pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod lazy;
pub mod migration;
pub mod pk;
pub mod query;
pub mod repository;
pub mod schema;

pub use config::SpectroConfig;
pub use connection::Connection;
pub use entity::{Entity, HasRelation, Preloadable};
pub use error::{Error, Result};
pub use lazy::{LazyRelation, LoadState};
pub use pk::{PkFieldType, PrimaryKeyValue};
pub use query::preload::PreloadSpec;
pub use query::{JoinColumn, JoinCondition, JoinKind, JoinSpec, Query};
pub use repository::Repository;
pub use schema::{SchemaDescriptor, SchemaRegistry};

/// Re-exports convenient for a binary or another crate embedding Spectro.
pub mod prelude {
    pub use crate::config::SpectroConfig;
    pub use crate::connection::Connection;
    pub use crate::entity::{Entity, HasRelation, Preloadable};
    pub use crate::error::{Error, Result};
    pub use crate::lazy::LazyRelation;
    pub use crate::pk::PrimaryKeyValue;
    pub use crate::query::preload::PreloadSpec;
    pub use crate::query::{JoinColumn, JoinCondition, JoinKind, JoinSpec, Query};
    pub use crate::repository::Repository;
    pub use crate::schema::SchemaDescriptor;
    pub use spectro_sql::prelude::*;
}

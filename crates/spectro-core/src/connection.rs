//! Connection and transaction core.
//!
//! `Connection` owns either a shared `PgPool` or a single checked-out
//! transaction, so the query builder and repository can run against either
//! through the same type without branching on call sites.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::config::SpectroConfig;
use crate::error::{Error, Result};
use spectro_sql::SqlParam;

/// Pool sizing and timeouts, mirroring the subset of [`SpectroConfig`] that
/// governs connection acquisition.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub statement_timeout: Duration,
}

impl From<&SpectroConfig> for PoolConfig {
    fn from(config: &SpectroConfig) -> Self {
        Self {
            max_connections: config.max_pool_size,
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
        }
    }
}

/// Something the query builder and repository can run SQL against: either
/// the shared pool or a single transaction checked out for the duration of
/// a unit of work.
///
/// The transaction variant wraps its `sqlx::Transaction` in a `Mutex` so
/// `Connection` stays `Clone`, matching how the pool variant is already
/// cheap to clone — both the preload engine and nested queries need to hold
/// their own handle to "the current way to talk to Postgres" without
/// threading a `&mut` borrow through the whole call tree.
#[derive(Clone)]
pub enum Connection {
    Pool(PgPool),
    Transaction(Arc<Mutex<Transaction<'static, Postgres>>>),
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Connection::Pool(pool) => f
                .debug_struct("Connection::Pool")
                .field("size", &pool.size())
                .field("num_idle", &pool.num_idle())
                .finish(),
            Connection::Transaction(_) => f.debug_struct("Connection::Transaction").finish(),
        }
    }
}

impl Connection {
    /// Build a pool-backed connection from configuration, verifying
    /// connectivity with a throwaway `SELECT 1`.
    #[instrument(skip(config), fields(max_connections = config.max_pool_size))]
    pub async fn connect(config: &SpectroConfig) -> Result<Self> {
        if config.database_url.is_empty() {
            return Err(Error::InvalidConnectionConfiguration(
                "database_url must not be empty".to_string(),
            ));
        }

        info!("initializing connection pool");
        let pool_config = PoolConfig::from(config);
        let statement_timeout_ms = pool_config.statement_timeout.as_millis() as i64;
        let pool = PgPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .acquire_timeout(pool_config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SELECT set_config('statement_timeout', $1, false)")
                        .bind(statement_timeout_ms.to_string())
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .map_err(Error::from_sqlx)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(Error::from_sqlx)?;

        info!("connection pool initialized");
        Ok(Connection::Pool(pool))
    }

    /// Begin a transaction against this connection. Calling this on an
    /// already-transaction-scoped `Connection` is rejected: nested
    /// transactions are out of scope, callers should use savepoints inside
    /// a single unit of work instead.
    pub async fn begin(&self) -> Result<Connection> {
        match self {
            Connection::Pool(pool) => {
                let tx = pool.begin().await.map_err(Error::from_sqlx)?;
                Ok(Connection::Transaction(Arc::new(Mutex::new(tx))))
            }
            Connection::Transaction(_) => Err(Error::TransactionAlreadyStarted),
        }
    }

    /// Consume this connection, committing if it is transaction-scoped.
    /// A no-op on a pooled connection.
    pub async fn commit(self) -> Result<()> {
        match self {
            Connection::Pool(_) => Ok(()),
            Connection::Transaction(tx) => {
                let tx = Arc::try_unwrap(tx)
                    .map_err(|_| Error::InternalError("transaction still has outstanding handles".to_string()))?
                    .into_inner();
                tx.commit().await.map_err(|e| Error::from_sqlx(e).into_transaction_failed())
            }
        }
    }

    /// Consume this connection, rolling back if it is transaction-scoped.
    /// A no-op on a pooled connection.
    pub async fn rollback(self) -> Result<()> {
        match self {
            Connection::Pool(_) => Ok(()),
            Connection::Transaction(tx) => {
                let tx = Arc::try_unwrap(tx)
                    .map_err(|_| Error::InternalError("transaction still has outstanding handles".to_string()))?
                    .into_inner();
                tx.rollback().await.map_err(|e| Error::from_sqlx(e).into_transaction_failed())
            }
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Connection::Transaction(_))
    }

    /// Run a parameterized query and return every matching row.
    pub async fn fetch_all(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<PgRow>> {
        debug!(sql, param_count = params.len(), "executing query");
        match self {
            Connection::Pool(pool) => {
                let query = bind_params(sqlx::query(sql), params);
                query.fetch_all(pool).await.map_err(Error::from_sqlx)
            }
            Connection::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let query = bind_params(sqlx::query(sql), params);
                query
                    .fetch_all(&mut **guard)
                    .await
                    .map_err(|e| Error::from_sqlx(e).into_transaction_failed())
            }
        }
    }

    /// Run a parameterized query and return at most one row.
    pub async fn fetch_optional(&self, sql: &str, params: &[SqlParam]) -> Result<Option<PgRow>> {
        debug!(sql, param_count = params.len(), "executing query");
        match self {
            Connection::Pool(pool) => {
                let query = bind_params(sqlx::query(sql), params);
                query.fetch_optional(pool).await.map_err(Error::from_sqlx)
            }
            Connection::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let query = bind_params(sqlx::query(sql), params);
                query
                    .fetch_optional(&mut **guard)
                    .await
                    .map_err(|e| Error::from_sqlx(e).into_transaction_failed())
            }
        }
    }

    /// Run a parameterized statement for its side effect, returning the
    /// number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        debug!(sql, param_count = params.len(), "executing statement");
        match self {
            Connection::Pool(pool) => {
                let query = bind_params(sqlx::query(sql), params);
                query
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected())
                    .map_err(Error::from_sqlx)
            }
            Connection::Transaction(tx) => {
                let mut guard = tx.lock().await;
                let query = bind_params(sqlx::query(sql), params);
                query
                    .execute(&mut **guard)
                    .await
                    .map(|r| r.rows_affected())
                    .map_err(|e| Error::from_sqlx(e).into_transaction_failed())
            }
        }
    }
}

/// Bind an ordered list of [`SqlParam`]s onto a `sqlx` query, dispatching on
/// each param's variant in the Rust -> wire direction.
fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(b) => query.bind(b),
            SqlParam::Int(i) => query.bind(i),
            SqlParam::Float(f) => query.bind(f),
            SqlParam::Text(s) => query.bind(s),
            SqlParam::Bytes(b) => query.bind(b),
            SqlParam::Json(j) => query.bind(j),
            SqlParam::Uuid(u) => query.bind(u),
            SqlParam::Timestamp(ts) => query.bind(ts),
            SqlParam::Array(items) => query.bind(array_to_text_values(items)),
        };
    }
    query
}

/// `sqlx` does not support binding a heterogeneous `Vec<SqlParam>` as a
/// single Postgres array parameter; nested arrays are rare enough in
/// practice (only `in_list`/`contains`/`overlaps` expr builders produce
/// them, and those inline their values as separate placeholders already)
/// that falling back to a textual representation here is adequate.
fn array_to_text_values(items: &[SqlParam]) -> Vec<String> {
    items
        .iter()
        .map(|item| match item {
            SqlParam::Text(s) => s.clone(),
            other => format!("{other:?}"),
        })
        .collect()
}

/// Decode one column of a [`PgRow`] into a [`SqlParam`], dispatching on the
/// Postgres type name.
pub fn column_to_param(row: &PgRow, column_name: &str, type_name: &str) -> Result<SqlParam> {
    let value = match type_name {
        "INT2" | "SMALLINT" => row
            .try_get::<Option<i16>, _>(column_name)
            .map(|v| v.map(|v| SqlParam::Int(v as i64)).unwrap_or(SqlParam::Null)),
        "INT4" | "INT" | "INTEGER" => row
            .try_get::<Option<i32>, _>(column_name)
            .map(|v| v.map(|v| SqlParam::Int(v as i64)).unwrap_or(SqlParam::Null)),
        "INT8" | "BIGINT" => row
            .try_get::<Option<i64>, _>(column_name)
            .map(|v| v.map(SqlParam::Int).unwrap_or(SqlParam::Null)),
        "FLOAT4" | "REAL" => row
            .try_get::<Option<f32>, _>(column_name)
            .map(|v| v.map(|v| SqlParam::Float(v as f64)).unwrap_or(SqlParam::Null)),
        "FLOAT8" | "DOUBLE PRECISION" => row
            .try_get::<Option<f64>, _>(column_name)
            .map(|v| v.map(SqlParam::Float).unwrap_or(SqlParam::Null)),
        "BOOL" | "BOOLEAN" => row
            .try_get::<Option<bool>, _>(column_name)
            .map(|v| v.map(SqlParam::Bool).unwrap_or(SqlParam::Null)),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(column_name)
            .map(|v| v.map(SqlParam::Json).unwrap_or(SqlParam::Null)),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(column_name)
            .map(|v| v.map(SqlParam::Uuid).unwrap_or(SqlParam::Null)),
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(column_name)
            .map(|v| v.map(SqlParam::Timestamp).unwrap_or(SqlParam::Null)),
        "BYTEA" => row
            .try_get::<Option<Vec<u8>>, _>(column_name)
            .map(|v| v.map(SqlParam::Bytes).unwrap_or(SqlParam::Null)),
        _ => row
            .try_get::<Option<String>, _>(column_name)
            .map(|v| v.map(SqlParam::Text).unwrap_or(SqlParam::Null)),
    };

    value.map_err(|e| Error::ResultDecodingFailed {
        column: column_name.to_string(),
        reason: e.to_string(),
    })
}

//! Error types for Spectro.
//!
//! A single `thiserror`-derived enum is the one error currency across every
//! module boundary in this crate; nothing downgrades to a bare `String` once
//! it crosses an API the rest of the workspace depends on.

use thiserror::Error;

/// Result type for Spectro operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // -- Transport and pool problems --------------------------------------
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection pool exhausted (max_connections reached)")]
    ConnectionPoolExhausted,

    #[error("connection timed out after {0}ms")]
    ConnectionTimeout(u64),

    #[error("invalid connection configuration: {0}")]
    InvalidConnectionConfiguration(String),

    // -- SQL and driver-level problems --------------------------------------
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid SQL: {0}")]
    InvalidSql(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("query execution failed: {0}")]
    QueryExecutionFailed(String),

    #[error("failed to decode column {column}: {reason}")]
    ResultDecodingFailed { column: String, reason: String },

    // -- Data-shape problems --------------------------------------
    #[error("{schema} not found for primary key {pk}")]
    NotFound { schema: String, pk: String },

    #[error("expected {expected} rows, got {actual}")]
    UnexpectedResultCount { expected: String, actual: usize },

    #[error("invalid data for column {column} on {schema}: {reason}")]
    InvalidData {
        schema: String,
        column: String,
        reason: String,
    },

    #[error("validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("constraint violation: {constraint}")]
    ConstraintViolation {
        constraint: String,
        table: Option<String>,
        detail: Option<String>,
    },

    #[error("database error [{code}]: {message}")]
    DatabaseError {
        code: String,
        message: String,
        detail: Option<String>,
        hint: Option<String>,
        constraint: Option<String>,
        table: Option<String>,
    },

    // -- Schema-definition problems --------------------------------------
    #[error("invalid schema {name}: {reason}")]
    InvalidSchema { name: String, reason: String },

    #[error("invalid field {field} on {schema}")]
    InvalidField { schema: String, field: String },

    #[error("relationship error on {schema}.{relation}: {reason}")]
    RelationshipError {
        schema: String,
        relation: String,
        reason: String,
    },

    #[error("relationship {relation} not found on {schema}")]
    RelationshipNotFound { schema: String, relation: String },

    // -- Transaction lifecycle --------------------------------------
    #[error("transaction failed: {0}")]
    TransactionFailed(Box<Error>),

    #[error("a transaction is already active on this connection")]
    TransactionAlreadyStarted,

    #[error("no active transaction on this connection")]
    NoActiveTransaction,

    #[error("transaction deadlock detected")]
    TransactionDeadlock,

    // -- Migration subsystem --------------------------------------
    #[error("migration failed ({version}): {reason}")]
    MigrationFailed { version: String, reason: String },

    #[error("migration {version} not found on disk")]
    MigrationNotFound { version: String },

    #[error("invalid migration file {path}: {reason}")]
    InvalidMigrationFile { path: String, reason: String },

    #[error("migration version conflict: {version} is declared more than once")]
    MigrationVersionConflict { version: String },

    // -- Startup-time --------------------------------------
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    // -- Fallback --------------------------------------
    #[error("internal error: {0}")]
    InternalError(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Wrap an error as the outcome of a failed transaction, per the
    /// propagation policy: a transactional failure always surfaces as
    /// `TransactionFailed(underlying)`, never the bare underlying error.
    pub fn into_transaction_failed(self) -> Error {
        match self {
            already @ Error::TransactionFailed(_) => already,
            other => Error::TransactionFailed(Box::new(other)),
        }
    }

    /// Classify a raw Postgres error code (the 5-character SQLSTATE) into
    /// this crate's taxonomy, following the class-prefix scheme fixed in the
    /// specification: class `23` -> constraint violation, class `40P01`
    /// specifically -> deadlock (other class `40` -> transaction failure),
    /// class `42` -> invalid SQL, class `28` -> invalid credentials, class
    /// `53` -> pool exhaustion, class `54` -> execution limits, `57014`
    /// (query canceled, the code Postgres raises when `statement_timeout`
    /// fires) -> connection timeout, else a raw `DatabaseError`.
    pub fn from_postgres_error(
        code: &str,
        message: &str,
        detail: Option<String>,
        hint: Option<String>,
        constraint: Option<String>,
        table: Option<String>,
    ) -> Error {
        match code {
            c if c.starts_with("23") => Error::ConstraintViolation {
                constraint: constraint.unwrap_or_default(),
                table,
                detail,
            },
            "40P01" => Error::TransactionDeadlock,
            c if c.starts_with("40") => Error::TransactionFailed(Box::new(Error::DatabaseError {
                code: code.to_string(),
                message: message.to_string(),
                detail,
                hint,
                constraint,
                table,
            })),
            c if c.starts_with("42") => Error::InvalidSql(message.to_string()),
            c if c.starts_with("28") => Error::InvalidCredentials,
            c if c.starts_with("53") => Error::ConnectionPoolExhausted,
            "57014" => Error::ConnectionTimeout(0),
            c if c.starts_with("54") => Error::QueryExecutionFailed(message.to_string()),
            _ => Error::DatabaseError {
                code: code.to_string(),
                message: message.to_string(),
                detail,
                hint,
                constraint,
                table,
            },
        }
    }

    /// Translate a driver-level [`sqlx::Error`] into this crate's taxonomy.
    pub fn from_sqlx(err: sqlx::Error) -> Error {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
                let message = db_err.message().to_string();
                let (detail, hint) = db_err
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .map(|pg| (pg.detail().map(String::from), pg.hint().map(String::from)))
                    .unwrap_or((None, None));
                let constraint = db_err.constraint().map(|s| s.to_string());
                let table = db_err.table().map(|s| s.to_string());
                Error::from_postgres_error(&code, &message, detail, hint, constraint, table)
            }
            sqlx::Error::PoolTimedOut => Error::ConnectionPoolExhausted,
            sqlx::Error::PoolClosed => Error::ConnectionFailed("pool closed".to_string()),
            sqlx::Error::Io(e) => Error::ConnectionFailed(e.to_string()),
            sqlx::Error::RowNotFound => Error::NotFound {
                schema: String::new(),
                pk: String::new(),
            },
            other => Error::QueryExecutionFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_constraint_violation() {
        let err = Error::from_postgres_error(
            "23505",
            "duplicate key",
            None,
            None,
            Some("users_email_key".into()),
            Some("users".into()),
        );
        assert!(matches!(err, Error::ConstraintViolation { .. }));
    }

    #[test]
    fn classifies_deadlock_specifically() {
        let err = Error::from_postgres_error("40P01", "deadlock detected", None, None, None, None);
        assert!(matches!(err, Error::TransactionDeadlock));
    }

    #[test]
    fn classifies_other_class_40_as_transaction_failed() {
        let err = Error::from_postgres_error("40001", "serialization failure", None, None, None, None);
        assert!(matches!(err, Error::TransactionFailed(_)));
    }

    #[test]
    fn classifies_syntax_error() {
        let err = Error::from_postgres_error("42601", "syntax error", None, None, None, None);
        assert!(matches!(err, Error::InvalidSql(_)));
    }

    #[test]
    fn classifies_query_canceled_as_connection_timeout() {
        let err = Error::from_postgres_error("57014", "canceling statement due to statement timeout", None, None, None, None);
        assert!(matches!(err, Error::ConnectionTimeout(_)));
    }

    #[test]
    fn classifies_unknown_as_database_error() {
        let err = Error::from_postgres_error("99999", "weird", None, None, None, None);
        assert!(matches!(err, Error::DatabaseError { .. }));
    }

    #[test]
    fn transaction_failed_does_not_double_wrap() {
        let inner = Error::InternalError("boom".into());
        let wrapped = inner.into_transaction_failed();
        let wrapped_again = wrapped.into_transaction_failed();
        assert!(matches!(wrapped_again, Error::TransactionFailed(_)));
        if let Error::TransactionFailed(inner) = wrapped_again {
            assert!(!matches!(*inner, Error::TransactionFailed(_)));
        }
    }
}

//! Error types for the database system
//!
//! This module defines all error types that can occur during database operations,
//! row extraction and schema migrations.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Boxed error used to carry an underlying cause
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Step of a migration file that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Executing the file contents
    Execute,
    /// Recording the file in the schema-tracking table
    Record,
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Execute => write!(f, "execute"),
            MigrationPhase::Record => write!(f, "record"),
        }
    }
}

/// Error types for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Connection error (unusable handle)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Statement could not be prepared
    #[error("Prepare error: {0}")]
    PrepareError(String),

    /// Query execution error
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query returned no rows where one was required
    #[error("Query must return at least one result")]
    NoRows,

    /// Column not found in a result row
    #[error("Column {0} not found in result set")]
    ColumnNotFound(String),

    /// Column slot does not hold a raw byte buffer
    #[error("Column {column} ({actual}) could not be extracted")]
    ColumnTypeMismatch { column: String, actual: String },

    /// Raw column value could not be parsed into the requested type
    #[error("Column {column} ({value}) could not be extracted as {target}: {source}")]
    Parse {
        column: String,
        value: String,
        target: &'static str,
        #[source]
        source: BoxError,
    },

    /// Transaction error
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// A transaction is already open on this connection
    #[error("Transaction already started")]
    TransactionAlreadyStarted,

    /// Schema-tracking table could not be created
    #[error("Unable to set up schema table: {0}")]
    SchemaSetup(#[source] Box<DatabaseError>),

    /// Migration directory could not be read
    #[error("Unable to read migrations in {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Migration directory holds no migration files
    #[error("No migrations found in folder '{0}'")]
    NoMigrationsFound(PathBuf),

    /// Two migration files share the same ordinal
    #[error("Migrations {first} and {second} share ordinal {ordinal}")]
    DuplicateMigrationOrdinal {
        ordinal: String,
        first: String,
        second: String,
    },

    /// Migration file could not be read
    #[error("Error reading {file}: {source}")]
    FileRead {
        file: String,
        #[source]
        source: std::io::Error,
    },

    /// Migration file failed while executing or being recorded
    #[error("Error executing {file} ({phase}): {source}")]
    MigrationExecution {
        file: String,
        phase: MigrationPhase,
        #[source]
        source: Box<DatabaseError>,
    },

    /// Migration transaction could not be committed
    #[error("Unable to commit migrations: {0}")]
    Commit(#[source] Box<DatabaseError>),


    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[cfg(feature = "postgres")]
    #[error("PostgreSQL error: {0}")]
    PostgresError(#[from] tokio_postgres::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DatabaseError {
    /// Create a new connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        DatabaseError::ConnectionError(msg.into())
    }

    /// Create a new prepare error
    pub fn prepare<S: Into<String>>(msg: S) -> Self {
        DatabaseError::PrepareError(msg.into())
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(msg: S) -> Self {
        DatabaseError::QueryError(msg.into())
    }

    /// Create a new column type mismatch error
    pub fn type_mismatch(column: &str, actual: &str) -> Self {
        DatabaseError::ColumnTypeMismatch {
            column: column.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create a new parse error for a raw column value
    pub fn parse(
        column: &str,
        value: impl Into<String>,
        target: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        DatabaseError::Parse {
            column: column.to_string(),
            value: value.into(),
            target,
            source: source.into(),
        }
    }

    /// Create a new transaction error
    pub fn transaction<S: Into<String>>(msg: S) -> Self {
        DatabaseError::TransactionError(msg.into())
    }

    /// Wrap a failure of a single migration file
    pub fn migration(file: impl Into<String>, phase: MigrationPhase, source: DatabaseError) -> Self {
        DatabaseError::MigrationExecution {
            file: file.into(),
            phase,
            source: Box::new(source),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        DatabaseError::Other(msg.into())
    }
}

//! Database trait and connection management
//!
//! This module defines the driver boundary every backend implements, plus the
//! connection string builder used to configure one.

use super::database_types::DatabaseType;
use super::error::Result;
use super::result::RowCursor;
use super::value::DatabaseValue;
use async_trait::async_trait;

/// Core database trait that all database backends must implement
///
/// Statements use `$1`, `$2`, ... positional placeholders on every backend.
#[async_trait]
pub trait Database: Send + Sync {
    /// Get the database type
    fn database_type(&self) -> DatabaseType;

    /// Connect to the database with the given connection string
    async fn connect(&self, connection_string: &str) -> Result<()>;

    /// Check if connected to the database
    fn is_connected(&self) -> bool;

    /// Disconnect from the database
    async fn disconnect(&self) -> Result<()>;

    /// Execute a single statement that doesn't return rows
    ///
    /// Returns the number of affected rows.
    async fn execute(&self, statement: &str) -> Result<u64> {
        self.execute_with_params(statement, &[]).await
    }

    /// Prepare and execute a single parameterized statement that doesn't return rows
    async fn execute_with_params(&self, statement: &str, params: &[DatabaseValue]) -> Result<u64>;

    /// Execute one or more `;`-separated statements without parameters
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Prepare and run a parameterized statement, returning a cursor over its rows
    ///
    /// Fails with `PrepareError` when the statement is rejected and with
    /// `QueryError` when execution fails.
    async fn query_with_params(
        &self,
        statement: &str,
        params: &[DatabaseValue],
    ) -> Result<Box<dyn RowCursor>>;

    /// Begin a transaction
    ///
    /// Only one transaction can be active at a time per connection; a second
    /// call fails with `TransactionAlreadyStarted`.
    async fn begin_transaction(&self) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Rollback the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Check if currently in a transaction
    fn in_transaction(&self) -> bool;
}

/// Database connection builder
pub struct ConnectionBuilder {
    db_type: DatabaseType,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    options: Vec<(String, String)>,
}

impl ConnectionBuilder {
    /// Create a new connection builder for the specified database type
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            options: Vec::new(),
        }
    }

    /// Set the database host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the database port
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the database name (file path for SQLite)
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username
    pub fn username<S: Into<String>>(mut self, username: S) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Add a custom option
    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Build the connection string
    pub fn build_connection_string(&self) -> String {
        match self.db_type {
            DatabaseType::Sqlite => self
                .database
                .clone()
                .unwrap_or_else(|| ":memory:".to_string()),
            DatabaseType::Postgres => {
                let mut parts = Vec::new();
                if let Some(host) = &self.host {
                    parts.push(format!("host={}", host));
                }
                if let Some(port) = self.port {
                    parts.push(format!("port={}", port));
                }
                if let Some(database) = &self.database {
                    parts.push(format!("dbname={}", database));
                }
                if let Some(username) = &self.username {
                    parts.push(format!("user={}", username));
                }
                if let Some(password) = &self.password {
                    parts.push(format!("password={}", password));
                }
                for (key, value) in &self.options {
                    parts.push(format!("{}={}", key, value));
                }
                parts.join(" ")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_builder_sqlite() {
        let builder = ConnectionBuilder::new(DatabaseType::Sqlite).database("test.db");
        assert_eq!(builder.build_connection_string(), "test.db");

        let builder = ConnectionBuilder::new(DatabaseType::Sqlite);
        assert_eq!(builder.build_connection_string(), ":memory:");
    }

    #[test]
    fn test_connection_builder_postgres() {
        let builder = ConnectionBuilder::new(DatabaseType::Postgres)
            .host("localhost")
            .port(5432)
            .database("mydb")
            .username("user")
            .password("pass")
            .option("sslmode", "disable");

        assert_eq!(
            builder.build_connection_string(),
            "host=localhost port=5432 dbname=mydb user=user password=pass sslmode=disable"
        );
    }
}

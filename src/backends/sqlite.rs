//! SQLite database backend implementation
//!
//! This module provides a SQLite implementation of the Database trait.

use crate::core::{
    database::Database, database_types::DatabaseType, error::DatabaseError, error::Result,
    result::BufferedCursor, result::RowCursor, value::DatabaseValue,
};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite database implementation
///
/// The connection flags are atomics so they can be read without waiting on
/// the connection lock; they are only written while that lock is held.
pub struct SqliteDatabase {
    connection: Arc<Mutex<Option<Connection>>>,
    connected: Arc<AtomicBool>,
    in_transaction: Arc<AtomicBool>,
}

impl SqliteDatabase {
    /// Create a new SQLite database instance
    pub fn new() -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            in_transaction: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Convert a rusqlite Row into column values
    fn row_values(row: &Row, column_count: usize) -> rusqlite::Result<Vec<DatabaseValue>> {
        let mut values = Vec::with_capacity(column_count);

        for i in 0..column_count {
            let value = match row.get_ref(i)? {
                ValueRef::Null => DatabaseValue::Null,
                ValueRef::Integer(v) => DatabaseValue::Long(v),
                ValueRef::Real(v) => DatabaseValue::Double(v),
                ValueRef::Text(v) => DatabaseValue::String(String::from_utf8_lossy(v).to_string()),
                ValueRef::Blob(v) => DatabaseValue::Bytes(v.to_vec()),
            };
            values.push(value);
        }

        Ok(values)
    }

    /// Convert DatabaseValue to rusqlite parameter
    ///
    /// SQLite has no timestamp or JSON storage class; both are bound as text.
    fn value_to_param(value: &DatabaseValue) -> Box<dyn rusqlite::ToSql> {
        match value {
            DatabaseValue::Null => Box::new(None::<i64>),
            DatabaseValue::Bool(v) => Box::new(*v),
            DatabaseValue::Int(v) => Box::new(*v),
            DatabaseValue::Long(v) => Box::new(*v),
            DatabaseValue::Float(v) => Box::new(*v),
            DatabaseValue::Double(v) => Box::new(*v),
            DatabaseValue::String(v) => Box::new(v.clone()),
            DatabaseValue::Bytes(v) => Box::new(v.clone()),
            DatabaseValue::Timestamp(_) | DatabaseValue::Json(_) => {
                let text = value.to_raw_bytes().unwrap_or_default();
                Box::new(String::from_utf8_lossy(&text).into_owned())
            }
        }
    }

    /// Run blocking work against the open connection on the blocking pool
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let connection_arc = Arc::clone(&self.connection);

        tokio::task::spawn_blocking(move || {
            let connection = connection_arc.blocking_lock();
            let conn = connection
                .as_ref()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;
            f(conn)
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
    }

    /// Run a transaction control statement, checking and updating the flag
    async fn transaction_control(&self, statement: &'static str, opening: bool) -> Result<()> {
        let connection_arc = Arc::clone(&self.connection);
        let in_transaction_arc = Arc::clone(&self.in_transaction);

        tokio::task::spawn_blocking(move || -> Result<()> {
            // The connection lock serializes every flag update
            let connection = connection_arc.blocking_lock();

            let conn = connection
                .as_ref()
                .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

            let active = in_transaction_arc.load(Ordering::Acquire);
            if opening && active {
                return Err(DatabaseError::TransactionAlreadyStarted);
            }
            if !opening && !active {
                return Err(DatabaseError::transaction("Not in a transaction"));
            }

            let outcome = conn
                .execute_batch(statement)
                .map_err(|e| DatabaseError::query(e.to_string()));
            // A failed COMMIT can leave the transaction open (deferred constraints)
            in_transaction_arc.store(!conn.is_autocommit(), Ordering::Release);

            outcome
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
    }
}

impl Default for SqliteDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        {
            let mut connection = self.connection.lock().await;
            *connection = None;
            self.connected.store(false, Ordering::Release);
            self.in_transaction.store(false, Ordering::Release);
        }

        let connection_string = connection_string.to_string();
        let connection_arc = Arc::clone(&self.connection);
        let connected_arc = Arc::clone(&self.connected);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&connection_string)
                .map_err(|e| DatabaseError::connection(e.to_string()))?;

            conn.execute("PRAGMA foreign_keys = ON", [])?;

            let mut connection = connection_arc.blocking_lock();
            *connection = Some(conn);
            connected_arc.store(true, Ordering::Release);

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::other(format!("Task join error: {}", e)))?
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut connection = self.connection.lock().await;
        *connection = None;
        self.connected.store(false, Ordering::Release);
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    async fn execute_with_params(&self, statement: &str, params: &[DatabaseValue]) -> Result<u64> {
        let statement = statement.to_string();
        let params = params.to_vec();

        self.with_connection(move |conn| {
            let rusqlite_params: Vec<Box<dyn rusqlite::ToSql>> =
                params.iter().map(Self::value_to_param).collect();

            let mut stmt = conn
                .prepare(&statement)
                .map_err(|e| DatabaseError::prepare(e.to_string()))?;
            let affected = stmt
                .execute(params_from_iter(rusqlite_params.iter()))
                .map_err(|e| DatabaseError::query(e.to_string()))?;

            Ok(affected as u64)
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();

        self.with_connection(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| DatabaseError::query(e.to_string()))
        })
        .await
    }

    async fn query_with_params(
        &self,
        statement: &str,
        params: &[DatabaseValue],
    ) -> Result<Box<dyn RowCursor>> {
        let statement = statement.to_string();
        let params = params.to_vec();

        self.with_connection(move |conn| {
            let rusqlite_params: Vec<Box<dyn rusqlite::ToSql>> =
                params.iter().map(Self::value_to_param).collect();

            let mut stmt = conn
                .prepare(&statement)
                .map_err(|e| DatabaseError::prepare(e.to_string()))?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let column_count = columns.len();
            let mut cursor = BufferedCursor::new(columns);

            let mut rows = stmt
                .query(params_from_iter(rusqlite_params.iter()))
                .map_err(|e| DatabaseError::query(e.to_string()))?;

            loop {
                match rows.next() {
                    Ok(Some(row)) => match Self::row_values(row, column_count) {
                        Ok(values) => cursor.push_row(values),
                        Err(e) => {
                            cursor.push_error(DatabaseError::query(e.to_string()));
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        cursor.push_error(DatabaseError::query(e.to_string()));
                        break;
                    }
                }
            }

            Ok(Box::new(cursor) as Box<dyn RowCursor>)
        })
        .await
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.transaction_control("BEGIN TRANSACTION", true).await
    }

    async fn commit(&self) -> Result<()> {
        self.transaction_control("COMMIT", false).await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction_control("ROLLBACK", false).await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }
}

impl Drop for SqliteDatabase {
    fn drop(&mut self) {
        // Best-effort cleanup since Drop cannot be async
        if self.in_transaction.load(Ordering::Acquire) {
            if let Ok(connection) = self.connection.try_lock() {
                if let Some(conn) = connection.as_ref() {
                    let _ = conn.execute_batch("ROLLBACK");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::Executor;

    #[tokio::test]
    async fn test_sqlite_connect() {
        let db = SqliteDatabase::new();
        assert!(db.connect(":memory:").await.is_ok());
        assert!(db.is_connected());
        assert!(db.disconnect().await.is_ok());
        assert!(!db.is_connected());
    }

    #[tokio::test]
    async fn test_sqlite_not_connected() {
        let db = SqliteDatabase::new();
        let err = db.execute("SELECT 1").await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_sqlite_execute() -> Result<()> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;

        db.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .await?;

        let affected = db
            .execute_with_params("INSERT INTO test (name) VALUES ($1)", &[DatabaseValue::from("Alice")])
            .await?;
        assert_eq!(affected, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_execute_batch() -> Result<()> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;

        db.execute_batch(
            "CREATE TABLE a (id INTEGER PRIMARY KEY);
             CREATE TABLE b (id INTEGER PRIMARY KEY, a_id INTEGER REFERENCES a(id));",
        )
        .await?;

        let result = db
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                vec![],
            )
            .run()
            .await?;
        assert_eq!(result.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_cursor_values() -> Result<()> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;
        db.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, score REAL, note TEXT, data BLOB)")
            .await?;
        db.execute("INSERT INTO test (score, note, data) VALUES (1.5, NULL, x'0102')")
            .await?;

        let mut cursor = db
            .query_with_params("SELECT id, score, note, data FROM test", &[])
            .await?;
        assert_eq!(cursor.columns(), ["id", "score", "note", "data"]);

        let row = cursor.next_row().expect("one row")?;
        assert_eq!(
            row,
            vec![
                DatabaseValue::Long(1),
                DatabaseValue::Double(1.5),
                DatabaseValue::Null,
                DatabaseValue::Bytes(vec![1, 2]),
            ]
        );
        assert!(cursor.next_row().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_flags_readable_while_connection_busy() -> Result<()> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;
        db.begin_transaction().await?;

        let _busy = db.connection.lock().await;
        assert!(db.is_connected());
        assert!(db.in_transaction());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_failed_commit_resyncs_flag() -> Result<()> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;
        db.execute_batch(
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
             );",
        )
        .await?;

        db.begin_transaction().await?;
        db.execute("INSERT INTO child (parent_id) VALUES (42)").await?;
        assert!(matches!(db.commit().await, Err(DatabaseError::QueryError(_))));

        // The transaction is still open on the connection and the flag says so
        assert!(db.in_transaction());
        db.rollback().await?;
        assert!(!db.in_transaction());

        let result = db.query("SELECT * FROM child", vec![]).run().await?;
        assert!(result.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_transaction() -> Result<()> {
        let db = SqliteDatabase::new();
        db.connect(":memory:").await?;

        db.execute("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .await?;

        db.begin_transaction().await?;
        assert!(db.in_transaction());
        assert!(matches!(
            db.begin_transaction().await,
            Err(DatabaseError::TransactionAlreadyStarted)
        ));

        db.execute("INSERT INTO test (name) VALUES ('Alice')").await?;
        db.commit().await?;
        assert!(!db.in_transaction());

        db.begin_transaction().await?;
        db.execute("INSERT INTO test (name) VALUES ('Bob')").await?;
        db.rollback().await?;
        assert!(!db.in_transaction());

        let result = db.query("SELECT * FROM test", vec![]).run().await?;
        assert_eq!(result.len(), 1);

        Ok(())
    }
}

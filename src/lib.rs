//! # kin
//!
//! A small SQL toolkit: ordered, transactional schema migrations, deferred
//! parameterized queries, sticky-error row extraction and explicit
//! model-to-column mapping over an async driver trait.
//!
//! ## Features
//!
//! - **Migrations**: applies `<ordinal>__<description>.sql` files in order,
//!   inside one transaction, recording each in a tracking table
//! - **Queries**: statements with `$1`, `$2`, ... placeholders, run on a
//!   connection or a transaction and re-runnable at will
//! - **Row extraction**: typed getters whose first failure sticks to the row
//! - **Model mapping**: field builders bound to `Option` slots drive both
//!   reading rows and generating `INSERT ... RETURNING *`
//! - **Async Support**: async/await on Tokio
//!
//! ## Supported Databases
//!
//! | Database | Feature | Driver |
//! |----------|---------|--------|
//! | SQLite | `sqlite` (default) | `rusqlite`, bundled |
//! | PostgreSQL | `postgres` | `tokio-postgres` |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kin::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let db = Arc::new(SqliteDatabase::new());
//!     db.connect("app.db").await?;
//!
//!     Migrator::new(Arc::clone(&db)).migrate("migrations").await?;
//!
//!     let mut row = db
//!         .query("SELECT id, name FROM users WHERE id = $1", vec![1i64.into()])
//!         .one()
//!         .await?;
//!     let name = row.extract_string("name");
//!     row.finish()?;
//!
//!     println!("User: {}", name);
//!     Ok(())
//! }
//! ```
//!
//! ### Mapping a model
//!
//! ```rust,no_run
//! use kin::prelude::*;
//!
//! #[derive(Default)]
//! struct User {
//!     id: Option<i64>,
//!     name: Option<String>,
//! }
//!
//! impl Builder for User {
//!     fn columns(&mut self) -> Vec<Box<dyn FieldBuilder + '_>> {
//!         vec![int_field("id", &mut self.id), string_field("name", &mut self.name)]
//!     }
//! }
//!
//! impl Model for User {
//!     fn table_name(&self) -> &str {
//!         "users"
//!     }
//! }
//!
//! # async fn example(db: &SqliteDatabase) -> Result<()> {
//! let mut user = User {
//!     name: Some("Ada".to_string()),
//!     ..Default::default()
//! };
//! insert(db, &mut user).await?;
//! assert!(user.id.is_some());
//! # Ok(())
//! # }
//! ```

/// Core database system types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Prelude for convenient imports
///
/// ```rust
/// use kin::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let db = SqliteDatabase::new();
///     db.connect(":memory:").await?;
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        bool_field, decimal_field, insert, insert_query, int_field, json_field, string_field,
        time_field, Builder, ConnectionBuilder, Database, DatabaseError, DatabaseType,
        DatabaseValue, Executor, FieldBuilder, MigrationReport, Migrator, MigratorConfig, Model,
        Query, Result, ResultSet, RowExtractor, TransactionGuard,
    };

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;

    #[cfg(feature = "postgres")]
    pub use crate::backends::PostgresDatabase;
}

// Re-export at root level for convenience
pub use core::{
    ConnectionBuilder, Database, DatabaseError, DatabaseType, DatabaseValue, Executor, Migrator,
    MigratorConfig, Query, Result, ResultSet, RowExtractor, TransactionGuard,
};

#[cfg(feature = "sqlite")]
pub use backends::SqliteDatabase;

#[cfg(feature = "postgres")]
pub use backends::PostgresDatabase;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let db_type = DatabaseType::Sqlite;
        assert_eq!(db_type.to_str(), "sqlite");
        assert_eq!(MigratorConfig::default().table_name, "schemas");
    }

    #[test]
    fn test_value_conversions() {
        use prelude::*;

        let val: DatabaseValue = 42i64.into();
        assert_eq!(val.as_long(), Some(42));

        let val: DatabaseValue = "test".into();
        assert_eq!(val.as_str(), Some("test"));

        let val: DatabaseValue = true.into();
        assert_eq!(val.as_bool(), Some(true));
    }
}

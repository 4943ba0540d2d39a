//! Core database system types and traits
//!
//! This module provides the fundamental building blocks: the driver trait,
//! queries and result sets, typed row extraction, model mapping, transactions
//! and the migration engine.

pub mod builder;
pub mod database;
pub mod database_types;
pub mod error;
pub mod migration;
pub mod query;
pub mod result;
pub mod row;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use builder::{
    bool_field, decimal_field, insert, insert_query, int_field, json_field, string_field,
    time_field, Builder, Field, FieldBuilder, FieldValue, JsonField, Model,
};
pub use database::{ConnectionBuilder, Database};
pub use database_types::DatabaseType;
pub use error::{DatabaseError, MigrationPhase, Result};
pub use migration::{MigrationFile, MigrationReport, Migrator, MigratorConfig, SchemaRecord};
pub use query::{Executor, Query};
pub use result::{BufferedCursor, ResultSet, RowCursor};
pub use row::RowExtractor;
pub use transaction::TransactionGuard;
pub use value::DatabaseValue;

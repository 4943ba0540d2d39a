//! Directory-based schema migrations
//!
//! A [`Migrator`] applies every `<ordinal>__<description>.sql` file of a
//! directory that is not yet recorded in the tracking table. The whole run
//! happens inside one transaction: either every pending file is applied and
//! recorded, or nothing is.
//!
//! # Example
//!
//! ```rust,no_run
//! use kin::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let db = Arc::new(SqliteDatabase::new());
//! db.connect("app.db").await?;
//!
//! let report = Migrator::new(db).migrate("migrations").await?;
//! println!("applied {} migration(s)", report.applied.len());
//! # Ok(())
//! # }
//! ```

use super::database::Database;
use super::database_types::DatabaseType;
use super::error::{DatabaseError, MigrationPhase, Result};
use super::query::Executor;
use super::transaction::TransactionGuard;
use super::value::DatabaseValue;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Migrator settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MigratorConfig {
    /// Name of the schema-tracking table
    pub table_name: String,
    /// File extension of migration files, without the dot
    pub extension: String,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            table_name: "schemas".to_string(),
            extension: "sql".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum OrdinalKey {
    Numeric { digits: usize, value: String },
    Text(String),
}

impl OrdinalKey {
    fn parse(ordinal: &str) -> Self {
        if !ordinal.is_empty() && ordinal.bytes().all(|b| b.is_ascii_digit()) {
            let value = ordinal.trim_start_matches('0').to_string();
            Self::Numeric {
                digits: value.len(),
                value,
            }
        } else {
            Self::Text(ordinal.to_string())
        }
    }
}

/// A migration file found on disk
///
/// Identity is the file name. Contents are read when the file is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    name: String,
    ordinal: String,
    path: PathBuf,
}

impl MigrationFile {
    /// Describe the file at `path`
    ///
    /// The ordinal is the text before the first `__` of the name, or the
    /// whole stem when the name has no `__`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ordinal = match name.split_once("__") {
            Some((ordinal, _)) => ordinal.to_string(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };

        Self {
            name,
            ordinal,
            path,
        }
    }

    /// File name, as recorded in the tracking table
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordering prefix of the name
    pub fn ordinal(&self) -> &str {
        &self.ordinal
    }

    /// Full path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the SQL text of the file
    pub async fn contents(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DatabaseError::FileRead {
                file: self.name.clone(),
                source,
            })
    }

    fn sort_key(&self) -> (OrdinalKey, &str) {
        (OrdinalKey::parse(&self.ordinal), &self.name)
    }
}

/// A row of the schema-tracking table
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRecord {
    pub id: i64,
    pub filename: String,
    pub applied_on: DateTime<Utc>,
}

/// Outcome of a successful migration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Files applied by this run, in order
    pub applied: Vec<String>,
    /// Files skipped because they were already recorded
    pub skipped: Vec<String>,
}

/// Applies SQL migration files and records them in a tracking table
pub struct Migrator<D: Database + 'static> {
    db: Arc<D>,
    config: MigratorConfig,
}

impl<D: Database + 'static> Migrator<D> {
    /// Create a migrator with the default configuration
    pub fn new(db: Arc<D>) -> Self {
        Self::with_config(db, MigratorConfig::default())
    }

    /// Create a migrator with a custom configuration
    pub fn with_config(db: Arc<D>, config: MigratorConfig) -> Self {
        Self { db, config }
    }

    /// Active configuration
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    fn tracking_table_ddl(&self) -> String {
        let table = &self.config.table_name;
        match self.db.database_type() {
            DatabaseType::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {} (id serial primary key, filename text unique not null check (char_length(filename) <= 255), applied_on timestamp default (now() at time zone 'utc'))",
                table
            ),
            DatabaseType::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY AUTOINCREMENT, filename TEXT UNIQUE NOT NULL CHECK (length(filename) <= 255), applied_on TIMESTAMP DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')))",
                table
            ),
        }
    }

    /// Apply every pending migration in `dir`
    ///
    /// Files are applied in ordinal order inside a single transaction. Any
    /// failure rolls the transaction back, leaving neither the schema changes
    /// nor their tracking records behind.
    ///
    /// # Errors
    ///
    /// - `ConnectionError` if the database is not connected
    /// - `SchemaSetup` if the tracking table cannot be created
    /// - `DirectoryRead`, `NoMigrationsFound`, `DuplicateMigrationOrdinal`
    ///   while scanning `dir`
    /// - `FileRead` or `MigrationExecution` while applying a file
    /// - `Commit` if the final commit fails
    pub async fn migrate(&self, dir: impl AsRef<Path>) -> Result<MigrationReport> {
        let dir = dir.as_ref();
        if !self.db.is_connected() {
            return Err(DatabaseError::connection("Not connected to database"));
        }

        tracing::info!(dir = %dir.display(), "starting database migrations");
        let tx = TransactionGuard::begin(Arc::clone(&self.db)).await?;

        match self.apply(&tx, dir).await {
            Ok(report) => {
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Commit(Box::new(e)))?;
                tracing::info!(
                    applied = report.applied.len(),
                    skipped = report.skipped.len(),
                    "migrations committed"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(error = %err, "migration failed; rolling back changes");
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "migration rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn apply(&self, tx: &TransactionGuard<D>, dir: &Path) -> Result<MigrationReport> {
        tx.execute_batch(&self.tracking_table_ddl())
            .await
            .map_err(|e| DatabaseError::SchemaSetup(Box::new(e)))?;

        let files = self.scan(dir).await?;

        let mut done = HashSet::new();
        tx.query(
            &format!("SELECT filename FROM {}", self.config.table_name),
            vec![],
        )
        .extract_fn(|mut row| {
            done.insert(row.extract_string("filename"));
            row.finish()
        })
        .await?;

        let record = format!(
            "INSERT INTO {} (filename) VALUES ($1)",
            self.config.table_name
        );
        let mut report = MigrationReport::default();

        for file in files {
            if done.contains(file.name()) {
                tracing::debug!(file = file.name(), "already applied; skipping");
                report.skipped.push(file.name);
                continue;
            }

            tracing::info!(file = file.name(), "running migration");
            let contents = file.contents().await?;
            tx.execute_batch(&contents)
                .await
                .map_err(|e| DatabaseError::migration(file.name(), MigrationPhase::Execute, e))?;
            tx.execute_with_params(&record, &[DatabaseValue::from(file.name())])
                .await
                .map_err(|e| DatabaseError::migration(file.name(), MigrationPhase::Record, e))?;

            report.applied.push(file.name);
        }

        Ok(report)
    }

    /// List the migration files of `dir` in application order
    ///
    /// Directories and files without the configured extension are ignored.
    pub async fn scan(&self, dir: &Path) -> Result<Vec<MigrationFile>> {
        let read_error = |source| DatabaseError::DirectoryRead {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(read_error)?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            if entry.file_type().await.map_err(read_error)?.is_dir() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.config.extension.as_str()) {
                continue;
            }
            files.push(MigrationFile::new(path));
        }

        if files.is_empty() {
            return Err(DatabaseError::NoMigrationsFound(dir.to_path_buf()));
        }

        files.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        for pair in files.windows(2) {
            if OrdinalKey::parse(&pair[0].ordinal) == OrdinalKey::parse(&pair[1].ordinal) {
                return Err(DatabaseError::DuplicateMigrationOrdinal {
                    ordinal: pair[1].ordinal.clone(),
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        Ok(files)
    }

    async fn tracking_table_exists(&self) -> Result<bool> {
        let lookup = match self.db.database_type() {
            DatabaseType::Postgres => "SELECT to_regclass($1) IS NOT NULL AS present",
            DatabaseType::Sqlite => {
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = $1) AS present"
            }
        };

        self.db
            .query(lookup, vec![self.config.table_name.as_str().into()])
            .one_and_extract_fn(|mut row| {
                let present = row.extract_bool("present");
                row.finish().map(|_| present)
            })
            .await
    }

    /// Records of every applied migration, oldest first
    ///
    /// Returns an empty list when the tracking table does not exist yet.
    pub async fn applied(&self) -> Result<Vec<SchemaRecord>> {
        if !self.tracking_table_exists().await? {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        self.db
            .query(
                &format!(
                    "SELECT id, filename, applied_on FROM {} ORDER BY id",
                    self.config.table_name
                ),
                vec![],
            )
            .extract_fn(|mut row| {
                let record = SchemaRecord {
                    id: row.extract_int("id"),
                    filename: row.extract_string("filename"),
                    applied_on: row.extract_time("applied_on"),
                };
                row.finish()?;
                records.push(record);
                Ok(())
            })
            .await?;

        Ok(records)
    }

    /// Migration files in `dir` that have not been applied yet
    ///
    /// Does not modify the database.
    pub async fn pending(&self, dir: impl AsRef<Path>) -> Result<Vec<MigrationFile>> {
        let files = self.scan(dir.as_ref()).await?;
        let done: HashSet<String> = self
            .applied()
            .await?
            .into_iter()
            .map(|record| record.filename)
            .collect();

        Ok(files
            .into_iter()
            .filter(|file| !done.contains(file.name()))
            .collect())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqliteDatabase;
    use std::fs;
    use tempfile::TempDir;

    async fn create_test_db() -> Arc<SqliteDatabase> {
        let db = Arc::new(SqliteDatabase::new());
        db.connect(":memory:").await.unwrap();
        db
    }

    fn migrations(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, sql) in files {
            fs::write(dir.path().join(name), sql).unwrap();
        }
        dir
    }

    async fn table_exists(db: &SqliteDatabase, table: &str) -> bool {
        db.query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = $1",
            vec![table.into()],
        )
        .one()
        .await
        .unwrap()
        .extract_int("n")
            == 1
    }

    #[test]
    fn test_ordinal_parsing() {
        assert_eq!(MigrationFile::new("m/001__init.sql").ordinal(), "001");
        assert_eq!(MigrationFile::new("m/2__a__b.sql").ordinal(), "2");
        assert_eq!(MigrationFile::new("m/seed.sql").ordinal(), "seed");
        assert_eq!(MigrationFile::new("m/seed.sql").name(), "seed.sql");
    }

    #[test]
    fn test_ordinal_ordering() {
        let mut keys = vec![
            OrdinalKey::parse("10"),
            OrdinalKey::parse("beta"),
            OrdinalKey::parse("2"),
            OrdinalKey::parse("alpha"),
            OrdinalKey::parse("002"),
        ];
        keys.sort();
        assert_eq!(keys[0], OrdinalKey::parse("2"));
        assert_eq!(keys[1], OrdinalKey::parse("2"));
        assert_eq!(keys[2], OrdinalKey::parse("10"));
        assert_eq!(keys[3], OrdinalKey::Text("alpha".to_string()));
        assert_eq!(keys[4], OrdinalKey::Text("beta".to_string()));
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: MigratorConfig = serde_json::from_str(r#"{"table_name": "versions"}"#).unwrap();
        assert_eq!(config.table_name, "versions");
        assert_eq!(config.extension, "sql");
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = create_test_db().await;
        let dir = migrations(&[
            ("1__users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);"),
            ("2__posts.sql", "CREATE TABLE posts (id INTEGER PRIMARY KEY, body TEXT);"),
        ]);
        let migrator = Migrator::new(Arc::clone(&db));

        let first = migrator.migrate(dir.path()).await.unwrap();
        assert_eq!(first.applied, vec!["1__users.sql", "2__posts.sql"]);
        assert!(first.skipped.is_empty());

        let second = migrator.migrate(dir.path()).await.unwrap();
        assert!(second.applied.is_empty());
        assert_eq!(second.skipped, vec!["1__users.sql", "2__posts.sql"]);

        let records = migrator.applied().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].filename, "1__users.sql");
        assert!(records[0].applied_on > DateTime::<Utc>::default());
        assert!(!db.in_transaction());
    }

    #[tokio::test]
    async fn test_failed_migration_rolls_back_everything() {
        let db = create_test_db().await;
        let dir = migrations(&[
            ("1__a.sql", "CREATE TABLE a (id INTEGER PRIMARY KEY);"),
            ("2__b.sql", "CREATE TABEL b (id INTEGER PRIMARY KEY);"),
            ("3__c.sql", "CREATE TABLE c (id INTEGER PRIMARY KEY);"),
        ]);
        let migrator = Migrator::new(Arc::clone(&db));

        let err = migrator.migrate(dir.path()).await.unwrap_err();
        match err {
            DatabaseError::MigrationExecution { file, phase, .. } => {
                assert_eq!(file, "2__b.sql");
                assert_eq!(phase, MigrationPhase::Execute);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(!db.in_transaction());
        assert!(!table_exists(&db, "a").await);
        assert!(!table_exists(&db, "c").await);
        assert!(migrator.applied().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_failure_reports_record_phase() {
        let db = create_test_db().await;
        let dir = migrations(&[(
            "1__self_record.sql",
            "INSERT INTO schemas (filename) VALUES ('1__self_record.sql');",
        )]);

        let err = Migrator::new(Arc::clone(&db))
            .migrate(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::MigrationExecution {
                phase: MigrationPhase::Record,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_and_can_be_retried() {
        let db = create_test_db().await;
        let dir = migrations(&[(
            "1__schema.sql",
            "CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (
                id INTEGER PRIMARY KEY,
                parent_id INTEGER REFERENCES parent(id) DEFERRABLE INITIALLY DEFERRED
             );
             INSERT INTO child (parent_id) VALUES (42);",
        )]);
        let migrator = Migrator::new(Arc::clone(&db));

        let err = migrator.migrate(dir.path()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Commit(_)));
        assert!(!db.in_transaction());
        assert!(!table_exists(&db, "parent").await);
        assert!(!table_exists(&db, "schemas").await);

        let retry = migrator.migrate(dir.path()).await.unwrap_err();
        assert!(matches!(retry, DatabaseError::Commit(_)));
        assert!(!db.in_transaction());
    }

    #[tokio::test]
    async fn test_schema_setup_failure() {
        let db = create_test_db().await;
        let dir = migrations(&[("1__a.sql", "CREATE TABLE a (id INTEGER);")]);
        let config = MigratorConfig {
            table_name: "bad name".to_string(),
            ..Default::default()
        };

        let err = Migrator::with_config(Arc::clone(&db), config)
            .migrate(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::SchemaSetup(_)));
        assert!(!db.in_transaction());
        assert!(!table_exists(&db, "a").await);
    }

    #[tokio::test]
    async fn test_numeric_ordinals_order_numerically() {
        let db = create_test_db().await;
        let dir = migrations(&[
            ("10__insert.sql", "INSERT INTO t (v) VALUES ('x');"),
            ("2__create.sql", "CREATE TABLE t (v TEXT);"),
        ]);

        let report = Migrator::new(Arc::clone(&db))
            .migrate(dir.path())
            .await
            .unwrap();
        assert_eq!(report.applied, vec!["2__create.sql", "10__insert.sql"]);
    }

    #[tokio::test]
    async fn test_non_migration_entries_are_ignored() {
        let db = create_test_db().await;
        let dir = migrations(&[
            ("1__a.sql", "CREATE TABLE a (id INTEGER);"),
            ("README.md", "not sql"),
        ]);
        fs::create_dir(dir.path().join("2__nested.sql")).unwrap();

        let report = Migrator::new(Arc::clone(&db))
            .migrate(dir.path())
            .await
            .unwrap();
        assert_eq!(report.applied, vec!["1__a.sql"]);
    }

    #[tokio::test]
    async fn test_no_migrations_found() {
        let db = create_test_db().await;
        let dir = migrations(&[("notes.txt", "nothing here")]);

        let err = Migrator::new(Arc::clone(&db))
            .migrate(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NoMigrationsFound(_)));
        assert!(!table_exists(&db, "schemas").await);
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let db = create_test_db().await;
        let dir = tempfile::tempdir().unwrap();

        let err = Migrator::new(Arc::clone(&db))
            .migrate(dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DirectoryRead { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_ordinals_are_rejected() {
        let db = create_test_db().await;
        let dir = migrations(&[
            ("1__a.sql", "CREATE TABLE a (id INTEGER);"),
            ("001__b.sql", "CREATE TABLE b (id INTEGER);"),
        ]);

        let err = Migrator::new(Arc::clone(&db))
            .migrate(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateMigrationOrdinal { .. }));
        assert!(!table_exists(&db, "a").await);
    }

    #[tokio::test]
    async fn test_unreadable_file() {
        let db = create_test_db().await;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("1__binary.sql"), [0xff, 0xfe, 0x00]).unwrap();

        let err = Migrator::new(Arc::clone(&db))
            .migrate(dir.path())
            .await
            .unwrap_err();
        match err {
            DatabaseError::FileRead { file, .. } => assert_eq!(file, "1__binary.sql"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_migrate_requires_connection() {
        let db = Arc::new(SqliteDatabase::new());
        let dir = migrations(&[("1__a.sql", "CREATE TABLE a (id INTEGER);")]);

        let err = Migrator::new(db).migrate(dir.path()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_pending_lists_unapplied_files() {
        let db = create_test_db().await;
        let dir = migrations(&[("1__a.sql", "CREATE TABLE a (id INTEGER);")]);
        let migrator = Migrator::new(Arc::clone(&db));

        let pending = migrator.pending(dir.path()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!table_exists(&db, "schemas").await);

        migrator.migrate(dir.path()).await.unwrap();
        fs::write(dir.path().join("2__b.sql"), "CREATE TABLE b (id INTEGER);").unwrap();

        let pending = migrator.pending(dir.path()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name(), "2__b.sql");
    }

    #[tokio::test]
    async fn test_custom_config() {
        let db = create_test_db().await;
        let dir = migrations(&[
            ("1__a.ddl", "CREATE TABLE a (id INTEGER);"),
            ("2__b.sql", "CREATE TABLE b (id INTEGER);"),
        ]);
        let config = MigratorConfig {
            table_name: "applied_migrations".to_string(),
            extension: "ddl".to_string(),
        };

        let report = Migrator::with_config(Arc::clone(&db), config)
            .migrate(dir.path())
            .await
            .unwrap();
        assert_eq!(report.applied, vec!["1__a.ddl"]);
        assert!(table_exists(&db, "applied_migrations").await);
        assert!(!table_exists(&db, "schemas").await);
        assert!(!table_exists(&db, "b").await);
    }
}

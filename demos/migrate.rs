//! Migration runner example
//!
//! Applies the `.sql` files of a directory and prints the tracking table
//! afterwards.
//!
//! Run with: cargo run --example migrate -- <backend> <database> <migrations-dir>
//!
//! `<backend>` is `sqlite` (the default) or `postgres`. For SQLite
//! `<database>` is a file path. For PostgreSQL it is the database name, and
//! `PGHOST`, `PGPORT`, `PGUSER` and `PGPASSWORD` fill in the rest; the
//! `postgres` feature must be enabled.
//!
//! Set `RUST_LOG=kin=debug` for per-file progress.

use kin::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

async fn run<D: Database + 'static>(db: Arc<D>, connection_string: &str, dir: &str) -> Result<()> {
    db.connect(connection_string).await?;

    let migrator = Migrator::new(Arc::clone(&db));
    for file in migrator.pending(dir).await? {
        println!("pending: {}", file.name());
    }

    let report = migrator.migrate(dir).await?;
    println!(
        "applied {}, skipped {}",
        report.applied.len(),
        report.skipped.len()
    );

    for record in migrator.applied().await? {
        println!("{:>4}  {:<40} {}", record.id, record.filename, record.applied_on);
    }

    db.disconnect().await
}

fn connection_string(db_type: DatabaseType, database: String) -> String {
    let mut builder = ConnectionBuilder::new(db_type).database(database);
    if db_type == DatabaseType::Postgres {
        builder = builder.host(std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()));
        if let Some(port) = std::env::var("PGPORT").ok().and_then(|p| p.parse().ok()) {
            builder = builder.port(port);
        }
        if let Ok(user) = std::env::var("PGUSER") {
            builder = builder.username(user);
        }
        if let Ok(password) = std::env::var("PGPASSWORD") {
            builder = builder.password(password);
        }
    }
    builder.build_connection_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let db_type: DatabaseType = args
        .next()
        .unwrap_or_else(|| "sqlite".to_string())
        .parse()
        .map_err(DatabaseError::other)?;
    let database = args.next().unwrap_or_else(|| "kin.db".to_string());
    let dir = args.next().unwrap_or_else(|| "migrations".to_string());

    let connection_string = connection_string(db_type, database);

    match db_type {
        DatabaseType::Sqlite => run(Arc::new(SqliteDatabase::new()), &connection_string, &dir).await,
        #[cfg(feature = "postgres")]
        DatabaseType::Postgres => run(Arc::new(PostgresDatabase::new()), &connection_string, &dir).await,
        #[cfg(not(feature = "postgres"))]
        DatabaseType::Postgres => Err(DatabaseError::other(
            "built without the postgres feature",
        )),
    }
}

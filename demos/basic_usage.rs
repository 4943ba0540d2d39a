//! Basic usage example
//!
//! This example demonstrates:
//! - Connecting to a database
//! - Inserting models with only the fields that are set
//! - Querying rows and extracting typed values
//! - Handling the sticky extraction error
//!
//! Run with: cargo run --example basic_usage

use chrono::{DateTime, Utc};
use kin::prelude::*;

#[derive(Debug, Default)]
struct User {
    id: Option<i64>,
    username: Option<String>,
    balance: Option<f64>,
    is_active: Option<bool>,
    created_at: Option<DateTime<Utc>>,
}

impl Builder for User {
    fn columns(&mut self) -> Vec<Box<dyn FieldBuilder + '_>> {
        vec![
            int_field("id", &mut self.id),
            string_field("username", &mut self.username),
            decimal_field("balance", &mut self.balance),
            bool_field("is_active", &mut self.is_active),
            time_field("created_at", &mut self.created_at),
        ]
    }
}

impl Model for User {
    fn table_name(&self) -> &str {
        "users"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== kin - Basic Usage Example ===\n");

    let db = SqliteDatabase::new();

    println!("1. Connecting to database...");
    db.connect(":memory:").await?;
    println!("   ✓ Connected\n");

    println!("2. Creating table...");
    db.execute(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            balance REAL NOT NULL DEFAULT 0,
            is_active BOOLEAN NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
    )
    .await?;
    println!("   ✓ Table created\n");

    println!("3. Inserting users...");
    for (username, balance) in [("alice", Some(1500.5)), ("bob", None), ("charlie", Some(980.25))] {
        let mut user = User {
            username: Some(username.to_string()),
            balance,
            ..Default::default()
        };
        println!("   {}", insert_query(&db, &mut user).statement());
        insert(&db, &mut user).await?;
        println!(
            "   ✓ Inserted {} with id {:?}, created at {:?}",
            username, user.id, user.created_at
        );
    }
    println!();

    println!("4. Querying users...");
    db.query("SELECT id, username, balance FROM users ORDER BY id", vec![])
        .extract_fn(|mut row| {
            let id = row.extract_int("id");
            let username = row.extract_string("username");
            let balance = row.extract_decimal("balance");
            row.finish()?;
            println!("   {:>2} {:<10} {:>10.2}", id, username, balance);
            Ok(())
        })
        .await?;
    println!();

    println!("5. Loading a single user...");
    let mut bob = User::default();
    db.query("SELECT * FROM users WHERE username = $1", vec!["bob".into()])
        .one_and_extract(&mut bob)
        .await?;
    println!("   ✓ {:?}\n", bob);

    println!("6. Extraction errors stick to the row...");
    let mut row = db
        .query("SELECT username FROM users WHERE id = $1", vec![1i64.into()])
        .one()
        .await?;
    let as_number = row.extract_int("username");
    let after = row.extract_string("username");
    println!("   extract_int -> {}, extract_string -> {:?}", as_number, after);
    if let Err(e) = row.finish() {
        println!("   ✓ First error kept: {}\n", e);
    }

    println!("7. Missing rows...");
    match db
        .query("SELECT * FROM users WHERE id = $1", vec![99i64.into()])
        .one()
        .await
    {
        Err(DatabaseError::NoRows) => println!("   ✓ No user 99\n"),
        other => println!("   unexpected: {:?}\n", other.map(|_| ())),
    }

    db.disconnect().await?;
    println!("=== Example completed successfully ===");

    Ok(())
}

//! Transaction management example
//!
//! This example demonstrates:
//! - Running queries and inserts inside a transaction
//! - Committing and rolling back
//! - Automatic rollback when a guard is dropped
//! - Rejection of nested transactions
//!
//! Run with: cargo run --example transactions

use kin::prelude::*;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Account {
    id: Option<i64>,
    owner: Option<String>,
    balance: Option<f64>,
}

impl Builder for Account {
    fn columns(&mut self) -> Vec<Box<dyn FieldBuilder + '_>> {
        vec![
            int_field("id", &mut self.id),
            string_field("owner", &mut self.owner),
            decimal_field("balance", &mut self.balance),
        ]
    }
}

impl Model for Account {
    fn table_name(&self) -> &str {
        "accounts"
    }
}

async fn balance_of(conn: &dyn Executor, owner: &str) -> Result<f64> {
    Query::new(conn, "SELECT balance FROM accounts WHERE owner = $1", vec![owner.into()])
        .one_and_extract_fn(|mut row| {
            let balance = row.extract_decimal("balance");
            row.finish().map(|_| balance)
        })
        .await
}

async fn transfer(db: Arc<SqliteDatabase>, from: &str, to: &str, amount: f64) -> Result<()> {
    let tx = TransactionGuard::begin(db).await?;

    let available = balance_of(&tx, from).await?;
    if available < amount {
        tx.rollback().await?;
        return Err(DatabaseError::transaction(format!(
            "insufficient funds: {} has {:.2}",
            from, available
        )));
    }

    tx.execute_with_params(
        "UPDATE accounts SET balance = balance - $1 WHERE owner = $2",
        &[amount.into(), from.into()],
    )
    .await?;
    tx.execute_with_params(
        "UPDATE accounts SET balance = balance + $1 WHERE owner = $2",
        &[amount.into(), to.into()],
    )
    .await?;

    tx.commit().await
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== kin - Transactions Example ===\n");

    let db = Arc::new(SqliteDatabase::new());
    db.connect(":memory:").await?;
    db.execute(
        "CREATE TABLE accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL UNIQUE,
            balance REAL NOT NULL DEFAULT 0
        )",
    )
    .await?;

    println!("1. Opening accounts in one transaction...");
    let tx = TransactionGuard::begin(Arc::clone(&db)).await?;
    for (owner, balance) in [("alice", 1000.0), ("bob", 500.0)] {
        let mut account = Account {
            owner: Some(owner.to_string()),
            balance: Some(balance),
            ..Default::default()
        };
        insert(&tx, &mut account).await?;
        println!("   ✓ {:?}", account);
    }
    tx.commit().await?;
    println!();

    println!("2. Successful transfer...");
    transfer(Arc::clone(&db), "alice", "bob", 200.0).await?;
    println!(
        "   ✓ alice: {:.2}, bob: {:.2}\n",
        balance_of(&*db, "alice").await?,
        balance_of(&*db, "bob").await?
    );

    println!("3. Transfer with insufficient funds...");
    if let Err(e) = transfer(Arc::clone(&db), "bob", "alice", 5000.0).await {
        println!("   ✓ Rejected: {}", e);
    }
    println!(
        "   alice: {:.2}, bob: {:.2}\n",
        balance_of(&*db, "alice").await?,
        balance_of(&*db, "bob").await?
    );

    println!("4. Nested transactions are rejected...");
    let tx = TransactionGuard::begin(Arc::clone(&db)).await?;
    match tx.start_transaction().await {
        Err(DatabaseError::TransactionAlreadyStarted) => println!("   ✓ TransactionAlreadyStarted"),
        _ => println!("   unexpected nested transaction"),
    }
    tx.rollback().await?;
    println!();

    println!("5. Dropping a guard rolls back...");
    {
        let tx = TransactionGuard::begin(Arc::clone(&db)).await?;
        tx.execute("DELETE FROM accounts").await?;
        println!("   Deleted all accounts inside the transaction");
    }
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    let mut row = db
        .query("SELECT COUNT(*) AS n FROM accounts", vec![])
        .one()
        .await?;
    println!("   ✓ Accounts after drop: {}\n", row.extract_int("n"));

    db.disconnect().await?;
    println!("=== Example completed successfully ===");

    Ok(())
}

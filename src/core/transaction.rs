//! Transaction guard for automatic rollback on drop
//!
//! This module provides RAII-style transaction management with automatic rollback.

use super::database::Database;
use super::error::{DatabaseError, Result};
use super::query::Executor;
use super::result::RowCursor;
use super::value::DatabaseValue;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Transaction guard that automatically rolls back on drop if not committed
///
/// The guard is a connection-like handle: queries built from it with
/// [`Executor::query`] run inside the transaction. If the guard is dropped
/// without calling `commit()` or `rollback()`, a rollback is scheduled.
///
/// # Example
///
/// ```ignore
/// use kin::prelude::*;
///
/// async fn transfer(db: Arc<SqliteDatabase>) -> Result<()> {
///     let tx = TransactionGuard::begin(db).await?;
///
///     tx.execute("UPDATE accounts SET balance = balance - 100 WHERE id = 1").await?;
///     tx.execute("UPDATE accounts SET balance = balance + 100 WHERE id = 2").await?;
///
///     tx.commit().await?;
///     Ok(())
/// }
/// ```
pub struct TransactionGuard<D: Database + 'static> {
    db: Arc<D>,
    committed: AtomicBool,
    rolled_back: AtomicBool,
}

impl<D: Database + 'static> TransactionGuard<D> {
    /// Begin a new transaction
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database is not connected
    /// - A transaction is already active (`TransactionAlreadyStarted`)
    /// - Database operation fails
    pub async fn begin(db: Arc<D>) -> Result<Self> {
        db.begin_transaction().await?;

        Ok(Self {
            db,
            committed: AtomicBool::new(false),
            rolled_back: AtomicBool::new(false),
        })
    }

    /// Start a nested transaction
    ///
    /// Always fails: only one transaction may be open per connection.
    pub async fn start_transaction(&self) -> Result<TransactionGuard<D>> {
        Err(DatabaseError::TransactionAlreadyStarted)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.committed.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(
                "Cannot use a committed transaction",
            ));
        }
        if self.rolled_back.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(
                "Cannot use a rolled back transaction",
            ));
        }
        Ok(())
    }

    /// Execute a statement within the transaction
    pub async fn execute(&self, statement: &str) -> Result<u64> {
        self.ensure_active()?;
        self.db.execute(statement).await
    }

    /// Execute a parameterized statement within the transaction
    pub async fn execute_with_params(
        &self,
        statement: &str,
        params: &[DatabaseValue],
    ) -> Result<u64> {
        self.ensure_active()?;
        self.db.execute_with_params(statement, params).await
    }

    /// Execute a batch of statements within the transaction
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ensure_active()?;
        self.db.execute_batch(sql).await
    }

    /// Commit the transaction
    ///
    /// After calling this method, the transaction is complete and the guard
    /// will not perform automatic rollback on drop. If `COMMIT` fails while
    /// the connection is still inside the transaction, it is rolled back
    /// before the commit error is returned.
    pub async fn commit(self) -> Result<()> {
        if self.rolled_back.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(
                "Cannot commit a rolled back transaction",
            ));
        }

        self.committed.store(true, Ordering::Release);
        let err = match self.db.commit().await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        if self.db.in_transaction() {
            tracing::warn!(error = %err, "commit failed; rolling back");
            if let Err(rollback_err) = self.db.rollback().await {
                tracing::error!(error = %rollback_err, "rollback after failed commit failed");
            }
        }
        Err(err)
    }

    /// Explicitly rollback the transaction
    pub async fn rollback(self) -> Result<()> {
        if self.committed.load(Ordering::Acquire) {
            return Err(DatabaseError::transaction(
                "Cannot rollback a committed transaction",
            ));
        }

        self.rolled_back.store(true, Ordering::Release);
        self.db.rollback().await
    }

}

#[async_trait]
impl<D: Database + 'static> Executor for TransactionGuard<D> {
    async fn fetch(&self, statement: &str, params: &[DatabaseValue]) -> Result<Box<dyn RowCursor>> {
        self.ensure_active()?;
        self.db.query_with_params(statement, params).await
    }
}

impl<D: Database + 'static> Drop for TransactionGuard<D> {
    fn drop(&mut self) {
        if self.committed.load(Ordering::Acquire) || self.rolled_back.load(Ordering::Acquire) {
            return;
        }
        self.rolled_back.store(true, Ordering::Release);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let db = Arc::clone(&self.db);
                tracing::warn!("transaction dropped without commit or rollback; rolling back");
                handle.spawn(async move {
                    if let Err(e) = db.rollback().await {
                        tracing::error!(error = %e, "auto-rollback failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    "transaction dropped outside a tokio runtime; it is rolled back when the connection closes"
                );
            }
        }
    }
}

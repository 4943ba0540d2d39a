//! Deferred, parameterized queries
//!
//! A [`Query`] pairs a statement and its parameters with a connection-like
//! handle (a [`Database`] or a [`TransactionGuard`](super::TransactionGuard))
//! and only touches the database when one of its run methods is awaited. The
//! same query can be run any number of times.

use super::builder::Builder;
use super::database::Database;
use super::error::{DatabaseError, Result};
use super::result::{ResultSet, RowCursor};
use super::row::RowExtractor;
use super::value::DatabaseValue;
use async_trait::async_trait;

/// A handle statements can be prepared and run against
#[async_trait]
pub trait Executor: Send + Sync {
    /// Prepare and run a statement, returning a cursor over its rows
    async fn fetch(&self, statement: &str, params: &[DatabaseValue]) -> Result<Box<dyn RowCursor>>;

    /// Create a query bound to this handle
    fn query(&self, statement: &str, params: Vec<DatabaseValue>) -> Query<'_>
    where
        Self: Sized,
    {
        Query::new(self, statement, params)
    }
}

#[async_trait]
impl<D: Database> Executor for D {
    async fn fetch(&self, statement: &str, params: &[DatabaseValue]) -> Result<Box<dyn RowCursor>> {
        self.query_with_params(statement, params).await
    }
}

/// A SQL query that has yet to be executed
pub struct Query<'c> {
    conn: &'c dyn Executor,
    statement: String,
    params: Vec<DatabaseValue>,
}

impl<'c> Query<'c> {
    /// Bind a statement and its parameters to a handle
    pub fn new(conn: &'c dyn Executor, statement: impl Into<String>, params: Vec<DatabaseValue>) -> Self {
        Self {
            conn,
            statement: statement.into(),
            params,
        }
    }

    /// Statement text
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Bound parameters, in placeholder order
    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }

    /// Execute the query and return all rows
    pub async fn run(&self) -> Result<ResultSet> {
        let cursor = self.conn.fetch(&self.statement, &self.params).await?;
        ResultSet::from_cursor(cursor)
    }

    /// Execute the query and return the first row
    ///
    /// Fails with `NoRows` when the result is empty; extra rows are ignored.
    pub async fn one(&self) -> Result<RowExtractor> {
        self.run()
            .await?
            .into_rows()
            .into_iter()
            .next()
            .ok_or(DatabaseError::NoRows)
    }

    /// Execute the query and fill `builder` from the first row
    ///
    /// Every field of the builder is set in registration order; the first
    /// extraction error is returned.
    pub async fn one_and_extract<B: Builder + ?Sized>(&self, builder: &mut B) -> Result<()> {
        let mut row = self.one().await?;
        for mut field in builder.columns() {
            field.set(&mut row);
        }
        row.finish()
    }

    /// Execute the query and hand the first row to `extract`
    pub async fn one_and_extract_fn<T, F>(&self, extract: F) -> Result<T>
    where
        F: FnOnce(RowExtractor) -> Result<T>,
    {
        extract(self.one().await?)
    }

    /// Execute the query and hand every row, in order, to `extract`
    ///
    /// The first error returned by `extract` stops the iteration.
    pub async fn extract_fn<F>(&self, mut extract: F) -> Result<()>
    where
        F: FnMut(RowExtractor) -> Result<()>,
    {
        for row in self.run().await?.into_rows() {
            extract(row)?;
        }
        Ok(())
    }
}

//! Query result sets
//!
//! Drivers hand back a [`RowCursor`]; [`ResultSet::from_cursor`] drains it
//! eagerly into [`RowExtractor`]s. The cursor is moved into the constructor, so
//! it is released on every exit path.

use super::error::Result;
use super::row::RowExtractor;
use super::value::DatabaseValue;
use std::collections::VecDeque;

/// A driver-side cursor over the rows of an executed statement
pub trait RowCursor: Send {
    /// Column names of the result, in order
    fn columns(&self) -> &[String];

    /// Advance to the next row
    ///
    /// Returns `None` once the cursor is exhausted.
    fn next_row(&mut self) -> Option<Result<Vec<DatabaseValue>>>;
}

/// Cursor over rows already fetched from the driver
///
/// A row error ends iteration: it is yielded once and the cursor is exhausted
/// afterwards.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    columns: Vec<String>,
    rows: VecDeque<Result<Vec<DatabaseValue>>>,
}

impl BufferedCursor {
    /// Create a cursor for the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: VecDeque::new(),
        }
    }

    /// Queue a fetched row
    pub fn push_row(&mut self, row: Vec<DatabaseValue>) {
        self.rows.push_back(Ok(row));
    }

    /// Queue a fetch failure
    pub fn push_error(&mut self, err: super::error::DatabaseError) {
        self.rows.push_back(Err(err));
    }
}

impl RowCursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Option<Result<Vec<DatabaseValue>>> {
        let next = self.rows.pop_front()?;
        if next.is_err() {
            self.rows.clear();
        }
        Some(next)
    }
}

/// Results of a database query
#[derive(Debug, Default)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<RowExtractor>,
}

impl ResultSet {
    /// Drain a cursor into a result set
    ///
    /// Every value is scanned into a raw byte buffer (`NULL` stays `Null`).
    /// The first row error aborts the whole set.
    pub fn from_cursor(mut cursor: Box<dyn RowCursor>) -> Result<Self> {
        let columns = cursor.columns().to_vec();
        let mut rows = Vec::new();

        while let Some(next) = cursor.next_row() {
            let raw = next?
                .iter()
                .map(|value| match value.to_raw_bytes() {
                    Some(bytes) => DatabaseValue::Bytes(bytes),
                    None => DatabaseValue::Null,
                })
                .collect();
            rows.push(RowExtractor::new(columns.clone(), raw));
        }

        Ok(Self { columns, rows })
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows in result order
    pub fn rows(&self) -> &[RowExtractor] {
        &self.rows
    }

    /// Mutable access to the rows, for extraction
    pub fn rows_mut(&mut self) -> &mut [RowExtractor] {
        &mut self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the query returned no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Take ownership of the rows
    pub fn into_rows(self) -> Vec<RowExtractor> {
        self.rows
    }
}

//! Typed extraction from a single result row
//!
//! A [`RowExtractor`] holds one row of raw column buffers and hands out typed
//! values on request. The first failure is stored on the row and every later
//! extraction becomes a no-op returning the type's zero value, so a model can
//! be filled with a run of `extract_*` calls followed by a single error check.
//!
//! ```rust
//! use kin::core::{DatabaseValue, RowExtractor};
//!
//! let mut row = RowExtractor::new(
//!     vec!["id".to_string(), "name".to_string()],
//!     vec![DatabaseValue::Bytes(b"7".to_vec()), DatabaseValue::Bytes(b"Ada".to_vec())],
//! );
//!
//! let id = row.extract_int("id");
//! let name = row.extract_string("name");
//! assert!(row.err().is_none());
//! assert_eq!((id, name.as_str()), (7, "Ada"));
//! ```

use super::error::{DatabaseError, Result};
use super::value::{parse_timestamp, DatabaseValue};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Results of a single row in a query result set
#[derive(Debug)]
pub struct RowExtractor {
    columns: Vec<String>,
    raw: HashMap<String, DatabaseValue>,
    err: Option<DatabaseError>,
}

impl RowExtractor {
    /// Build a row from column names and the scanned value of each column
    ///
    /// Values are paired with columns by position. Scanned columns hold
    /// `DatabaseValue::Bytes`; `DatabaseValue::Null` marks a SQL `NULL`.
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        let raw = columns.iter().cloned().zip(values).collect();
        Self {
            columns,
            raw,
            err: None,
        }
    }

    /// Column names in result order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The first error hit while extracting, if any
    pub fn err(&self) -> Option<&DatabaseError> {
        self.err.as_ref()
    }

    /// Consume the row, returning the accumulated error
    pub fn finish(self) -> Result<()> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether the column holds a SQL `NULL`
    ///
    /// Does not touch the sticky error; unknown columns report `false`.
    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.raw.get(column), Some(DatabaseValue::Null))
    }

    fn fail(&mut self, err: DatabaseError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    /// Get the raw bytes stored for a column
    ///
    /// Returns `None` if the row is already poisoned, or poisons it when the
    /// column is missing or not a byte buffer.
    pub fn extract_column(&mut self, column: &str) -> Option<&[u8]> {
        if self.err.is_some() {
            return None;
        }

        match self.raw.get(column) {
            Some(DatabaseValue::Bytes(bytes)) => Some(bytes.as_slice()),
            Some(other) => {
                let actual = other.type_name();
                self.err = Some(DatabaseError::type_mismatch(column, actual));
                None
            }
            None => {
                self.err = Some(DatabaseError::ColumnNotFound(column.to_string()));
                None
            }
        }
    }

    fn extract_text(&mut self, column: &str) -> Option<String> {
        self.extract_column(column)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Extract a base-10 integer
    pub fn extract_int(&mut self, column: &str) -> i64 {
        let Some(text) = self.extract_text(column) else {
            return 0;
        };

        match text.parse::<i64>() {
            Ok(value) => value,
            Err(e) => {
                self.fail(DatabaseError::parse(column, text, "an int", e));
                0
            }
        }
    }

    /// Extract a floating point number
    pub fn extract_decimal(&mut self, column: &str) -> f64 {
        let Some(text) = self.extract_text(column) else {
            return 0.0;
        };

        match text.parse::<f64>() {
            Ok(value) => value,
            Err(e) => {
                self.fail(DatabaseError::parse(column, text, "a decimal", e));
                0.0
            }
        }
    }

    /// Extract a boolean written in one of the canonical boolean spellings
    pub fn extract_bool(&mut self, column: &str) -> bool {
        let Some(text) = self.extract_text(column) else {
            return false;
        };

        match parse_bool(&text) {
            Some(value) => value,
            None => {
                self.fail(DatabaseError::parse(
                    column,
                    text.clone(),
                    "a bool",
                    format!("invalid syntax for bool: {:?}", text),
                ));
                false
            }
        }
    }

    /// Extract the column as UTF-8 text
    pub fn extract_string(&mut self, column: &str) -> String {
        self.extract_text(column).unwrap_or_default()
    }

    /// Extract a UTC timestamp
    ///
    /// Returns the Unix epoch, not the current time, when the row is poisoned
    /// or the value does not parse. The epoch is the same zero value
    /// `DateTime::<Utc>::default()` yields.
    pub fn extract_time(&mut self, column: &str) -> DateTime<Utc> {
        let Some(text) = self.extract_text(column) else {
            return DateTime::<Utc>::default();
        };

        match parse_timestamp(&text) {
            Ok(value) => value,
            Err(e) => {
                self.fail(DatabaseError::parse(column, text, "a timestamp", e));
                DateTime::<Utc>::default()
            }
        }
    }

    /// Decode a JSON column into `out`
    ///
    /// `out` is left untouched when the row is poisoned or decoding fails.
    pub fn extract_json<T: DeserializeOwned>(&mut self, column: &str, out: &mut T) {
        let decoded = match self.extract_column(column) {
            Some(bytes) => serde_json::from_slice::<T>(bytes)
                .map_err(|e| (String::from_utf8_lossy(bytes).into_owned(), e)),
            None => return,
        };

        match decoded {
            Ok(value) => *out = value,
            Err((text, e)) => self.fail(DatabaseError::parse(column, text, "json", e)),
        }
    }
}

/// Parse the boolean spellings accepted by SQL text protocols
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

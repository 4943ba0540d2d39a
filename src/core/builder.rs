//! Field builders: mapping model fields to columns
//!
//! A model lists its columns as [`FieldBuilder`]s, each pairing a column name
//! with a mutable borrow of one of the model's slots. The same list drives
//! both directions: [`Query::one_and_extract`](super::Query::one_and_extract)
//! fills the slots from a row, and [`insert_query`] turns the slots that hold a
//! value into an `INSERT` statement.
//!
//! Slots are `Option<T>`. `None` means "not provided", so a legitimate `0`,
//! `false` or `""` is still written on insert.
//!
//! ```rust
//! use chrono::{DateTime, Utc};
//! use kin::core::{int_field, string_field, time_field, Builder, FieldBuilder, Model};
//!
//! #[derive(Default)]
//! struct User {
//!     id: Option<i64>,
//!     name: Option<String>,
//!     created_at: Option<DateTime<Utc>>,
//! }
//!
//! impl Builder for User {
//!     fn columns(&mut self) -> Vec<Box<dyn FieldBuilder + '_>> {
//!         vec![
//!             int_field("id", &mut self.id),
//!             string_field("name", &mut self.name),
//!             time_field("created_at", &mut self.created_at),
//!         ]
//!     }
//! }
//!
//! impl Model for User {
//!     fn table_name(&self) -> &str {
//!         "users"
//!     }
//! }
//! ```

use super::error::Result;
use super::query::{Executor, Query};
use super::row::RowExtractor;
use super::value::DatabaseValue;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A column bound to a typed slot
pub trait FieldBuilder: Send {
    /// Column name
    fn name(&self) -> &str;

    /// Assign the slot from a row
    ///
    /// A SQL `NULL` clears the slot. Otherwise the slot is only written when
    /// the extraction succeeds; failures are recorded on the row.
    fn set(&mut self, row: &mut RowExtractor);

    /// Current slot value as a statement parameter
    fn get(&self) -> DatabaseValue;

    /// Whether the slot holds a value
    fn is_set(&self) -> bool;
}

/// Slot types a [`Field`] can bind
pub trait FieldValue: Sized + Send {
    /// Pull a value of this type out of a row
    fn extract(row: &mut RowExtractor, column: &str) -> Self;

    /// Convert to a statement parameter
    fn to_value(&self) -> DatabaseValue;
}

impl FieldValue for i64 {
    fn extract(row: &mut RowExtractor, column: &str) -> Self {
        row.extract_int(column)
    }

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Long(*self)
    }
}

impl FieldValue for f64 {
    fn extract(row: &mut RowExtractor, column: &str) -> Self {
        row.extract_decimal(column)
    }

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Double(*self)
    }
}

impl FieldValue for bool {
    fn extract(row: &mut RowExtractor, column: &str) -> Self {
        row.extract_bool(column)
    }

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Bool(*self)
    }
}

impl FieldValue for String {
    fn extract(row: &mut RowExtractor, column: &str) -> Self {
        row.extract_string(column)
    }

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::String(self.clone())
    }
}

impl FieldValue for DateTime<Utc> {
    fn extract(row: &mut RowExtractor, column: &str) -> Self {
        row.extract_time(column)
    }

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::from(*self)
    }
}

/// A column bound to an `Option<T>` slot
pub struct Field<'a, T> {
    name: String,
    slot: &'a mut Option<T>,
}

impl<'a, T: FieldValue> Field<'a, T> {
    /// Bind `slot` to `name`
    pub fn new(name: impl Into<String>, slot: &'a mut Option<T>) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

impl<T: FieldValue> FieldBuilder for Field<'_, T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&mut self, row: &mut RowExtractor) {
        if row.err().is_none() && row.is_null(&self.name) {
            *self.slot = None;
            return;
        }

        let value = T::extract(row, &self.name);
        if row.err().is_none() {
            *self.slot = Some(value);
        }
    }

    fn get(&self) -> DatabaseValue {
        self.slot
            .as_ref()
            .map_or(DatabaseValue::Null, T::to_value)
    }

    fn is_set(&self) -> bool {
        self.slot.is_some()
    }
}

/// A column holding a JSON document, bound to any serde type
pub struct JsonField<'a, T> {
    name: String,
    slot: &'a mut Option<T>,
}

impl<T> FieldBuilder for JsonField<'_, T>
where
    T: Serialize + DeserializeOwned + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn set(&mut self, row: &mut RowExtractor) {
        if row.err().is_none() && row.is_null(&self.name) {
            *self.slot = None;
            return;
        }

        let mut decoded: Option<T> = None;
        row.extract_json(&self.name, &mut decoded);
        if row.err().is_none() {
            *self.slot = decoded;
        }
    }

    fn get(&self) -> DatabaseValue {
        match self.slot.as_ref().map(serde_json::to_value) {
            Some(Ok(value)) => DatabaseValue::Json(value),
            Some(Err(_)) | None => DatabaseValue::Null,
        }
    }

    fn is_set(&self) -> bool {
        self.slot.is_some()
    }
}

/// Reference a boolean field
pub fn bool_field<'a>(name: &str, slot: &'a mut Option<bool>) -> Box<dyn FieldBuilder + 'a> {
    Box::new(Field::new(name, slot))
}

/// Reference a floating point field
pub fn decimal_field<'a>(name: &str, slot: &'a mut Option<f64>) -> Box<dyn FieldBuilder + 'a> {
    Box::new(Field::new(name, slot))
}

/// Reference an integer field
pub fn int_field<'a>(name: &str, slot: &'a mut Option<i64>) -> Box<dyn FieldBuilder + 'a> {
    Box::new(Field::new(name, slot))
}

/// Reference a string field
pub fn string_field<'a>(name: &str, slot: &'a mut Option<String>) -> Box<dyn FieldBuilder + 'a> {
    Box::new(Field::new(name, slot))
}

/// Reference a timestamp field
pub fn time_field<'a>(
    name: &str,
    slot: &'a mut Option<DateTime<Utc>>,
) -> Box<dyn FieldBuilder + 'a> {
    Box::new(Field::new(name, slot))
}

/// Reference a JSON field
pub fn json_field<'a, T>(name: &str, slot: &'a mut Option<T>) -> Box<dyn FieldBuilder + 'a>
where
    T: Serialize + DeserializeOwned + Send + 'a,
{
    Box::new(JsonField {
        name: name.to_string(),
        slot,
    })
}

/// A data structure that can be constructed from a result row
pub trait Builder {
    /// The fields that can be extracted from a row, in registration order
    ///
    /// Field names must be unique within one builder.
    fn columns(&mut self) -> Vec<Box<dyn FieldBuilder + '_>>;
}

/// A data structure that maps to a table
pub trait Model: Builder {
    /// The table this model is inserted into
    fn table_name(&self) -> &str;
}

/// Build the `INSERT ... RETURNING *` statement for a model
///
/// Only fields that hold a value are listed, in registration order, so the
/// database fills in defaults for the rest.
pub fn insert_query<'c, M: Model + ?Sized>(conn: &'c dyn Executor, model: &mut M) -> Query<'c> {
    let table = model.table_name().to_string();
    let mut names = Vec::new();
    let mut params = Vec::new();

    for field in model.columns() {
        if field.is_set() {
            names.push(field.name().to_string());
            params.push(field.get());
        }
    }

    let statement = if names.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("${}", i)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            names.join(", "),
            placeholders.join(", ")
        )
    };

    Query::new(conn, statement, params)
}

/// Insert a model and refresh it from the returned row
pub async fn insert<M: Model + ?Sized>(conn: &dyn Executor, model: &mut M) -> Result<()> {
    let query = insert_query(conn, model);
    query.one_and_extract(model).await
}

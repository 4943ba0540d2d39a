//! PostgreSQL database backend implementation
//!
//! This module provides a PostgreSQL implementation of the Database trait using tokio-postgres.

use crate::core::{
    database::Database, database_types::DatabaseType, error::DatabaseError, error::Result,
    result::BufferedCursor, result::RowCursor, value::parse_timestamp, value::DatabaseValue,
};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};

type Param = Box<dyn ToSql + Sync + Send>;
type SqlResult<T> = std::result::Result<T, Box<dyn std::error::Error + Sync + Send>>;

/// SQL `NULL` accepted for a parameter of any type
#[derive(Debug)]
struct SqlNull;

impl ToSql for SqlNull {
    fn to_sql(&self, _: &Type, _: &mut BytesMut) -> SqlResult<IsNull> {
        Ok(IsNull::Yes)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Parameter already in the wire format of its target type
#[derive(Debug)]
struct RawParam(Vec<u8>);

impl ToSql for RawParam {
    fn to_sql(&self, _: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
        out.extend_from_slice(&self.0);
        Ok(IsNull::No)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Decimal text bound to a `numeric` parameter
#[derive(Debug)]
struct Numeric(String);

impl ToSql for Numeric {
    fn to_sql(&self, _: &Type, out: &mut BytesMut) -> SqlResult<IsNull> {
        encode_numeric(&self.0, out)?;
        Ok(IsNull::No)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }

    to_sql_checked!();
}

/// Column value of any type, as sent by the server
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_: &Type, raw: &'a [u8]) -> SqlResult<Self> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Write decimal text in the binary `numeric` layout
///
/// Layout: digit count, weight, sign, display scale, then base-10000 digits,
/// all big-endian 16-bit.
fn encode_numeric(text: &str, out: &mut BytesMut) -> SqlResult<()> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let well_formed = !(int_part.is_empty() && frac_part.is_empty())
        && int_part
            .bytes()
            .chain(frac_part.bytes())
            .all(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(format!("invalid numeric value: {:?}", text).into());
    }

    let int_part = int_part.trim_start_matches('0');
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let digits = "0".repeat(int_pad) + int_part + frac_part + &"0".repeat(frac_pad);

    let mut groups: Vec<i16> = digits
        .as_bytes()
        .chunks(4)
        .map(|chunk| chunk.iter().fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0')))
        .collect();
    let mut weight = ((int_pad + int_part.len()) / 4) as i16 - 1;
    while groups.first() == Some(&0) {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) {
        groups.pop();
    }
    if groups.is_empty() {
        weight = 0;
    }
    let sign: u16 = if negative && !groups.is_empty() { 0x4000 } else { 0 };

    out.extend_from_slice(&(groups.len() as i16).to_be_bytes());
    out.extend_from_slice(&weight.to_be_bytes());
    out.extend_from_slice(&sign.to_be_bytes());
    out.extend_from_slice(&(frac_part.len() as u16).to_be_bytes());
    for group in groups {
        out.extend_from_slice(&group.to_be_bytes());
    }
    Ok(())
}

/// Render a binary `numeric` value as decimal text
fn decode_numeric(raw: &[u8]) -> Option<String> {
    if raw.len() < 8 {
        return None;
    }
    let word = |i: usize| u16::from_be_bytes([raw[i], raw[i + 1]]);
    let ndigits = usize::from(word(0));
    let weight = i32::from(word(2) as i16);
    let sign = word(4);
    let dscale = usize::from(word(6));
    if raw.len() < 8 + ndigits * 2 {
        return None;
    }

    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digit = |index: i32| -> u16 {
        match usize::try_from(index) {
            Ok(i) if i < ndigits => word(8 + 2 * i),
            _ => 0,
        }
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        let _ = write!(out, "{}", digit(0));
        for index in 1..=weight {
            let _ = write!(out, "{:04}", digit(index));
        }
    }
    if dscale > 0 {
        let mut fraction = String::new();
        let mut index = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(index));
            index += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Some(out)
}

fn format_uuid(raw: &[u8]) -> Option<String> {
    if raw.len() != 16 {
        return None;
    }
    let mut out = String::with_capacity(36);
    for (i, b) in raw.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{:02x}", b);
    }
    Some(out)
}

fn parse_uuid(text: &str) -> Option<Vec<u8>> {
    let hex: Vec<u8> = text.bytes().filter(|b| *b != b'-').collect();
    if hex.len() != 32 {
        return None;
    }
    hex.chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
        })
        .collect()
}

/// Render a binary `interval` as `<months> mons <days> days [-]HH:MM:SS[.ffffff]`
fn format_interval(raw: &[u8]) -> Option<String> {
    if raw.len() != 16 {
        return None;
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into().ok()?);
    let days = i32::from_be_bytes(raw[8..12].try_into().ok()?);
    let months = i32::from_be_bytes(raw[12..16].try_into().ok()?);

    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let (secs, fraction) = (abs / 1_000_000, abs % 1_000_000);
    let mut out = format!(
        "{} mons {} days {}{:02}:{:02}:{:02}",
        months,
        days,
        sign,
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    );
    if fraction > 0 {
        let _ = write!(out, ".{:06}", fraction);
    }
    Some(out)
}

/// PostgreSQL database implementation
pub struct PostgresDatabase {
    client: Arc<Mutex<Option<Client>>>,
    connected: AtomicBool,
    in_transaction: AtomicBool,
}

impl PostgresDatabase {
    /// Create a new PostgreSQL database instance
    pub fn new() -> Self {
        Self {
            client: Arc::new(Mutex::new(None)),
            connected: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
        }
    }

    /// Convert a tokio_postgres Row into column values
    ///
    /// Types without a native mapping are decoded from their wire bytes:
    /// `numeric`, `uuid` and `interval` become text, anything else is kept as
    /// text when it is valid UTF-8 and as bytes otherwise.
    fn row_values(row: &Row) -> Result<Vec<DatabaseValue>> {
        let mut values = Vec::with_capacity(row.len());

        for (idx, column) in row.columns().iter().enumerate() {
            let value = match column.type_().name() {
                "bool" => row.try_get::<_, Option<bool>>(idx)?.map(DatabaseValue::Bool),
                "int2" => row
                    .try_get::<_, Option<i16>>(idx)?
                    .map(|v| DatabaseValue::Int(i32::from(v))),
                "int4" => row.try_get::<_, Option<i32>>(idx)?.map(DatabaseValue::Int),
                "int8" => row.try_get::<_, Option<i64>>(idx)?.map(DatabaseValue::Long),
                "oid" => row
                    .try_get::<_, Option<u32>>(idx)?
                    .map(|v| DatabaseValue::Long(i64::from(v))),
                "float4" => row.try_get::<_, Option<f32>>(idx)?.map(DatabaseValue::Float),
                "float8" => row.try_get::<_, Option<f64>>(idx)?.map(DatabaseValue::Double),
                "text" | "varchar" | "bpchar" | "name" => {
                    row.try_get::<_, Option<String>>(idx)?.map(DatabaseValue::String)
                }
                "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(DatabaseValue::Bytes),
                "timestamp" => row
                    .try_get::<_, Option<NaiveDateTime>>(idx)?
                    .map(|v| DatabaseValue::Timestamp(v.and_utc().timestamp_micros())),
                "timestamptz" => row
                    .try_get::<_, Option<DateTime<Utc>>>(idx)?
                    .map(DatabaseValue::from),
                "date" => row
                    .try_get::<_, Option<NaiveDate>>(idx)?
                    .map(|v| DatabaseValue::String(v.format("%Y-%m-%d").to_string())),
                "time" => row
                    .try_get::<_, Option<NaiveTime>>(idx)?
                    .map(|v| DatabaseValue::String(v.format("%H:%M:%S%.f").to_string())),
                "json" | "jsonb" => row
                    .try_get::<_, Option<serde_json::Value>>(idx)?
                    .map(DatabaseValue::Json),
                other => match row.try_get::<_, Option<RawValue>>(idx)? {
                    Some(RawValue(raw)) => Some(Self::decode_raw(other, raw).ok_or_else(|| {
                        DatabaseError::query(format!(
                            "malformed {} value in column {}",
                            other,
                            column.name()
                        ))
                    })?),
                    None => None,
                },
            };
            values.push(value.unwrap_or(DatabaseValue::Null));
        }

        Ok(values)
    }

    fn decode_raw(type_name: &str, raw: Vec<u8>) -> Option<DatabaseValue> {
        let text = match type_name {
            "numeric" => decode_numeric(&raw),
            "uuid" => format_uuid(&raw),
            "interval" => format_interval(&raw),
            _ => {
                return Some(match String::from_utf8(raw) {
                    Ok(text) => DatabaseValue::String(text),
                    Err(e) => DatabaseValue::Bytes(e.into_bytes()),
                })
            }
        };
        text.map(DatabaseValue::String)
    }

    fn datetime_of(value: &DatabaseValue) -> Option<DateTime<Utc>> {
        value
            .as_datetime()
            .or_else(|| value.as_str().and_then(|s| parse_timestamp(s).ok()))
    }

    fn numeric_text(value: &DatabaseValue) -> Option<String> {
        match value {
            DatabaseValue::Int(_) | DatabaseValue::Long(_) | DatabaseValue::String(_) => {
                value.to_raw_bytes().and_then(|b| String::from_utf8(b).ok())
            }
            DatabaseValue::Float(_) | DatabaseValue::Double(_) => value
                .as_double()
                .filter(|v| v.is_finite())
                .map(|v| v.to_string()),
            _ => None,
        }
    }

    /// Convert a DatabaseValue to a parameter of the type the server expects
    fn bind_param(value: &DatabaseValue, ty: &Type) -> Result<Param> {
        if value.is_null() {
            return Ok(Box::new(SqlNull));
        }

        let mismatch = || {
            DatabaseError::query(format!(
                "cannot bind a {} parameter to type {}",
                value.type_name(),
                ty.name()
            ))
        };

        let param: Param = match ty.name() {
            "bool" => Box::new(value.as_bool().ok_or_else(mismatch)?),
            "int2" => Box::new(
                value
                    .as_long()
                    .and_then(|v| i16::try_from(v).ok())
                    .ok_or_else(mismatch)?,
            ),
            "int4" => Box::new(
                value
                    .as_long()
                    .and_then(|v| i32::try_from(v).ok())
                    .ok_or_else(mismatch)?,
            ),
            "int8" => Box::new(value.as_long().ok_or_else(mismatch)?),
            "oid" => Box::new(
                value
                    .as_long()
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(mismatch)?,
            ),
            "float4" => Box::new(value.as_double().ok_or_else(mismatch)? as f32),
            "float8" => Box::new(value.as_double().ok_or_else(mismatch)?),
            "numeric" => Box::new(Numeric(Self::numeric_text(value).ok_or_else(mismatch)?)),
            "timestamp" => Box::new(Self::datetime_of(value).ok_or_else(mismatch)?.naive_utc()),
            "timestamptz" => Box::new(Self::datetime_of(value).ok_or_else(mismatch)?),
            "date" => Box::new(
                value
                    .as_str()
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                    .or_else(|| Self::datetime_of(value).map(|dt| dt.date_naive()))
                    .ok_or_else(mismatch)?,
            ),
            "json" | "jsonb" => match value {
                DatabaseValue::Json(v) => Box::new(v.clone()),
                DatabaseValue::String(s) => Box::new(
                    serde_json::from_str::<serde_json::Value>(s).map_err(|_| mismatch())?,
                ),
                _ => return Err(mismatch()),
            },
            "bytea" => match value {
                DatabaseValue::Bytes(b) => Box::new(b.clone()),
                _ => return Err(mismatch()),
            },
            "uuid" => Box::new(RawParam(
                value.as_str().and_then(parse_uuid).ok_or_else(mismatch)?,
            )),
            _ => Box::new(RawParam(value.to_raw_bytes().ok_or_else(mismatch)?)),
        };

        Ok(param)
    }

    fn bind_params(types: &[Type], params: &[DatabaseValue]) -> Result<Vec<Param>> {
        if types.len() != params.len() {
            return Err(DatabaseError::query(format!(
                "statement expects {} parameters, got {}",
                types.len(),
                params.len()
            )));
        }

        params
            .iter()
            .zip(types)
            .map(|(value, ty)| Self::bind_param(value, ty))
            .collect()
    }

    /// Run a transaction control statement, checking and updating the flag
    async fn transaction_control(&self, statement: &'static str, opening: bool) -> Result<()> {
        // The client lock serializes every flag update
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let active = self.in_transaction.load(Ordering::Acquire);
        if opening && active {
            return Err(DatabaseError::TransactionAlreadyStarted);
        }
        if !opening && !active {
            return Err(DatabaseError::transaction("Not in a transaction"));
        }

        let outcome = client
            .batch_execute(statement)
            .await
            .map_err(|e| DatabaseError::query(e.to_string()));
        // A failed COMMIT or ROLLBACK still ends the transaction on the server
        self.in_transaction
            .store(opening && outcome.is_ok(), Ordering::Release);

        outcome
    }
}

impl Default for PostgresDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn connect(&self, connection_string: &str) -> Result<()> {
        {
            let mut client = self.client.lock().await;
            *client = None;
            self.connected.store(false, Ordering::Release);
            self.in_transaction.store(false, Ordering::Release);
        }

        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| DatabaseError::connection(e.to_string()))?;

        // The connection object drives the socket; it resolves when the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection error");
            }
        });

        let mut client_guard = self.client.lock().await;
        *client_guard = Some(client);
        self.connected.store(true, Ordering::Release);
        tracing::debug!("connected to postgres");

        Ok(())
    }

    /// Whether `connect` succeeded and `disconnect` has not been called since
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn disconnect(&self) -> Result<()> {
        let mut client = self.client.lock().await;
        *client = None;
        self.connected.store(false, Ordering::Release);
        self.in_transaction.store(false, Ordering::Release);
        Ok(())
    }

    async fn execute_with_params(&self, statement: &str, params: &[DatabaseValue]) -> Result<u64> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let stmt = client
            .prepare(statement)
            .await
            .map_err(|e| DatabaseError::prepare(e.to_string()))?;
        let postgres_params = Self::bind_params(stmt.params(), params)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = postgres_params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        client
            .execute(&stmt, &param_refs)
            .await
            .map_err(|e| DatabaseError::query(e.to_string()))
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        client
            .batch_execute(sql)
            .await
            .map_err(|e| DatabaseError::query(e.to_string()))
    }

    async fn query_with_params(
        &self,
        statement: &str,
        params: &[DatabaseValue],
    ) -> Result<Box<dyn RowCursor>> {
        let client = self.client.lock().await;
        let client = client
            .as_ref()
            .ok_or_else(|| DatabaseError::connection("Not connected to database"))?;

        let stmt = client
            .prepare(statement)
            .await
            .map_err(|e| DatabaseError::prepare(e.to_string()))?;
        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let postgres_params = Self::bind_params(stmt.params(), params)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> = postgres_params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(&stmt, &param_refs)
            .await
            .map_err(|e| DatabaseError::query(e.to_string()))?;

        let mut cursor = BufferedCursor::new(columns);
        for row in &rows {
            match Self::row_values(row) {
                Ok(values) => cursor.push_row(values),
                Err(e) => {
                    cursor.push_error(e);
                    break;
                }
            }
        }

        Ok(Box::new(cursor))
    }

    async fn begin_transaction(&self) -> Result<()> {
        self.transaction_control("BEGIN", true).await
    }

    async fn commit(&self) -> Result<()> {
        self.transaction_control("COMMIT", false).await
    }

    async fn rollback(&self) -> Result<()> {
        self.transaction_control("ROLLBACK", false).await
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }
}

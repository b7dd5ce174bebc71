//! Encoding and decoding helpers between JSON field values and the SQLite
//! column representations.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC strings (microsecond
//! precision, `Z` suffix) so lexical comparison in SQL matches chronological
//! order. Structured columns are stored as compact JSON text. Booleans are
//! stored as 0/1.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use hindsight_core::table::{Column, ColumnKind};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::{Number, Value};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

/// Accept the looser timestamp shapes found in hand-written or legacy files:
/// RFC 3339, naive ISO date-times (taken as UTC), and bare dates.
pub fn decode_dt_lenient(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = decode_dt(s) {
    return Ok(dt);
  }
  for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
      return Ok(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
    .ok_or_else(|| Error::DateParse(format!("unrecognised timestamp: {s:?}")))
}

// ─── Field values ────────────────────────────────────────────────────────────

fn invalid(column: Column, reason: impl Into<String>) -> Error {
  Error::InvalidValue { column: column.name.to_owned(), reason: reason.into() }
}

/// Convert a JSON field value into the bound parameter for `column`.
pub fn to_sql(column: Column, value: &Value) -> Result<SqlValue> {
  if value.is_null() {
    return Ok(SqlValue::Null);
  }

  Ok(match column.kind {
    ColumnKind::Integer => match value {
      Value::Number(n) => n
        .as_i64()
        .map(SqlValue::Integer)
        .ok_or_else(|| invalid(column, format!("{n} is not an integer")))?,
      Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
      Value::String(s) => s
        .trim()
        .parse()
        .map(SqlValue::Integer)
        .map_err(|_| invalid(column, format!("{s:?} is not an integer")))?,
      other => return Err(invalid(column, format!("expected integer, got {other}"))),
    },
    ColumnKind::Real => value
      .as_f64()
      .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
      .map(SqlValue::Real)
      .ok_or_else(|| invalid(column, format!("expected number, got {value}")))?,
    ColumnKind::Bool => match value {
      Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
      Value::Number(n) => SqlValue::Integer(i64::from(n.as_f64().is_some_and(|f| f != 0.0))),
      other => return Err(invalid(column, format!("expected boolean, got {other}"))),
    },
    ColumnKind::Text => match value {
      Value::String(s) => SqlValue::Text(s.clone()),
      other => SqlValue::Text(other.to_string()),
    },
    ColumnKind::Json => SqlValue::Text(serde_json::to_string(value)?),
    ColumnKind::Timestamp => match value {
      Value::String(s) => SqlValue::Text(encode_dt(decode_dt_lenient(s)?)),
      other => return Err(invalid(column, format!("expected timestamp, got {other}"))),
    },
  })
}

/// Convert a stored column value back into JSON.
pub fn from_sql(kind: ColumnKind, value: ValueRef<'_>) -> Value {
  match (kind, value) {
    (_, ValueRef::Null) => Value::Null,
    (ColumnKind::Bool, ValueRef::Integer(i)) => Value::Bool(i != 0),
    (ColumnKind::Real, ValueRef::Integer(i)) => real(i as f64),
    (ColumnKind::Json, ValueRef::Text(t)) => {
      let text = String::from_utf8_lossy(t);
      serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
    }
    (_, ValueRef::Integer(i)) => Value::from(i),
    (_, ValueRef::Real(f)) => real(f),
    (_, ValueRef::Text(t)) => Value::String(String::from_utf8_lossy(t).into_owned()),
    (_, ValueRef::Blob(b)) => Value::String(String::from_utf8_lossy(b).into_owned()),
  }
}

fn real(f: f64) -> Value { Number::from_f64(f).map_or(Value::Null, Value::Number) }

#[cfg(test)]
mod tests {
  use hindsight_core::Table;
  use serde_json::json;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width() {
    let a = decode_dt_lenient("2025-01-02T03:04:05Z").unwrap();
    let b = decode_dt_lenient("2025-01-02 03:04:05.5").unwrap();
    assert_eq!(encode_dt(a), "2025-01-02T03:04:05.000000Z");
    assert!(encode_dt(a) < encode_dt(b));
  }

  #[test]
  fn json_and_bool_columns_round_trip() {
    let args = Table::Actions.column("arguments").unwrap();
    let stored = to_sql(args, &json!({ "app": "chrome" })).unwrap();
    let SqlValue::Text(text) = stored else { panic!("expected text") };
    assert_eq!(
      from_sql(ColumnKind::Json, ValueRef::Text(text.as_bytes())),
      json!({ "app": "chrome" })
    );

    let success = Table::Actions.column("success").unwrap();
    assert_eq!(to_sql(success, &json!(true)).unwrap(), SqlValue::Integer(1));
    assert_eq!(from_sql(ColumnKind::Bool, ValueRef::Integer(0)), json!(false));
  }

  #[test]
  fn bad_integer_is_rejected() {
    let count = Table::Topics.column("mention_count").unwrap();
    assert!(matches!(to_sql(count, &json!("many")), Err(Error::InvalidValue { .. })));
  }
}

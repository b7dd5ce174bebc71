//! Generic rows, predicates and query parameters.
//!
//! Values travel as [`serde_json::Value`]; the storage backend maps them onto
//! bound parameters according to each column's [`ColumnKind`](crate::table::ColumnKind).

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Result, table::Table};

/// Column name → value map for one row.
pub type Fields = serde_json::Map<String, Value>;

/// Build a [`Fields`] map from a JSON object literal. Non-object values yield
/// an empty map.
pub fn fields(value: Value) -> Fields {
  match value {
    Value::Object(map) => map,
    _ => Fields::new(),
  }
}

/// Serialize any struct into a [`Fields`] map, dropping `null` entries so
/// column defaults apply.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields> {
  let mut map = fields(serde_json::to_value(value)?);
  map.retain(|_, v| !v.is_null());
  Ok(map)
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// A row read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
  pub id:     i64,
  pub fields: Fields,
}

impl Record {
  pub fn get(&self, column: &str) -> Option<&Value> { self.fields.get(column) }

  pub fn get_str(&self, column: &str) -> Option<&str> {
    self.fields.get(column).and_then(Value::as_str)
  }

  /// Deserialize the row (including its `id`) into a domain type.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
    let mut map = self.fields.clone();
    map.insert("id".into(), Value::from(self.id));
    Ok(serde_json::from_value(Value::Object(map))?)
  }

  /// The row as a single JSON object with `id` first.
  pub fn to_json(&self) -> Value {
    let mut map = Fields::new();
    map.insert("id".into(), Value::from(self.id));
    map.extend(self.fields.clone());
    Value::Object(map)
  }
}

// ─── Filter ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  Like,
  IsNull,
  NotNull,
}

impl Op {
  pub fn sql(self) -> &'static str {
    match self {
      Self::Eq => "=",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::Like => "LIKE",
      Self::IsNull => "IS NULL",
      Self::NotNull => "IS NOT NULL",
    }
  }

  /// Whether the operator takes a bound value.
  pub fn is_binary(self) -> bool { !matches!(self, Self::IsNull | Self::NotNull) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
  pub column: String,
  pub op:     Op,
  pub value:  Value,
}

/// A conjunction of column comparisons. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
  pub conditions: Vec<Condition>,
}

impl Filter {
  pub fn new() -> Self { Self::default() }

  pub fn by_id(id: i64) -> Self { Self::new().eq("id", id) }

  fn push(mut self, column: &str, op: Op, value: Value) -> Self {
    self.conditions.push(Condition { column: column.to_owned(), op, value });
    self
  }

  pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, Op::Eq, value.into())
  }

  pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, Op::Ne, value.into())
  }

  pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, Op::Lt, value.into())
  }

  pub fn le(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, Op::Le, value.into())
  }

  pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, Op::Gt, value.into())
  }

  pub fn ge(self, column: &str, value: impl Into<Value>) -> Self {
    self.push(column, Op::Ge, value.into())
  }

  pub fn like(self, column: &str, pattern: impl Into<String>) -> Self {
    self.push(column, Op::Like, Value::String(pattern.into()))
  }

  pub fn is_null(self, column: &str) -> Self { self.push(column, Op::IsNull, Value::Null) }

  pub fn not_null(self, column: &str) -> Self { self.push(column, Op::NotNull, Value::Null) }

  pub fn is_empty(&self) -> bool { self.conditions.is_empty() }

  pub fn validate(&self, table: Table) -> Result<()> {
    for c in &self.conditions {
      table.column(&c.column)?;
    }
    Ok(())
  }
}

// ─── Query ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub column:     String,
  pub descending: bool,
}

impl Order {
  pub fn asc(column: &str) -> Self { Self { column: column.to_owned(), descending: false } }

  pub fn desc(column: &str) -> Self { Self { column: column.to_owned(), descending: true } }
}

/// Parameters for [`MemoryStore::select`](crate::store::MemoryStore::select).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
  pub filter: Filter,
  /// Defaults to ascending `id`.
  pub order:  Option<Order>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

impl Query {
  pub fn new(filter: Filter) -> Self { Self { filter, ..Self::default() } }

  pub fn all() -> Self { Self::default() }

  pub fn order_by(mut self, order: Order) -> Self {
    self.order = Some(order);
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn offset(mut self, offset: usize) -> Self {
    self.offset = Some(offset);
    self
  }

  pub fn validate(&self, table: Table) -> Result<()> {
    self.filter.validate(table)?;
    if let Some(order) = &self.order {
      table.column(&order.column)?;
    }
    Ok(())
  }
}

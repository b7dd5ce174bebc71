//! Error types for `hindsight-core`.

use thiserror::Error;

use crate::table::Table;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid table: {0:?}")]
  InvalidTable(String),

  #[error("table {table} has no column {column:?}")]
  InvalidColumn { table: Table, column: String },

  #[error("table {0} is append-only")]
  AppendOnly(Table),

  #[error("column {column:?} of table {table} is immutable")]
  ImmutableColumn { table: Table, column: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

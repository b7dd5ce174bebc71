//! Error type for `hindsight-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] hindsight_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A value could not be stored in the column it was addressed to.
  #[error("invalid value for column {column:?}: {reason}")]
  InvalidValue { column: String, reason: String },

  #[error("unrecognised export document: {0}")]
  UnknownFormat(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

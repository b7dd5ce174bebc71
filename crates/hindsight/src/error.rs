use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
  /// The durable store could not be opened; only the fallback cache is live.
  #[error("storage unavailable")]
  StorageUnavailable,

  #[error(transparent)]
  Store(#[from] hindsight_store_sqlite::Error),

  #[error(transparent)]
  Core(#[from] hindsight_core::Error),

  #[error("snapshot i/o error: {0}")]
  Snapshot(#[from] std::io::Error),

  #[error("snapshot encoding error: {0}")]
  Json(#[from] serde_json::Error),
}

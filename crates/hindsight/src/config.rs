//! Runtime configuration, deserialised from `hindsight.toml` and
//! `HINDSIGHT__*` environment variables.

use std::path::PathBuf;

use hindsight_core::memory::RetentionPolicy;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
  /// SQLite database file.
  pub store_path:               PathBuf,
  /// Human-readable JSON snapshot of the fallback cache.
  pub snapshot_path:            PathBuf,
  /// Write the snapshot after every this many writes. Zero disables it.
  pub snapshot_every:           u32,
  /// Rebuild an empty full-text index on a background task instead of
  /// before `open` returns.
  pub background_index_rebuild: bool,
  pub retention:                RetentionPolicy,
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self {
      store_path:               PathBuf::from("hindsight.db"),
      snapshot_path:            PathBuf::from("hindsight_snapshot.json"),
      snapshot_every:           5,
      background_index_rebuild: true,
      retention:                RetentionPolicy::default(),
    }
  }
}

impl MemoryConfig {
  /// Defaults with both files placed in `dir`.
  pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
    let dir = dir.into();
    Self {
      store_path: dir.join("hindsight.db"),
      snapshot_path: dir.join("hindsight_snapshot.json"),
      ..Self::default()
    }
  }
}

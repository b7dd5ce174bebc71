//! Full-text search query and hit types.

use serde::Serialize;

use crate::table::Table;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Parameters for [`MemoryStore::search`](crate::store::MemoryStore::search).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
  pub text:   String,
  /// Restrict hits to rows mirrored from one table.
  pub source: Option<Table>,
  pub limit:  usize,
}

impl SearchQuery {
  pub fn new(text: impl Into<String>) -> Self {
    Self { text: text.into(), source: None, limit: DEFAULT_SEARCH_LIMIT }
  }

  pub fn source(mut self, source: Table) -> Self {
    self.source = Some(source);
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = limit;
    self
  }
}

/// One ranked match. Higher `rank` is better; substring-scan hits rank `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
  pub content:   String,
  pub source:    Table,
  pub source_id: i64,
  pub rank:      f64,
}

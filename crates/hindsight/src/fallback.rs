//! In-memory fallback cache and its JSON snapshot.
//!
//! The cache mirrors recent writes so that reads keep working when the
//! durable store cannot be opened. Every `snapshot_every`-th write it is
//! dumped as JSON for humans; the snapshot is only read back to seed the
//! cache when the store is unavailable at startup.

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use hindsight_core::{
  Table,
  memory::Correction,
  search::SearchHit,
};
use hindsight_learn::LearnedArguments;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Recent actions, exchanges and facts kept in the cache.
pub const MAX_RECENT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFact {
  pub content:  String,
  pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAttribute {
  pub key:      String,
  pub value:    String,
  pub category: Option<String>,
}

/// The serialisable cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
  pub saved_at:    Option<DateTime<Utc>>,
  pub actions:     VecDeque<Value>,
  pub exchanges:   VecDeque<Value>,
  pub facts:       VecDeque<CachedFact>,
  pub corrections: Vec<Correction>,
  pub attributes:  Vec<CachedAttribute>,
}

#[derive(Debug, Default)]
struct Inner {
  snapshot: Snapshot,
  writes:   u64,
}

impl Inner {
  /// Count a write; returns whether a snapshot is due.
  fn note_write(&mut self, every: u32) -> bool {
    self.writes += 1;
    every > 0 && self.writes % u64::from(every) == 0
  }
}

fn push_recent<T>(queue: &mut VecDeque<T>, value: T) {
  queue.push_back(value);
  while queue.len() > MAX_RECENT {
    queue.pop_front();
  }
}

pub struct FallbackCache {
  path:  PathBuf,
  every: u32,
  inner: Mutex<Inner>,
}

impl FallbackCache {
  pub fn new(path: impl Into<PathBuf>, every: u32) -> Self {
    Self { path: path.into(), every, inner: Mutex::default() }
  }

  /// A cache seeded from the snapshot at `path`. A missing or unreadable
  /// snapshot yields an empty cache.
  pub async fn load(path: impl Into<PathBuf>, every: u32) -> Self {
    let cache = Self::new(path, every);
    match read_snapshot(&cache.path).await {
      Ok(Some(snapshot)) => {
        tracing::info!(
          path = %cache.path.display(),
          actions = snapshot.actions.len(),
          corrections = snapshot.corrections.len(),
          "seeded fallback cache from snapshot"
        );
        cache.inner.lock().snapshot = snapshot;
      }
      Ok(None) => {}
      Err(error) => {
        tracing::warn!(%error, path = %cache.path.display(), "ignoring unreadable snapshot");
      }
    }
    cache
  }

  pub fn path(&self) -> &Path { &self.path }

  pub fn contents(&self) -> Snapshot { self.inner.lock().snapshot.clone() }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Each recorder returns whether a snapshot is now due.
  pub fn record_action(&self, action: Value) -> bool {
    let mut inner = self.inner.lock();
    push_recent(&mut inner.snapshot.actions, action);
    inner.note_write(self.every)
  }

  pub fn record_exchange(&self, exchange: Value) -> bool {
    let mut inner = self.inner.lock();
    push_recent(&mut inner.snapshot.exchanges, exchange);
    inner.note_write(self.every)
  }

  pub fn record_fact(&self, content: &str, category: Option<&str>) -> bool {
    let mut inner = self.inner.lock();
    let fact = CachedFact { content: content.to_owned(), category: category.map(str::to_owned) };
    push_recent(&mut inner.snapshot.facts, fact);
    inner.note_write(self.every)
  }

  /// Replace the cached learned state with a fresh copy from the store.
  pub fn set_learned(
    &self,
    corrections: Vec<Correction>,
    attributes: Vec<CachedAttribute>,
  ) -> bool {
    let mut inner = self.inner.lock();
    inner.snapshot.corrections = corrections;
    inner.snapshot.attributes = attributes;
    inner.note_write(self.every)
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Learned argument state for `tool.action`, from the cache alone.
  pub fn learned_arguments(&self, tool: &str, action: &str) -> LearnedArguments {
    let inner = self.inner.lock();
    let mut corrections: Vec<Correction> = inner
      .snapshot
      .corrections
      .iter()
      .filter(|c| c.is_permanent && c.applies_to(tool, Some(action)))
      .cloned()
      .collect();
    corrections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut learned = LearnedArguments { corrections, ..LearnedArguments::default() };
    for attr in &inner.snapshot.attributes {
      if let Some(category) = &attr.category {
        learned.absorb_attribute(tool, &attr.key, &attr.value, category);
      }
    }
    learned
  }

  /// Case-insensitive substring search over cached exchanges and facts.
  pub fn search(&self, text: &str, limit: usize) -> Vec<SearchHit> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
      return vec![];
    }
    let inner = self.inner.lock();

    let exchanges = inner.snapshot.exchanges.iter().rev().map(|exchange| {
      let content = ["user_input", "ai_response"]
        .iter()
        .filter_map(|k| exchange.get(*k).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ");
      let source_id = exchange.get("id").and_then(Value::as_i64).unwrap_or_default();
      (content, Table::Exchanges, source_id)
    });
    let facts = inner
      .snapshot
      .facts
      .iter()
      .map(|fact| (fact.content.clone(), Table::Facts, 0));

    exchanges
      .chain(facts)
      .filter(|(content, ..)| content.to_lowercase().contains(&needle))
      .take(limit)
      .map(|(content, source, source_id)| SearchHit { content, source, source_id, rank: 0.0 })
      .collect()
  }

  // ─── Snapshot file ─────────────────────────────────────────────────────────

  /// Write the cache to the snapshot file.
  pub async fn write_snapshot(&self) -> Result<()> {
    let body = {
      let mut inner = self.inner.lock();
      inner.snapshot.saved_at = Some(Utc::now());
      serde_json::to_vec_pretty(&inner.snapshot)?
    };
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&self.path, body).await?;
    tracing::debug!(path = %self.path.display(), "wrote snapshot");
    Ok(())
  }
}

async fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
  match tokio::fs::read(path).await {
    Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
    Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
    Err(error) => Err(error.into()),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn snapshot_due_every_nth_write() {
    let cache = FallbackCache::new("unused.json", 3);
    let due: Vec<bool> = (0..6).map(|i| cache.record_action(json!({ "n": i }))).collect();
    assert_eq!(due, [false, false, true, false, false, true]);

    let never = FallbackCache::new("unused.json", 0);
    assert!(!(0..10).any(|_| never.record_fact("x", None)));
  }

  #[test]
  fn recent_queues_are_bounded() {
    let cache = FallbackCache::new("unused.json", 0);
    for i in 0..(MAX_RECENT + 10) {
      cache.record_exchange(json!({ "id": i, "user_input": "hi", "ai_response": "hello" }));
    }
    let contents = cache.contents();
    assert_eq!(contents.exchanges.len(), MAX_RECENT);
    assert_eq!(contents.exchanges[0]["id"], 10);

    for i in 0..(MAX_RECENT * 2) {
      cache.record_fact(&format!("fact {i}"), None);
    }
    let facts = cache.contents().facts;
    assert_eq!(facts.len(), MAX_RECENT);
    assert_eq!(facts[0].content, format!("fact {MAX_RECENT}"));
    assert_eq!(cache.search("fact 0", 10).len(), 0);
  }

  #[test]
  fn search_finds_substrings_newest_first() {
    let cache = FallbackCache::new("unused.json", 0);
    cache.record_exchange(json!({ "id": 1, "user_input": "play jazz", "ai_response": "ok" }));
    cache.record_exchange(json!({ "id": 2, "user_input": "more JAZZ", "ai_response": "sure" }));
    cache.record_fact("likes jazz on fridays", Some("preference"));

    let hits = cache.search("jazz", 10);
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].source_id, 2);
    assert_eq!(hits[2].source, Table::Facts);
    assert_eq!(cache.search("jazz", 1).len(), 1);
    assert!(cache.search("  ", 10).is_empty());
  }
}

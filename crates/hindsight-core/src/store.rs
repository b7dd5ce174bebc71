//! The `MemoryStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `hindsight-store-sqlite`). The learning and recovery engines depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  memory::{
    Correction, CorrectionWrite, DecayPolicy, ErrorPattern, NewCorrection, NewErrorPattern,
    NewFeedback, PruneReport, RetentionPolicy, ToolOutcome, ToolUsagePattern,
  },
  record::{Fields, Filter, Query, Record},
  search::{SearchHit, SearchQuery},
  table::Table,
};

/// Abstraction over a durable memory backend.
///
/// Implementations serialise every call through a single connection, so a
/// write is visible to the very next read issued by any caller.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait MemoryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Generic rows ──────────────────────────────────────────────────────

  /// Insert a row and return its id. `created_at` (and `updated_at` where the
  /// table has one) default to now.
  fn insert(
    &self,
    table: Table,
    fields: Fields,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Update every row matching `filter`; returns the number of rows changed.
  fn update(
    &self,
    table: Table,
    fields: Fields,
    filter: Filter,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn delete(
    &self,
    table: Table,
    filter: Filter,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn select(
    &self,
    table: Table,
    query: Query,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  fn count(
    &self,
    table: Table,
    filter: Filter,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Ranked full-text search over the indexable tables.
  fn search(
    &self,
    query: SearchQuery,
  ) -> impl Future<Output = Result<Vec<SearchHit>, Self::Error>> + Send + '_;

  // ── Upserts ───────────────────────────────────────────────────────────

  /// Record a mention of `name`, bumping its count if already known.
  fn upsert_topic(
    &self,
    name: String,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  fn upsert_location(
    &self,
    name: String,
    path: String,
    kind: Option<String>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  /// Set a user attribute, keyed by `key`.
  fn upsert_user_attribute(
    &self,
    key: String,
    value: String,
    category: Option<String>,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  // ── Feedback ──────────────────────────────────────────────────────────

  fn log_feedback(
    &self,
    feedback: NewFeedback,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + '_;

  fn mark_feedback_applied(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Corrections ───────────────────────────────────────────────────────

  /// Insert a correction, or reinforce the existing one in the same scope
  /// whose trigger is identical.
  fn add_or_reinforce_correction(
    &self,
    correction: NewCorrection,
  ) -> impl Future<Output = Result<CorrectionWrite, Self::Error>> + Send + '_;

  /// Raise `id`'s confidence by one step (capped at 1.0) and overwrite its
  /// behavior fields with those of `correction`.
  fn reinforce_correction(
    &self,
    id: i64,
    correction: NewCorrection,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn mark_correction_used(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Decay every idle correction once per staleness window. Returns the
  /// number of corrections touched.
  fn decay_stale_corrections(
    &self,
    policy: DecayPolicy,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Corrections eligible for matching: permanent (or belonging to
  /// `session`, when given) and above the policy's minimum confidence, in
  /// insertion order.
  fn relevant_corrections(
    &self,
    policy: DecayPolicy,
    session: Option<String>,
  ) -> impl Future<Output = Result<Vec<Correction>, Self::Error>> + Send + '_;

  fn purge_session_corrections(
    &self,
    session: String,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Error & tool patterns ─────────────────────────────────────────────

  /// Increment the pattern for the (tool, action, error kind) key, creating
  /// it on first occurrence.
  fn log_error_pattern(
    &self,
    error: NewErrorPattern,
  ) -> impl Future<Output = Result<ErrorPattern, Self::Error>> + Send + '_;

  /// Attach a solution to an existing key without counting an occurrence.
  fn record_error_solution(
    &self,
    tool: String,
    action: String,
    error_type: String,
    solution: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn known_solution(
    &self,
    tool: String,
    action: String,
    error_type: String,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  fn update_tool_usage_pattern(
    &self,
    outcome: ToolOutcome,
  ) -> impl Future<Output = Result<ToolUsagePattern, Self::Error>> + Send + '_;

  // ── Retention ─────────────────────────────────────────────────────────

  fn prune(
    &self,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<PruneReport, Self::Error>> + Send + '_;
}

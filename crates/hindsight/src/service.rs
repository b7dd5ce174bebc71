//! The [`Hindsight`] facade.
//!
//! Owns the store and the engines built on it. When the store cannot be
//! opened the facade stays usable in degraded mode: writes land in the
//! fallback cache only and reads are answered from it.

use std::{fmt, future::Future, path::Path, sync::Arc, time::Duration};

use chrono::Utc;
use hindsight_core::{
  Filter, Order, Query, Table,
  memory::{
    Correction, CorrectionWrite, ErrorPattern, NewAction, NewCorrection, NewExchange,
    NewFeedback, PruneReport, ToolOutcome, ToolUsagePattern,
  },
  record::{Fields, to_fields},
  search::{SearchHit, SearchQuery},
  store::MemoryStore,
};
use hindsight_learn::{
  Classification, CorrectionEngine, FeedbackClassifier, UtteranceKind, arguments,
};
use hindsight_recovery::{
  ErrorStats, RecoveryConfig, RecoveryEngine, RecoveryRequest, RecoveryResult,
};
use hindsight_store_sqlite::{ImportReport, SqliteStore, StoreStats};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  Error, Result,
  config::MemoryConfig,
  fallback::{CachedAttribute, FallbackCache},
};

// ─── Types ───────────────────────────────────────────────────────────────────

/// One tool invocation as the dispatcher made it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
  pub tool:   String,
  pub action: String,
  pub args:   Fields,
}

impl ToolCall {
  pub fn new(tool: impl Into<String>, action: impl Into<String>, args: Fields) -> Self {
    Self { tool: tool.into(), action: action.into(), args }
  }

  fn to_json(&self) -> Value {
    json!({ "tool": self.tool, "action": self.action, "args": self.args })
  }
}

/// What [`Hindsight::classify_and_maybe_learn`] did with an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackOutcome {
  pub classification: Classification,
  /// The logged feedback event, when the utterance was feedback and the
  /// store is available.
  pub feedback_id:    Option<i64>,
  pub learned:        Option<CorrectionWrite>,
}

impl FeedbackOutcome {
  fn unlogged(classification: Classification) -> Self {
    Self { classification, feedback_id: None, learned: None }
  }
}

/// Usage and failure history for one tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolInsights {
  pub usage:    Vec<ToolUsagePattern>,
  /// Most frequent first.
  pub errors:   Vec<ErrorPattern>,
  pub warnings: Vec<String>,
}

// ─── Facade ──────────────────────────────────────────────────────────────────

pub struct Hindsight {
  config:      MemoryConfig,
  session_id:  String,
  store:       Option<Arc<SqliteStore>>,
  corrections: Option<CorrectionEngine<SqliteStore>>,
  recovery:    RecoveryEngine<SqliteStore>,
  classifier:  FeedbackClassifier,
  cache:       FallbackCache,
  rebuild:     Option<JoinHandle<()>>,
}

impl Hindsight {
  /// Open the memory described by `config`. Never fails: an unopenable
  /// store puts the facade in degraded mode.
  pub async fn open(config: MemoryConfig) -> Self {
    Self::open_with(config, RecoveryConfig::default()).await
  }

  pub async fn open_with(config: MemoryConfig, recovery: RecoveryConfig) -> Self {
    let session_id = Uuid::new_v4().to_string();

    let store = match SqliteStore::open(&config.store_path).await {
      Ok(store) => Some(Arc::new(store)),
      Err(error) => {
        tracing::warn!(
          %error,
          path = %config.store_path.display(),
          "memory store unavailable, running on the fallback cache"
        );
        None
      }
    };

    let Some(store) = store else {
      let cache = FallbackCache::load(&config.snapshot_path, config.snapshot_every).await;
      return Self {
        session_id,
        store: None,
        corrections: None,
        recovery: RecoveryEngine::with_config(None, recovery),
        classifier: FeedbackClassifier::new(),
        cache,
        rebuild: None,
        config,
      };
    };

    let rebuild = if config.background_index_rebuild {
      let store = store.clone();
      Some(tokio::spawn(async move { rebuild_index(&store).await }))
    } else {
      rebuild_index(&store).await;
      None
    };

    let hindsight = Self {
      session_id,
      corrections: Some(CorrectionEngine::new(store.clone())),
      recovery: RecoveryEngine::with_config(Some(store.clone()), recovery),
      classifier: FeedbackClassifier::new(),
      cache: FallbackCache::new(&config.snapshot_path, config.snapshot_every),
      store: Some(store),
      rebuild,
      config,
    };
    hindsight.refresh_learned().await;
    tracing::info!(session = %hindsight.session_id, "memory opened");
    hindsight
  }

  pub fn is_degraded(&self) -> bool { self.store.is_none() }

  pub fn session_id(&self) -> &str { &self.session_id }

  pub fn config(&self) -> &MemoryConfig { &self.config }

  pub fn store(&self) -> Option<&Arc<SqliteStore>> { self.store.as_ref() }

  pub fn corrections(&self) -> Option<&CorrectionEngine<SqliteStore>> {
    self.corrections.as_ref()
  }

  pub fn recovery(&self) -> &RecoveryEngine<SqliteStore> { &self.recovery }

  pub fn classifier(&self) -> &FeedbackClassifier { &self.classifier }

  pub fn cache(&self) -> &FallbackCache { &self.cache }

  fn require_store(&self) -> Result<&Arc<SqliteStore>> {
    self.store.as_ref().ok_or(Error::StorageUnavailable)
  }

  /// Wait for the index rebuild, write a final snapshot (unless snapshots
  /// are disabled) and close the store.
  pub async fn close(mut self) -> Result<()> {
    if let Some(handle) = self.rebuild.take()
      && let Err(error) = handle.await
    {
      tracing::warn!(%error, "index rebuild task failed");
    }
    if self.config.snapshot_every > 0 {
      self.snapshot().await;
    }

    let Self { store, corrections, recovery, .. } = self;
    drop(corrections);
    drop(recovery);
    if let Some(store) = store {
      Arc::unwrap_or_clone(store).close().await?;
    }
    Ok(())
  }

  // ─── Tool calls ────────────────────────────────────────────────────────────

  /// Rewrite `args` with everything learned for `tool.action`.
  pub async fn apply_learned_arguments(&self, tool: &str, action: &str, args: Fields) -> Fields {
    let before = args.clone();
    let applied = match &self.corrections {
      Some(engine) => engine.apply_to_arguments(tool, action, args).await,
      None => self.cache.learned_arguments(tool, action).apply(args),
    };
    if applied != before {
      tracing::debug!(tool, action, "applied learned arguments");
    }
    applied
  }

  /// Log a finished call. A failed call is handed to the recovery engine,
  /// whose result is returned; a successful retry is logged as its own
  /// action.
  pub async fn record_outcome<F, Fut, E>(
    &self,
    call: &ToolCall,
    result: Result<Value, String>,
    duration: Duration,
    executor: F,
    cancel: &CancellationToken,
  ) -> Option<RecoveryResult>
  where
    F: Fn(String, Fields) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: fmt::Display,
  {
    self.log_action(call, &result, duration).await;

    let error = result.err()?;
    let request = RecoveryRequest::new(&call.tool, &call.action, call.args.clone(), error);
    let recovery = self.recovery.attempt_recovery(request, executor, cancel).await;
    if recovery.success {
      let retried = recovery.result.clone().ok_or_else(String::new);
      self.log_action(call, &retried, recovery.elapsed).await;
    }
    Some(recovery)
  }

  async fn log_action(&self, call: &ToolCall, result: &Result<Value, String>, duration: Duration) {
    let duration_ms = u64::try_from(duration.as_millis()).ok();
    let action = NewAction {
      tool_name: call.tool.clone(),
      action_name: call.action.clone(),
      arguments: Value::Object(call.args.clone()),
      result: result.as_ref().ok().cloned(),
      success: result.is_ok(),
      duration_ms,
      error: result.as_ref().err().cloned(),
      session_id: Some(self.session_id.clone()),
    };

    let mut id = None;
    if let Some(store) = &self.store {
      match insert_row(store, Table::Actions, &action).await {
        Ok(row) => id = Some(row),
        Err(error) => tracing::warn!(%error, tool = %call.tool, "could not log action"),
      }
      let outcome = ToolOutcome {
        tool_name: call.tool.clone(),
        action_name: call.action.clone(),
        success: action.success,
        duration_ms,
      };
      if let Err(error) = store.update_tool_usage_pattern(outcome).await {
        tracing::warn!(%error, tool = %call.tool, "could not update tool usage");
      }
    }

    let mut cached = json!(action);
    cached["id"] = json!(id);
    cached["created_at"] = json!(Utc::now());
    if self.cache.record_action(cached) {
      self.snapshot().await;
    }
  }

  // ─── Feedback ──────────────────────────────────────────────────────────────

  /// Classify an utterance and, when it is feedback, log it. A correction
  /// with a usable intent is learned, scoped to the tool of `last_action`.
  pub async fn classify_and_maybe_learn(
    &self,
    utterance: &str,
    last_action: Option<&ToolCall>,
  ) -> FeedbackOutcome {
    let classification = self.classifier.classify(utterance);
    let Some(kind) = classification.feedback_kind() else {
      return FeedbackOutcome::unlogged(classification);
    };
    let Some(store) = &self.store else {
      tracing::warn!(%kind, "memory store unavailable, feedback not logged");
      return FeedbackOutcome::unlogged(classification);
    };

    let mut correction = None;
    let mut corrected_action = None;
    if classification.kind == UtteranceKind::Correction
      && let Some(intent) = &classification.intent
    {
      let mut new = NewCorrection::new(utterance, intent.clone());
      if let Some(call) = last_action {
        new = new.tool(&call.tool, Some(call.action.clone()));
        if let Some((argument, wrong)) = arguments::corrected_argument(&call.args, intent) {
          let mut corrected = call.clone();
          corrected.args.insert(argument.clone(), Value::String(intent.clone()));
          corrected_action = Some(corrected.to_json());
          new = new.wrong(wrong).argument(argument);
        }
      }
      correction = Some(new);
    }

    let feedback = NewFeedback {
      kind,
      feedback_type: classification.feedback_type.map(|t| t.to_string()),
      message: utterance.to_owned(),
      prior_action: last_action.map(ToolCall::to_json),
      corrected_action,
    };
    let feedback_id = match store.log_feedback(feedback).await {
      Ok(id) => Some(id),
      Err(error) => {
        tracing::warn!(%error, "could not log feedback");
        None
      }
    };

    let mut learned = None;
    if let (Some(correction), Some(engine)) = (correction, &self.corrections) {
      match engine.learn_correction(correction).await {
        Ok(write) => {
          learned = Some(write);
          if let Some(id) = feedback_id
            && let Err(error) = store.mark_feedback_applied(id).await
          {
            tracing::warn!(%error, id, "could not mark feedback applied");
          }
          self.refresh_learned().await;
        }
        Err(error) => tracing::warn!(%error, "could not learn correction"),
      }
    }

    FeedbackOutcome { classification, feedback_id, learned }
  }

  /// Copy the permanent corrections and learned attributes into the cache so
  /// they survive a later start in degraded mode.
  async fn refresh_learned(&self) {
    let (Some(store), Some(engine)) = (&self.store, &self.corrections) else { return };
    match load_learned(store, engine).await {
      Ok((corrections, attributes)) => {
        if self.cache.set_learned(corrections, attributes) {
          self.snapshot().await;
        }
      }
      Err(error) => tracing::warn!(%error, "could not refresh cached learned state"),
    }
  }

  /// Discard the current session's corrections.
  pub async fn end_session(&self) -> usize {
    let Some(engine) = &self.corrections else { return 0 };
    match engine.end_session(&self.session_id).await {
      Ok(purged) => purged,
      Err(error) => {
        tracing::warn!(%error, "could not end session");
        0
      }
    }
  }

  // ─── Conversation memory ───────────────────────────────────────────────────

  /// Log one exchange and count its topics. Returns the row id when stored.
  pub async fn log_exchange(&self, mut exchange: NewExchange) -> Option<i64> {
    exchange.session_id.get_or_insert_with(|| self.session_id.clone());

    let mut id = None;
    if let Some(store) = &self.store {
      for topic in &exchange.topics {
        if let Err(error) = store.upsert_topic(topic.clone()).await {
          tracing::warn!(%error, topic, "could not count topic");
        }
      }
      match insert_row(store, Table::Exchanges, &exchange).await {
        Ok(row) => id = Some(row),
        Err(error) => tracing::warn!(%error, "could not log exchange"),
      }
    }

    let mut cached = json!(exchange);
    cached["id"] = json!(id);
    cached["created_at"] = json!(Utc::now());
    if self.cache.record_exchange(cached) {
      self.snapshot().await;
    }
    id
  }

  pub async fn remember_fact(&self, content: &str, category: Option<&str>) -> Option<i64> {
    let mut id = None;
    if let Some(store) = &self.store {
      let fact = json!({ "content": content, "category": category, "source": "conversation" });
      match insert_row(store, Table::Facts, &fact).await {
        Ok(row) => id = Some(row),
        Err(error) => tracing::warn!(%error, "could not store fact"),
      }
    }
    if self.cache.record_fact(content, category) {
      self.snapshot().await;
    }
    id
  }

  /// Ranked search, answered from the cache when the store is unavailable
  /// or the query fails.
  pub async fn search_memory(&self, query: SearchQuery) -> Vec<SearchHit> {
    if let Some(store) = &self.store {
      match store.search(query.clone()).await {
        Ok(hits) => return hits,
        Err(error) => tracing::warn!(%error, "search failed, using the fallback cache"),
      }
    }
    self
      .cache
      .search(&query.text, usize::MAX)
      .into_iter()
      .filter(|hit| query.source.is_none_or(|source| hit.source == source))
      .take(query.limit)
      .collect()
  }

  // ─── Insights ──────────────────────────────────────────────────────────────

  /// Usage and failure history for `tool`, or only its `action`.
  pub async fn tool_insights(&self, tool: &str, action: Option<&str>) -> Result<ToolInsights> {
    let store = self.require_store()?;
    let by_tool = || match action {
      Some(action) => Filter::new().eq("tool_name", tool).eq("action_name", action),
      None => Filter::new().eq("tool_name", tool),
    };

    let usage = store
      .select(Table::ToolPatterns, Query::new(by_tool()).order_by(Order::asc("action_name")))
      .await?
      .iter()
      .map(|record| record.decode::<ToolUsagePattern>())
      .collect::<Result<Vec<_>, _>>()?;
    let errors = store
      .select(Table::ErrorPatterns, Query::new(by_tool()).order_by(Order::desc("occurrence_count")))
      .await?
      .iter()
      .map(|record| record.decode::<ErrorPattern>())
      .collect::<Result<Vec<_>, _>>()?;
    let warnings = usage.iter().filter_map(ToolUsagePattern::reliability_warning).collect();

    Ok(ToolInsights { usage, errors, warnings })
  }

  pub fn error_stats(&self) -> ErrorStats { self.recovery.error_stats() }

  pub async fn stats(&self) -> Result<StoreStats> { Ok(self.require_store()?.stats().await?) }

  /// Permanent corrections scoped to `tool` (and `action`). In degraded mode
  /// the cached copy is used.
  pub async fn corrections_for(&self, tool: &str, action: Option<&str>) -> Vec<Correction> {
    if let Some(engine) = &self.corrections {
      match engine.corrections_for(tool, action).await {
        Ok(corrections) => return corrections,
        Err(error) => tracing::warn!(%error, tool, "could not load corrections"),
      }
    }
    let mut cached: Vec<Correction> = self
      .cache
      .contents()
      .corrections
      .into_iter()
      .filter(|c| c.applies_to(tool, action))
      .collect();
    cached.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    cached
  }

  // ─── Maintenance ───────────────────────────────────────────────────────────

  /// Apply the configured retention windows.
  pub async fn prune(&self) -> Result<PruneReport> {
    let report = self.require_store()?.prune(self.config.retention, Utc::now()).await?;
    tracing::info!(removed = report.total(), "pruned memory");
    Ok(report)
  }

  pub async fn reindex(&self) -> Result<usize> {
    Ok(self.require_store()?.rebuild_index().await?)
  }

  pub async fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
    Ok(self.require_store()?.export_json(path).await?)
  }

  /// Import an export document or a legacy memory file. Idempotent.
  pub async fn import_legacy_json(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
    let report = self.require_store()?.import_json(path).await?;
    self.refresh_learned().await;
    Ok(report)
  }

  async fn snapshot(&self) {
    if let Err(error) = self.cache.write_snapshot().await {
      tracing::warn!(%error, path = %self.cache.path().display(), "could not write snapshot");
    }
  }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

async fn rebuild_index(store: &SqliteStore) {
  match store.rebuild_index_if_empty().await {
    Ok(Some(rows)) => tracing::info!(rows, "rebuilt search index"),
    Ok(None) => {}
    Err(error) => tracing::warn!(%error, "could not rebuild search index"),
  }
}

async fn insert_row<T: Serialize>(store: &SqliteStore, table: Table, row: &T) -> Result<i64> {
  Ok(store.insert(table, to_fields(row)?).await?)
}

async fn load_learned(
  store: &SqliteStore,
  engine: &CorrectionEngine<SqliteStore>,
) -> Result<(Vec<Correction>, Vec<CachedAttribute>)> {
  let corrections = store.relevant_corrections(engine.policy(), None).await?;
  let attributes = store
    .select(Table::UserInfo, Query::new(Filter::new().not_null("category")))
    .await?
    .iter()
    .filter_map(|record| {
      Some(CachedAttribute {
        key:      record.get_str("key")?.to_owned(),
        value:    record.get_str("value")?.to_owned(),
        category: record.get_str("category").map(str::to_owned),
      })
    })
    .collect();
  Ok((corrections, attributes))
}

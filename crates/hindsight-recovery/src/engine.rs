//! The recovery engine.

use std::{
  collections::BTreeMap,
  fmt,
  future::Future,
  sync::Arc,
  time::{Duration, Instant},
};

use hindsight_core::{
  memory::NewErrorPattern,
  record::Fields,
  store::MemoryStore,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display};
use tokio_util::sync::CancellationToken;

use crate::{
  category::{ErrorCategorizer, ErrorCategory},
  cooldown::CooldownTracker,
  guidance,
  policy::{RecoveryConfig, RetryPolicy},
};

/// What the engine did with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryAction {
  SkippedCooldown,
  RetrySucceeded,
  RetriesExhausted,
  NeedsPermission,
  NeedsClarification,
  GaveUp,
  FoundAlternative,
  NoRecovery,
  Cancelled,
}

/// A failed tool invocation handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryRequest {
  pub tool:     String,
  pub action:   String,
  pub args:     Fields,
  pub error:    String,
  /// Skip categorization and use this category.
  pub category: Option<ErrorCategory>,
}

impl RecoveryRequest {
  pub fn new(
    tool: impl Into<String>,
    action: impl Into<String>,
    args: Fields,
    error: impl Into<String>,
  ) -> Self {
    Self {
      tool: tool.into(),
      action: action.into(),
      args,
      error: error.into(),
      category: None,
    }
  }

  pub fn category(mut self, category: ErrorCategory) -> Self {
    self.category = Some(category);
    self
  }

  /// The arguments passed to the executor: `action` first, then the
  /// original arguments, which win on conflict.
  fn executor_args(&self) -> Fields {
    let mut args = Fields::new();
    args.insert("action".into(), Value::String(self.action.clone()));
    args.extend(self.args.clone());
    args
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryResult {
  pub success:        bool,
  pub action_taken:   RecoveryAction,
  pub category:       Option<ErrorCategory>,
  /// The executor's output when a retry succeeded.
  pub result:         Option<Value>,
  /// The most recent error text.
  pub error:          Option<String>,
  pub retries_used:   u32,
  pub elapsed:        Duration,
  /// Guidance to relay to the user instead of the raw error.
  pub suggestion:     Option<String>,
  /// A previously recorded solution for the same (tool, action, category).
  pub known_solution: Option<String>,
}

impl RecoveryResult {
  fn failed(action_taken: RecoveryAction, error: impl Into<String>) -> Self {
    Self {
      success: false,
      action_taken,
      category: None,
      result: None,
      error: Some(error.into()),
      retries_used: 0,
      elapsed: Duration::ZERO,
      suggestion: None,
      known_solution: None,
    }
  }

  fn suggest(mut self, suggestion: impl Into<String>) -> Self {
    self.suggestion = Some(suggestion.into());
    self
  }
}

/// In-process summary of handled failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorStats {
  pub total:              usize,
  pub by_category:        BTreeMap<ErrorCategory, usize>,
  /// Failures for which at least one retry ran.
  pub recovery_attempted: usize,
  pub recovery_success:   usize,
}

impl ErrorStats {
  /// Share of attempted recoveries that succeeded, if any were attempted.
  pub fn recovery_rate(&self) -> Option<f64> {
    (self.recovery_attempted > 0)
      .then(|| self.recovery_success as f64 / self.recovery_attempted as f64)
  }
}

/// Categorizes failures and retries them through a caller-supplied executor.
///
/// The store is optional: without one, nothing is persisted and no known
/// solutions are offered, but categorization, retries and cooldowns work.
pub struct RecoveryEngine<S> {
  store:       Option<Arc<S>>,
  config:      RecoveryConfig,
  categorizer: ErrorCategorizer,
  cooldowns:   CooldownTracker,
  stats:       Mutex<ErrorStats>,
}

impl<S: MemoryStore> RecoveryEngine<S> {
  pub fn new(store: Option<Arc<S>>) -> Self { Self::with_config(store, RecoveryConfig::default()) }

  pub fn with_config(store: Option<Arc<S>>, config: RecoveryConfig) -> Self {
    Self {
      store,
      cooldowns: CooldownTracker::new(config.cooldown),
      config,
      categorizer: ErrorCategorizer::new(),
      stats: Mutex::default(),
    }
  }

  pub fn categorize(&self, message: &str) -> ErrorCategory {
    self.categorizer.categorize(message)
  }

  pub fn policy(&self, category: ErrorCategory) -> RetryPolicy { self.config.policy(category) }

  pub fn error_stats(&self) -> ErrorStats { self.stats.lock().clone() }

  /// Try to recover from a failed call.
  ///
  /// `executor` is invoked once per retry with the tool name and the
  /// arguments (including `action`). Cancelling `cancel` stops the loop at
  /// the next backoff. Storage problems are logged and never fail recovery.
  pub async fn attempt_recovery<F, Fut, E>(
    &self,
    request: RecoveryRequest,
    executor: F,
    cancel: &CancellationToken,
  ) -> RecoveryResult
  where
    F: Fn(String, Fields) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: fmt::Display,
  {
    let started = Instant::now();
    let (tool, action) = (request.tool.as_str(), request.action.as_str());

    if let Some(reason) = self.cooldowns.check(tool, action) {
      return RecoveryResult::failed(RecoveryAction::SkippedCooldown, &request.error)
        .suggest(reason);
    }

    let category = request.category.unwrap_or_else(|| self.categorize(&request.error));
    let policy = self.config.policy(category);
    tracing::info!(
      tool,
      action,
      %category,
      error = %guidance::truncate(&request.error, 100),
      "recovering from tool failure"
    );

    let known_solution = self.log_occurrence(&request, category).await;

    let mut outcome = match category {
      ErrorCategory::Permanent => RecoveryResult::failed(RecoveryAction::GaveUp, &request.error)
        .suggest(guidance::cannot_complete(tool, action, &request.error)),
      ErrorCategory::Permission => {
        RecoveryResult::failed(RecoveryAction::NeedsPermission, &request.error)
          .suggest(guidance::permission(tool, action))
      }
      ErrorCategory::InvalidInput => {
        RecoveryResult::failed(RecoveryAction::NeedsClarification, &request.error)
          .suggest(guidance::clarification(tool, action, &request.args, &request.error))
      }
      _ => match guidance::alternatives(action, &request.args)
        .filter(|_| category == ErrorCategory::NotFound)
      {
        Some(alternative) => {
          RecoveryResult::failed(RecoveryAction::FoundAlternative, &request.error)
            .suggest(alternative)
        }
        None if policy.max_retries > 0 => {
          self.retry(&request, policy, &executor, cancel).await
        }
        None => RecoveryResult::failed(RecoveryAction::NoRecovery, &request.error)
          .suggest(guidance::generic(category)),
      },
    };

    outcome.category = Some(category);
    outcome.known_solution = known_solution;
    outcome.elapsed = started.elapsed();

    if outcome.success {
      self.record_solution(&request, category, outcome.retries_used).await;
    } else if outcome.action_taken != RecoveryAction::Cancelled {
      self.cooldowns.record_failure(tool, action);
    }
    self.count(&outcome);
    outcome
  }

  async fn retry<F, Fut, E>(
    &self,
    request: &RecoveryRequest,
    policy: RetryPolicy,
    executor: &F,
    cancel: &CancellationToken,
  ) -> RecoveryResult
  where
    F: Fn(String, Fields) -> Fut,
    Fut: Future<Output = Result<Value, E>>,
    E: fmt::Display,
  {
    let (tool, action) = (request.tool.as_str(), request.action.as_str());
    let args = request.executor_args();
    let mut last_error = request.error.clone();

    for attempt in 0..policy.max_retries {
      let delay = policy.delay(attempt);
      tracing::info!(
        tool,
        action,
        "retry {}/{} after {}ms",
        attempt + 1,
        policy.max_retries,
        delay.as_millis()
      );

      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          tracing::info!(tool, action, attempt, "recovery cancelled");
          let mut result = RecoveryResult::failed(RecoveryAction::Cancelled, last_error);
          result.retries_used = attempt;
          return result;
        }
        _ = tokio::time::sleep(delay) => {}
      }

      match executor(request.tool.clone(), args.clone()).await {
        Ok(value) => {
          tracing::info!(tool, action, attempt = attempt + 1, "retry succeeded");
          return RecoveryResult {
            success: true,
            action_taken: RecoveryAction::RetrySucceeded,
            result: Some(value),
            error: None,
            retries_used: attempt + 1,
            ..RecoveryResult::failed(RecoveryAction::RetrySucceeded, String::new())
          };
        }
        Err(error) => {
          last_error = error.to_string();
          tracing::warn!(tool, action, attempt = attempt + 1, error = %last_error, "retry failed");
        }
      }
    }

    let mut result = RecoveryResult::failed(RecoveryAction::RetriesExhausted, last_error)
      .suggest(guidance::retries_exhausted(policy.max_retries));
    result.retries_used = policy.max_retries;
    result
  }

  /// Count the occurrence and look up a known solution for its key.
  async fn log_occurrence(
    &self,
    request: &RecoveryRequest,
    category: ErrorCategory,
  ) -> Option<String> {
    let store = self.store.as_ref()?;
    let logged = store
      .log_error_pattern(NewErrorPattern {
        tool_name:     request.tool.clone(),
        action_name:   request.action.clone(),
        error_type:    category.to_string(),
        error_message: request.error.clone(),
      })
      .await;
    match logged {
      Ok(pattern) => pattern.solution,
      Err(error) => {
        tracing::warn!(%error, "could not log error pattern");
        None
      }
    }
  }

  async fn record_solution(
    &self,
    request: &RecoveryRequest,
    category: ErrorCategory,
    retries: u32,
  ) {
    let Some(store) = &self.store else { return };
    let solution = format!("retry succeeded after {retries} attempt(s)");
    let recorded = store
      .record_error_solution(
        request.tool.clone(),
        request.action.clone(),
        category.to_string(),
        solution,
      )
      .await;
    if let Err(error) = recorded {
      tracing::warn!(%error, "could not record error solution");
    }
  }

  fn count(&self, outcome: &RecoveryResult) {
    if outcome.action_taken == RecoveryAction::SkippedCooldown {
      return;
    }
    let mut stats = self.stats.lock();
    stats.total += 1;
    if let Some(category) = outcome.category {
      *stats.by_category.entry(category).or_default() += 1;
    }
    if outcome.retries_used > 0 {
      stats.recovery_attempted += 1;
      if outcome.success {
        stats.recovery_success += 1;
      }
    }
  }
}

//! Domain entities layered over the generic tables: corrections, feedback,
//! error and tool-usage patterns, conversation exchanges, and the policies
//! that age them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

// ─── Corrections ─────────────────────────────────────────────────────────────

/// Confidence assigned to a newly learned correction.
pub const INITIAL_CONFIDENCE: f64 = 1.0;

/// Confidence added each time a correction is relearned.
pub const REINFORCE_STEP: f64 = 0.1;

/// Whether a correction outlives the session that taught it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "session_id", rename_all = "snake_case")]
pub enum CorrectionScope {
  Permanent,
  Session(String),
}

impl CorrectionScope {
  pub fn is_permanent(&self) -> bool { matches!(self, Self::Permanent) }

  pub fn session_id(&self) -> Option<&str> {
    match self {
      Self::Permanent => None,
      Self::Session(id) => Some(id),
    }
  }
}

/// A learned "trigger → correct behavior" mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
  pub id:               i64,
  pub trigger_pattern:  String,
  pub wrong_behavior:   Option<String>,
  pub correct_behavior: String,
  pub tool_name:        Option<String>,
  pub action_name:      Option<String>,
  /// Argument of the scoped tool call that the correction rewrites.
  pub argument_name:    Option<String>,
  pub confidence:       f64,
  pub use_count:        i64,
  pub session_id:       Option<String>,
  pub is_permanent:     bool,
  pub last_used:        Option<DateTime<Utc>>,
  pub decayed_at:       Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       Option<DateTime<Utc>>,
}

impl Correction {
  pub fn scope(&self) -> CorrectionScope {
    match (&self.session_id, self.is_permanent) {
      (Some(session), false) => CorrectionScope::Session(session.clone()),
      _ => CorrectionScope::Permanent,
    }
  }

  /// Whether the correction is scoped to `tool` (and `action`, when given).
  pub fn applies_to(&self, tool: &str, action: Option<&str>) -> bool {
    let tool_ok = self.tool_name.as_deref() == Some(tool);
    let action_ok = match (action, self.action_name.as_deref()) {
      (Some(wanted), Some(have)) => wanted == have,
      _ => true,
    };
    tool_ok && action_ok
  }
}

/// Input to [`MemoryStore::add_or_reinforce_correction`](crate::store::MemoryStore::add_or_reinforce_correction).
#[derive(Debug, Clone, PartialEq)]
pub struct NewCorrection {
  pub trigger_pattern:  String,
  pub correct_behavior: String,
  pub wrong_behavior:   Option<String>,
  pub tool_name:        Option<String>,
  pub action_name:      Option<String>,
  pub argument_name:    Option<String>,
  pub scope:            CorrectionScope,
}

impl NewCorrection {
  pub fn new(trigger: impl Into<String>, correct: impl Into<String>) -> Self {
    Self {
      trigger_pattern:  trigger.into(),
      correct_behavior: correct.into(),
      wrong_behavior:   None,
      tool_name:        None,
      action_name:      None,
      argument_name:    None,
      scope:            CorrectionScope::Permanent,
    }
  }

  pub fn wrong(mut self, wrong: impl Into<String>) -> Self {
    self.wrong_behavior = Some(wrong.into());
    self
  }

  pub fn tool(mut self, tool: impl Into<String>, action: Option<String>) -> Self {
    self.tool_name = Some(tool.into());
    self.action_name = action;
    self
  }

  pub fn argument(mut self, name: impl Into<String>) -> Self {
    self.argument_name = Some(name.into());
    self
  }

  pub fn scope(mut self, scope: CorrectionScope) -> Self {
    self.scope = scope;
    self
  }
}

/// Outcome of a correction write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrectionWrite {
  pub id:         i64,
  /// `true` when an existing record was reinforced instead of inserted.
  pub reinforced: bool,
}

// ─── Feedback ────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeedbackKind {
  Correction,
  Positive,
  Negative,
  Preference,
}

/// A logged user reaction. Immutable apart from `applied`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEvent {
  pub id:               i64,
  pub kind:             FeedbackKind,
  pub feedback_type:    Option<String>,
  pub message:          String,
  pub prior_action:     Option<Value>,
  pub corrected_action: Option<Value>,
  pub applied:          bool,
  pub created_at:       DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFeedback {
  pub kind:             FeedbackKind,
  pub feedback_type:    Option<String>,
  pub message:          String,
  pub prior_action:     Option<Value>,
  pub corrected_action: Option<Value>,
}

// ─── Error patterns ──────────────────────────────────────────────────────────

/// Accumulated failures for one (tool, action, error kind) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
  pub id:               i64,
  pub tool_name:        String,
  pub action_name:      String,
  pub error_type:       String,
  pub error_message:    Option<String>,
  pub occurrence_count: i64,
  pub solution:         Option<String>,
  pub last_occurred:    DateTime<Utc>,
  pub created_at:       DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewErrorPattern {
  pub tool_name:     String,
  pub action_name:   String,
  pub error_type:    String,
  pub error_message: String,
}

// ─── Tool usage ──────────────────────────────────────────────────────────────

/// Minimum uses before a low success rate is reported as unreliable.
pub const RELIABILITY_MIN_USES: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsagePattern {
  pub id:              i64,
  pub tool_name:       String,
  pub action_name:     String,
  pub use_count:       i64,
  pub success_count:   i64,
  pub success_rate:    f64,
  pub avg_duration_ms: f64,
  pub last_used:       Option<DateTime<Utc>>,
}

impl ToolUsagePattern {
  /// A warning when the pair has been used enough to judge and fails more
  /// often than it succeeds.
  pub fn reliability_warning(&self) -> Option<String> {
    (self.use_count >= RELIABILITY_MIN_USES && self.success_rate < 0.5).then(|| {
      format!(
        "{}.{} has a low success rate ({:.0}% over {} uses)",
        self.tool_name,
        self.action_name,
        self.success_rate * 100.0,
        self.use_count
      )
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
  pub tool_name:   String,
  pub action_name: String,
  pub success:     bool,
  pub duration_ms: Option<u64>,
}

// ─── Actions & exchanges ─────────────────────────────────────────────────────

/// One row of the append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAction {
  pub tool_name:   String,
  pub action_name: String,
  pub arguments:   Value,
  pub result:      Option<Value>,
  pub success:     bool,
  pub duration_ms: Option<u64>,
  pub error:       Option<String>,
  pub session_id:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationExchange {
  pub id:          i64,
  pub session_id:  Option<String>,
  pub user_input:  String,
  pub ai_response: String,
  #[serde(default)]
  pub tools_used:  Vec<String>,
  pub mood:        Option<String>,
  #[serde(default)]
  pub topics:      Vec<String>,
  pub feedback_id: Option<i64>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewExchange {
  pub session_id:  Option<String>,
  pub user_input:  String,
  pub ai_response: String,
  pub tools_used:  Vec<String>,
  pub mood:        Option<String>,
  pub topics:      Vec<String>,
  pub feedback_id: Option<i64>,
}

// ─── Policies ────────────────────────────────────────────────────────────────

/// Lazy confidence decay applied on relevance queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayPolicy {
  /// Corrections idle for longer than this are decayed.
  pub stale_after:    Duration,
  pub factor:         f64,
  pub floor:          f64,
  /// Corrections at or below this confidence are neither decayed nor offered.
  pub min_confidence: f64,
}

impl Default for DecayPolicy {
  fn default() -> Self {
    Self {
      stale_after:    Duration::days(7),
      factor:         0.9,
      floor:          0.1,
      min_confidence: 0.3,
    }
  }
}

/// Retention windows for [`MemoryStore::prune`](crate::store::MemoryStore::prune).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
  pub exchange_days:    u32,
  pub action_days:      u32,
  pub error_days:       u32,
  pub correction_days:  u32,
  /// Corrections below this confidence, never used, and older than
  /// `correction_days` are deleted.
  pub correction_floor: f64,
  /// Keep exchanges that are linked to a feedback event.
  pub keep_high_value:  bool,
}

impl Default for RetentionPolicy {
  fn default() -> Self {
    Self {
      exchange_days:    90,
      action_days:      30,
      error_days:       60,
      correction_days:  30,
      correction_floor: 0.3,
      keep_high_value:  true,
    }
  }
}

/// Rows removed by one prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
  pub exchanges:      usize,
  pub actions:        usize,
  pub error_patterns: usize,
  pub corrections:    usize,
  pub index_entries:  usize,
}

impl PruneReport {
  pub fn total(&self) -> usize {
    self.exchanges + self.actions + self.error_patterns + self.corrections
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn usage(use_count: i64, success_rate: f64) -> ToolUsagePattern {
    ToolUsagePattern {
      id: 1,
      tool_name: "web".into(),
      action_name: "fetch".into(),
      use_count,
      success_count: 0,
      success_rate,
      avg_duration_ms: 0.0,
      last_used: None,
    }
  }

  #[test]
  fn reliability_warning_needs_enough_uses() {
    assert!(usage(4, 0.0).reliability_warning().is_none());
    assert!(usage(5, 0.4).reliability_warning().is_some());
    assert!(usage(10, 0.5).reliability_warning().is_none());
  }

  #[test]
  fn feedback_kind_names() {
    assert_eq!(FeedbackKind::Preference.as_ref(), "preference");
    assert_eq!("positive".parse::<FeedbackKind>().unwrap(), FeedbackKind::Positive);
  }
}

//! The closed set of logical tables and their column layouts.
//!
//! Every storage call names its table through [`Table`], so the allow-list is
//! the enum itself. String names are only accepted at the edges (CLI, import)
//! via [`Table::parse`].

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _};

use crate::{Error, Result, record::Fields};

// ─── Tables ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Table {
  Facts,
  UserInfo,
  Actions,
  Corrections,
  Feedback,
  ErrorPatterns,
  ToolPatterns,
  Exchanges,
  Notes,
  Tasks,
  Topics,
  Locations,
}

/// How a column's value is encoded at rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  Integer,
  Real,
  Text,
  /// Stored as 0/1, surfaced as a JSON boolean.
  Bool,
  /// Structured value stored as JSON text.
  Json,
  /// RFC 3339 UTC text.
  Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name: &'static str,
  pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> Column {
  Column { name, kind }
}

use ColumnKind::{Bool, Integer, Json, Real, Text, Timestamp};

const FACTS: &[Column] = &[
  col("content", Text),
  col("category", Text),
  col("source", Text),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const USER_INFO: &[Column] = &[
  col("key", Text),
  col("value", Text),
  col("category", Text),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const ACTIONS: &[Column] = &[
  col("tool_name", Text),
  col("action_name", Text),
  col("arguments", Json),
  col("result", Json),
  col("success", Bool),
  col("duration_ms", Integer),
  col("error", Text),
  col("session_id", Text),
  col("created_at", Timestamp),
];

const CORRECTIONS: &[Column] = &[
  col("trigger_pattern", Text),
  col("wrong_behavior", Text),
  col("correct_behavior", Text),
  col("tool_name", Text),
  col("action_name", Text),
  col("argument_name", Text),
  col("confidence", Real),
  col("use_count", Integer),
  col("session_id", Text),
  col("is_permanent", Bool),
  col("last_used", Timestamp),
  col("decayed_at", Timestamp),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const FEEDBACK: &[Column] = &[
  col("kind", Text),
  col("feedback_type", Text),
  col("message", Text),
  col("prior_action", Json),
  col("corrected_action", Json),
  col("applied", Bool),
  col("created_at", Timestamp),
];

const ERROR_PATTERNS: &[Column] = &[
  col("tool_name", Text),
  col("action_name", Text),
  col("error_type", Text),
  col("error_message", Text),
  col("occurrence_count", Integer),
  col("solution", Text),
  col("last_occurred", Timestamp),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const TOOL_PATTERNS: &[Column] = &[
  col("tool_name", Text),
  col("action_name", Text),
  col("use_count", Integer),
  col("success_count", Integer),
  col("success_rate", Real),
  col("avg_duration_ms", Real),
  col("last_used", Timestamp),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const EXCHANGES: &[Column] = &[
  col("session_id", Text),
  col("user_input", Text),
  col("ai_response", Text),
  col("tools_used", Json),
  col("mood", Text),
  col("topics", Json),
  col("feedback_id", Integer),
  col("created_at", Timestamp),
];

const NOTES: &[Column] = &[
  col("title", Text),
  col("content", Text),
  col("tags", Json),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const TASKS: &[Column] = &[
  col("title", Text),
  col("description", Text),
  col("status", Text),
  col("priority", Integer),
  col("due_at", Timestamp),
  col("completed_at", Timestamp),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const TOPICS: &[Column] = &[
  col("name", Text),
  col("mention_count", Integer),
  col("first_discussed", Timestamp),
  col("last_discussed", Timestamp),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const LOCATIONS: &[Column] = &[
  col("name", Text),
  col("path", Text),
  col("kind", Text),
  col("created_at", Timestamp),
  col("updated_at", Timestamp),
];

const ID: Column = col("id", Integer);

impl Table {
  /// Parse a table name, rejecting anything outside the fixed set.
  pub fn parse(name: &str) -> Result<Self> {
    name.parse().map_err(|_| Error::InvalidTable(name.to_owned()))
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Facts => "facts",
      Self::UserInfo => "user_info",
      Self::Actions => "actions",
      Self::Corrections => "corrections",
      Self::Feedback => "feedback",
      Self::ErrorPatterns => "error_patterns",
      Self::ToolPatterns => "tool_patterns",
      Self::Exchanges => "exchanges",
      Self::Notes => "notes",
      Self::Tasks => "tasks",
      Self::Topics => "topics",
      Self::Locations => "locations",
    }
  }

  pub fn all() -> impl Iterator<Item = Self> { Self::iter() }

  /// Columns other than the integer primary key `id`.
  pub fn columns(self) -> &'static [Column] {
    match self {
      Self::Facts => FACTS,
      Self::UserInfo => USER_INFO,
      Self::Actions => ACTIONS,
      Self::Corrections => CORRECTIONS,
      Self::Feedback => FEEDBACK,
      Self::ErrorPatterns => ERROR_PATTERNS,
      Self::ToolPatterns => TOOL_PATTERNS,
      Self::Exchanges => EXCHANGES,
      Self::Notes => NOTES,
      Self::Tasks => TASKS,
      Self::Topics => TOPICS,
      Self::Locations => LOCATIONS,
    }
  }

  /// Look up a column by name; `id` is accepted for every table.
  pub fn column(self, name: &str) -> Result<Column> {
    if name == ID.name {
      return Ok(ID);
    }
    self
      .columns()
      .iter()
      .find(|c| c.name == name)
      .copied()
      .ok_or_else(|| Error::InvalidColumn { table: self, column: name.to_owned() })
  }

  /// Ensure every key in `fields` names a column of this table.
  pub fn validate_fields(self, fields: &Fields) -> Result<()> {
    for name in fields.keys() {
      self.column(name)?;
    }
    Ok(())
  }

  pub fn has_updated_at(self) -> bool {
    self.columns().iter().any(|c| c.name == "updated_at")
  }

  /// Rows in these tables are written once and never updated.
  pub fn is_append_only(self) -> bool { matches!(self, Self::Actions | Self::Exchanges) }

  /// The only column of a row that may change after insert, for tables that
  /// are otherwise immutable.
  pub fn sole_mutable_column(self) -> Option<&'static str> {
    match self {
      Self::Feedback => Some("applied"),
      _ => None,
    }
  }

  /// Tables mirrored into the full-text index.
  pub fn is_indexable(self) -> bool { !self.index_columns().is_empty() }

  /// The columns concatenated (in order) into a row's index document.
  pub fn index_columns(self) -> &'static [&'static str] {
    match self {
      Self::Facts => &["content"],
      Self::UserInfo => &["key", "value"],
      Self::Exchanges => &["user_input", "ai_response"],
      Self::Notes => &["title", "content"],
      Self::Tasks => &["title", "description"],
      Self::Locations => &["name", "path"],
      _ => &[],
    }
  }

  /// Derive the plain-text index document for a row of this table.
  ///
  /// Returns `None` for tables that are not indexed, or when every indexed
  /// column is empty.
  pub fn index_document(self, fields: &Fields) -> Option<String> {
    let parts: Vec<&str> = self
      .index_columns()
      .iter()
      .filter_map(|c| fields.get(*c).and_then(|v| v.as_str()))
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .collect();

    if parts.is_empty() {
      return None;
    }

    let separator = if self == Self::UserInfo { ": " } else { " " };
    Some(parts.join(separator))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::record::fields;

  #[test]
  fn parse_rejects_unknown_names() {
    assert_eq!(Table::parse("user_info").unwrap(), Table::UserInfo);
    assert!(matches!(
      Table::parse("users; DROP TABLE facts"),
      Err(Error::InvalidTable(_))
    ));
  }

  #[test]
  fn strum_names_match_sql_names() {
    for table in Table::all() {
      assert_eq!(table.as_ref(), table.as_str());
    }
  }

  #[test]
  fn unknown_column_is_rejected() {
    let f = fields(json!({ "content": "x", "bogus": 1 }));
    assert!(matches!(
      Table::Facts.validate_fields(&f),
      Err(Error::InvalidColumn { .. })
    ));
  }

  #[test]
  fn user_info_document_joins_key_and_value() {
    let f = fields(json!({ "key": "name", "value": "Ada" }));
    assert_eq!(Table::UserInfo.index_document(&f).as_deref(), Some("name: Ada"));
    assert_eq!(Table::Corrections.index_document(&f), None);
  }
}

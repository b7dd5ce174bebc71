//! Learned argument rewriting.
//!
//! Everything here is pure: [`CorrectionEngine`](crate::CorrectionEngine)
//! loads a [`LearnedArguments`] snapshot from the store and this module
//! applies it to one tool call's arguments.

use std::collections::HashMap;

use hindsight_core::{memory::Correction, record::Fields};
use regex::{NoExpand, Regex};
use serde_json::Value;

/// `user_info.category` values owned by the learning engine.
pub const DEFAULT_CATEGORY: &str = "default";
pub const SHORTCUT_CATEGORY: &str = "shortcut";
pub const ALIAS_CATEGORY: &str = "alias";

/// Argument names tried, in order, when deciding which argument a correction
/// rewrites.
const PRIMARY_ARGUMENTS: &[&str] =
  &["app", "application", "name", "path", "file", "query", "target", "url"];

/// Arguments naming an application; the only ones aliases rewrite.
const APP_ARGUMENTS: &[&str] = &["app", "application"];

/// Known application families. Correcting to a member teaches the family's
/// generic name as an alias for it.
pub const FAMILIES: &[(&str, &[&str])] = &[
  ("browser", &["chrome", "firefox", "edge", "brave", "opera", "vivaldi", "safari"]),
  ("editor", &["code", "vscode", "notepad++", "sublime", "atom", "vim", "nvim", "notepad"]),
  ("terminal", &["powershell", "cmd", "windows terminal", "wt", "alacritty", "kitty"]),
];

pub fn user_info_key(category: &str, name: &str) -> String {
  format!("{category}.{}", name.trim().to_lowercase())
}

pub fn default_key(tool: &str, argument: &str) -> String {
  user_info_key(DEFAULT_CATEGORY, &format!("{tool}.{argument}"))
}

/// The generic family name `value` belongs to, if any.
pub fn family_of(value: &str) -> Option<&'static str> {
  let value = value.trim().to_lowercase();
  FAMILIES
    .iter()
    .find(|(_, members)| members.contains(&value.as_str()))
    .map(|(family, _)| *family)
}

/// Strip articles and possessives from a spoken argument ("the browser",
/// "my editor") so it can be compared against alias names.
fn generic_name(value: &str) -> String {
  let lower = value.trim().to_lowercase();
  let mut rest = lower.as_str();
  for prefix in ["the ", "my ", "a ", "web "] {
    if let Some(stripped) = rest.strip_prefix(prefix) {
      rest = stripped.trim_start();
    }
  }
  rest.to_owned()
}

/// Find the argument of `args` that a correction to `intent` replaces.
/// Returns `(argument name, wrong value)`.
///
/// The first primary argument present decides alone: if it already holds
/// `intent` there is nothing to correct. Other string arguments are only
/// considered when the call has no primary argument at all.
pub fn corrected_argument(args: &Fields, intent: &str) -> Option<(String, String)> {
  let differs = |value: &str| !value.trim().eq_ignore_ascii_case(intent.trim());
  let primary = PRIMARY_ARGUMENTS
    .iter()
    .find_map(|name| args.get(*name).and_then(Value::as_str).map(|v| (*name, v)));
  let (name, value) = match primary {
    Some(primary) => primary,
    None => args
      .iter()
      .filter_map(|(name, v)| v.as_str().map(|v| (name.as_str(), v)))
      .find(|(_, value)| differs(value))?,
  };
  differs(value).then(|| (name.to_owned(), value.to_owned()))
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Learned rewriting state for one tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearnedArguments {
  /// Corrections scoped to the call, strongest first.
  pub corrections: Vec<Correction>,
  /// Generic name → concrete value.
  pub aliases:     HashMap<String, String>,
  /// Argument name → default value.
  pub defaults:    HashMap<String, String>,
  /// Phrase → expansion.
  pub shortcuts:   Vec<(String, String)>,
}

impl LearnedArguments {
  pub fn is_empty(&self) -> bool {
    self.corrections.is_empty()
      && self.aliases.is_empty()
      && self.defaults.is_empty()
      && self.shortcuts.is_empty()
  }

  /// Fold one learned `user_info` attribute into the snapshot for a call to
  /// `tool`. Attributes of other categories, and defaults of other tools,
  /// are ignored.
  pub fn absorb_attribute(&mut self, tool: &str, key: &str, value: &str, category: &str) {
    let name = key.split_once('.').map_or(key, |(_, name)| name);
    match category {
      ALIAS_CATEGORY => {
        self.aliases.insert(name.to_owned(), value.to_owned());
      }
      SHORTCUT_CATEGORY => self.shortcuts.push((name.to_owned(), value.to_owned())),
      DEFAULT_CATEGORY => {
        if let Some(argument) = key.strip_prefix(&default_key(tool, "")) {
          self.defaults.insert(argument.to_owned(), value.to_owned());
        }
      }
      _ => {}
    }
  }

  /// Rewrite `args` in order: correction rewrites, alias resolution of the
  /// application argument, missing defaults, then shortcut expansion inside
  /// string values.
  pub fn apply(&self, mut args: Fields) -> Fields {
    for correction in &self.corrections {
      let (Some(argument), Some(wrong)) = (&correction.argument_name, &correction.wrong_behavior)
      else {
        continue;
      };
      if let Some(Value::String(current)) = args.get_mut(argument)
        && current.trim().eq_ignore_ascii_case(wrong.trim())
      {
        *current = correction.correct_behavior.clone();
      }
    }

    for argument in APP_ARGUMENTS {
      if let Some(Value::String(current)) = args.get_mut(*argument)
        && let Some(concrete) = self.aliases.get(&generic_name(current))
      {
        *current = concrete.clone();
      }
    }

    for (argument, default) in &self.defaults {
      let missing = match args.get(argument) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
      };
      if missing {
        args.insert(argument.clone(), Value::String(default.clone()));
      }
    }

    if !self.shortcuts.is_empty() {
      let mut shortcuts: Vec<_> = self
        .shortcuts
        .iter()
        .filter(|(phrase, _)| !phrase.trim().is_empty())
        .filter_map(|(phrase, expansion)| {
          Regex::new(&format!(r"(?i)\b{}\b", regex::escape(phrase.trim())))
            .ok()
            .map(|re| (phrase.len(), re, expansion))
        })
        .collect();
      // Longer phrases first so "my docs folder" wins over "my docs".
      shortcuts.sort_by(|a, b| b.0.cmp(&a.0));
      for value in args.values_mut() {
        if let Value::String(current) = value {
          for (_, re, expansion) in &shortcuts {
            if re.is_match(current) {
              let expanded = re.replace_all(current.as_str(), NoExpand(expansion.as_str()));
              *current = expanded.into_owned();
            }
          }
        }
      }
    }

    args
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use hindsight_core::record::fields;
  use serde_json::json;

  use super::*;

  fn correction(argument: &str, wrong: &str, correct: &str) -> Correction {
    Correction {
      id:               1,
      trigger_pattern:  format!("no, i meant {correct}"),
      wrong_behavior:   Some(wrong.into()),
      correct_behavior: correct.into(),
      tool_name:        Some("windows".into()),
      action_name:      Some("open_app".into()),
      argument_name:    Some(argument.into()),
      confidence:       1.0,
      use_count:        0,
      session_id:       None,
      is_permanent:     true,
      last_used:        None,
      decayed_at:       None,
      created_at:       Utc::now(),
      updated_at:       None,
    }
  }

  #[test]
  fn families() {
    assert_eq!(family_of("Firefox"), Some("browser"));
    assert_eq!(family_of("nvim"), Some("editor"));
    assert_eq!(family_of("spotify"), None);
  }

  #[test]
  fn picks_primary_argument_first() {
    let args = fields(json!({ "mode": "fast", "app": "chrome" }));
    assert_eq!(
      corrected_argument(&args, "firefox"),
      Some(("app".to_owned(), "chrome".to_owned()))
    );
    // Nothing to correct when the call already used the intent.
    let args = fields(json!({ "app": "Firefox" }));
    assert_eq!(corrected_argument(&args, "firefox"), None);
  }

  #[test]
  fn matching_primary_argument_hides_the_rest() {
    let args = fields(json!({ "app": "firefox", "mode": "fast" }));
    assert_eq!(corrected_argument(&args, "firefox"), None);

    // Without a primary argument any differing string argument is a candidate.
    let args = fields(json!({ "count": 2, "mode": "fast" }));
    assert_eq!(
      corrected_argument(&args, "slow"),
      Some(("mode".to_owned(), "fast".to_owned()))
    );
    let args = fields(json!({ "mode": "slow" }));
    assert_eq!(corrected_argument(&args, "slow"), None);
  }

  #[test]
  fn aliases_only_rewrite_the_app_argument() {
    let learned = LearnedArguments {
      aliases: HashMap::from([("browser".to_owned(), "firefox".to_owned())]),
      ..LearnedArguments::default()
    };

    let out = learned.apply(fields(json!({ "query": "browser" })));
    assert_eq!(out["query"], "browser");

    let out = learned.apply(fields(json!({ "app": "the browser", "title": "my browser" })));
    assert_eq!(out["app"], "firefox");
    assert_eq!(out["title"], "my browser");

    let out = learned.apply(fields(json!({ "application": "Browser" })));
    assert_eq!(out["application"], "firefox");
  }

  #[test]
  fn rewrite_order() {
    let learned = LearnedArguments {
      corrections: vec![correction("app", "chrome", "firefox")],
      aliases:     HashMap::from([("editor".to_owned(), "nvim".to_owned())]),
      defaults:    HashMap::from([("monitor".to_owned(), "2".to_owned())]),
      shortcuts:   vec![("my docs".to_owned(), "C:\\Users\\me\\Documents".to_owned())],
    };

    let out = learned.apply(fields(json!({ "app": "Chrome", "note": "save to My Docs" })));
    assert_eq!(out["app"], "firefox");
    assert_eq!(out["monitor"], "2");
    assert_eq!(out["note"], "save to C:\\Users\\me\\Documents");

    let out = learned.apply(fields(json!({ "app": "the editor", "monitor": "1" })));
    assert_eq!(out["app"], "nvim");
    assert_eq!(out["monitor"], "1");
  }

  #[test]
  fn empty_snapshot_is_identity() {
    let args = fields(json!({ "app": "chrome", "count": 3 }));
    assert_eq!(LearnedArguments::default().apply(args.clone()), args);
  }
}

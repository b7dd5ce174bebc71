//! User-facing guidance for failures that are not (or no longer) retried.

use hindsight_core::record::Fields;
use serde_json::Value;

use crate::category::ErrorCategory;

/// Actions whose `app` argument names an application to locate.
const APP_ACTIONS: &[&str] = &["open_app", "find_app_path"];

/// The first `max` characters of `text`.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
  match text.char_indices().nth(max) {
    Some((idx, _)) => &text[..idx],
    None => text,
  }
}

fn arg_str<'a>(args: &'a Fields, name: &str) -> Option<&'a str> {
  args.get(name).and_then(Value::as_str)
}

pub fn permission(tool: &str, action: &str) -> String {
  [
    format!("Permission denied for {tool}.{action}."),
    "This might require:".to_owned(),
    "1. Running as Administrator".to_owned(),
    "2. Checking file/folder permissions".to_owned(),
    "3. Closing programs that might be using the resource".to_owned(),
  ]
  .join("\n")
}

pub fn clarification(tool: &str, action: &str, args: &Fields, error: &str) -> String {
  let mut lines = vec![format!("Invalid input for {tool}.{action}.")];
  let lower = error.to_lowercase();
  if lower.contains("argument") || lower.contains("parameter") {
    lines.push("Please check the arguments provided.".to_owned());
  }
  let rendered = Value::Object(args.clone()).to_string();
  lines.push(format!("Current arguments: {}", truncate(&rendered, 200)));
  lines.push("Could you clarify what you'd like me to do?".to_owned());
  lines.join("\n")
}

pub fn cannot_complete(tool: &str, action: &str, error: &str) -> String {
  format!("This action ({tool}.{action}) cannot be completed: {}", truncate(error, 100))
}

pub fn generic(category: ErrorCategory) -> &'static str {
  match category {
    ErrorCategory::Transient => "The service seems temporarily unavailable. Try again in a moment.",
    ErrorCategory::RateLimit => "We've hit a rate limit. Please wait a moment before trying again.",
    ErrorCategory::Unknown => {
      "An unexpected error occurred. Please try again or rephrase your request."
    }
    _ => "Something went wrong. Please try again.",
  }
}

pub fn retries_exhausted(retries: u32) -> String {
  format!("Failed after {retries} retries. The service may be down.")
}

/// Suggest next steps when a path or application could not be found. Does
/// not search for anything itself.
pub fn alternatives(action: &str, args: &Fields) -> Option<String> {
  let mut lines = vec![];

  let path = ["path", "file_path", "file", "directory"]
    .iter()
    .find_map(|name| arg_str(args, name));
  if let Some(path) = path {
    lines.extend([
      format!("The path '{path}' was not found."),
      "Would you like me to:".to_owned(),
      "1. Search for similar files?".to_owned(),
      "2. Check if the path has a typo?".to_owned(),
      "3. Look in common locations?".to_owned(),
    ]);
  }

  if APP_ACTIONS.contains(&action)
    && let Some(app) = arg_str(args, "app")
  {
    lines.extend([
      format!("Could not find '{app}'."),
      "Would you like me to:".to_owned(),
      "1. Search installed applications?".to_owned(),
      "2. Try a different app name?".to_owned(),
    ]);
  }

  (!lines.is_empty()).then(|| lines.join("\n"))
}

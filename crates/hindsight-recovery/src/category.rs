//! Error categorization by ordered keyword patterns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

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
pub enum ErrorCategory {
  /// Network blips and timeouts; retried automatically.
  Transient,
  /// Needs elevation or different permissions; never retried.
  Permission,
  /// Missing file, path or application.
  NotFound,
  /// Quota or throttling; retried with long backoff.
  RateLimit,
  /// The call itself was malformed; the user is asked to clarify.
  InvalidInput,
  /// Unsupported or unrecoverable; never retried.
  Permanent,
  Unknown,
}

/// Checked in order against the lower-cased message; the first category with
/// a matching pattern wins. Rate limits and permission problems are checked
/// before not-found so that "quota missing" or "admin rights missing" are not
/// read as missing resources, and invalid input before not-found so that
/// "missing required argument" is a clarification request.
const RULES: &[(ErrorCategory, &[&str])] = &[
  (ErrorCategory::RateLimit, &[
    r"rate\s*limit",
    r"quota",
    r"too\s*many\s*requests",
    r"\b429\b",
    r"throttl",
    r"(limit|quota)\s*exceeded",
    r"exceeded\s*.*\b(limit|quota)",
    r"resource_exhausted",
  ]),
  (ErrorCategory::Permission, &[
    r"permission\s*denied",
    r"access\s*(is\s*)?denied",
    r"unauthori[sz]ed",
    r"forbidden",
    r"\b403\b",
    r"\b401\b",
    r"elevation\s*required",
    r"\badmin",
    r"privilege",
    r"not\s*allowed",
  ]),
  (ErrorCategory::InvalidInput, &[
    r"invalid\s*(argument|parameter|input|value)",
    r"bad\s*request",
    r"\b400\b",
    r"malformed",
    r"syntax\s*error",
    r"type\s*error",
    r"value\s*error",
    r"missing\s*required",
  ]),
  (ErrorCategory::NotFound, &[
    r"not\s*found",
    r"no\s*such\s*file",
    r"does\s*not\s*exist",
    r"\b404\b",
    r"missing",
    r"cannot\s*find",
    r"path.*invalid",
    r"filenotfounderror",
    r"enoent",
  ]),
  (ErrorCategory::Transient, &[
    r"timeout",
    r"timed?\s*out",
    r"connection\s*(refused|reset|error|aborted)",
    r"network",
    r"unreachable",
    r"temporarily\s*unavailable",
    r"\b50[234]\b",
    r"etimedout",
    r"econnreset",
  ]),
  (ErrorCategory::Permanent, &[
    r"not\s*supported",
    r"deprecated",
    r"removed",
    r"incompatible",
    r"fatal",
    r"unrecoverable",
  ]),
];

/// Maps free-form error text onto an [`ErrorCategory`].
pub struct ErrorCategorizer {
  rules: Vec<(ErrorCategory, Regex)>,
}

impl Default for ErrorCategorizer {
  fn default() -> Self { Self::new() }
}

impl ErrorCategorizer {
  pub fn new() -> Self {
    let rules = RULES
      .iter()
      .flat_map(|(category, patterns)| patterns.iter().map(move |p| (*category, p)))
      .filter_map(|(category, pattern)| Regex::new(pattern).ok().map(|re| (category, re)))
      .collect();
    Self { rules }
  }

  pub fn categorize(&self, message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    self
      .rules
      .iter()
      .find(|(_, re)| re.is_match(&lower))
      .map_or(ErrorCategory::Unknown, |(category, _)| *category)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_pattern_compiles() {
    let expected: usize = RULES.iter().map(|(_, p)| p.len()).sum();
    assert_eq!(ErrorCategorizer::new().rules.len(), expected);
  }

  #[test]
  fn categorizes_common_failures() {
    let c = ErrorCategorizer::new();
    let cases = [
      ("Connection reset by peer", ErrorCategory::Transient),
      ("request timed out after 30s", ErrorCategory::Transient),
      ("HTTP 503 Service Unavailable", ErrorCategory::Transient),
      ("ETIMEDOUT", ErrorCategory::Transient),
      ("Access is denied.", ErrorCategory::Permission),
      ("401 Unauthorized", ErrorCategory::Permission),
      ("[Errno 2] No such file or directory: 'C:/x.txt'", ErrorCategory::NotFound),
      ("application 'spotfy' not found", ErrorCategory::NotFound),
      ("429 Too Many Requests", ErrorCategory::RateLimit),
      ("daily quota exceeded", ErrorCategory::RateLimit),
      ("missing required argument 'app'", ErrorCategory::InvalidInput),
      ("invalid value for volume", ErrorCategory::InvalidInput),
      ("operation not supported on this platform", ErrorCategory::Permanent),
      ("something odd happened", ErrorCategory::Unknown),
    ];
    for (message, expected) in cases {
      assert_eq!(c.categorize(message), expected, "{message:?}");
    }
  }

  #[test]
  fn names() {
    assert_eq!(ErrorCategory::InvalidInput.as_ref(), "invalid_input");
    assert_eq!("rate_limit".parse::<ErrorCategory>().unwrap(), ErrorCategory::RateLimit);
  }
}

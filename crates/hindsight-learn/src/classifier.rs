//! Rule-based feedback classifier.
//!
//! Three ordered rule lists (correction, positive, negative) are matched
//! against the lower-cased, trimmed utterance. The first list with any match
//! decides the kind; within it the first matching rule decides the type.

use hindsight_core::memory::FeedbackKind;
use regex::Regex;
use serde::Serialize;
use strum::{AsRefStr, Display};

/// Coarse classification of an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UtteranceKind {
  Correction,
  Positive,
  Negative,
  None,
}

/// The rule that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FeedbackType {
  // correction
  Negation,
  Clarification,
  StopInstruction,
  RetryRequest,
  Preference,
  // positive
  Praise,
  Gratitude,
  SuccessConfirmation,
  Affirmation,
  // negative
  Frustration,
  Disappointment,
  Stop,
  ExplicitNegative,
}

impl FeedbackType {
  pub fn kind(self) -> UtteranceKind {
    match self {
      Self::Negation
      | Self::Clarification
      | Self::StopInstruction
      | Self::RetryRequest
      | Self::Preference => UtteranceKind::Correction,
      Self::Praise | Self::Gratitude | Self::SuccessConfirmation | Self::Affirmation => {
        UtteranceKind::Positive
      }
      Self::Frustration | Self::Disappointment | Self::Stop | Self::ExplicitNegative => {
        UtteranceKind::Negative
      }
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
  pub kind:          UtteranceKind,
  pub feedback_type: Option<FeedbackType>,
  /// Literal intended behavior pulled out of a correction ("i meant X").
  pub intent:        Option<String>,
}

impl Classification {
  pub fn none() -> Self { Self { kind: UtteranceKind::None, feedback_type: None, intent: None } }

  pub fn is_feedback(&self) -> bool { self.kind != UtteranceKind::None }

  /// The stored feedback kind, if this is feedback at all. Preference
  /// statements are logged as preferences rather than generic corrections.
  pub fn feedback_kind(&self) -> Option<FeedbackKind> {
    match (self.kind, self.feedback_type) {
      (UtteranceKind::Correction, Some(FeedbackType::Preference)) => Some(FeedbackKind::Preference),
      (UtteranceKind::Correction, _) => Some(FeedbackKind::Correction),
      (UtteranceKind::Positive, _) => Some(FeedbackKind::Positive),
      (UtteranceKind::Negative, _) => Some(FeedbackKind::Negative),
      (UtteranceKind::None, _) => None,
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

const CORRECTION_RULES: &[(FeedbackType, &str)] = &[
  (FeedbackType::Negation, r"^(no|nope|nah)\b"),
  (FeedbackType::Negation, r"\bnot (that|this|what i)\b"),
  (FeedbackType::Negation, r"\bthat'?s (wrong|not (it|right|what i))"),
  (FeedbackType::Negation, r"\bwrong (one|app|file|folder|thing|song)\b"),
  (FeedbackType::Clarification, r"\bi (meant|mean|said)\b"),
  (FeedbackType::Clarification, r"\bi was (asking|talking) about\b"),
  (FeedbackType::Clarification, r"\bwhat i (meant|wanted) (was|is)\b"),
  (FeedbackType::StopInstruction, r"\b(don'?t|do not|never) (do|use|open|say|play|call)\b"),
  (FeedbackType::StopInstruction, r"\bstop (doing|using|opening|saying|playing)\b"),
  (FeedbackType::RetryRequest, r"\b(try|do it|do that) again\b"),
  (FeedbackType::RetryRequest, r"\btry (a )?different\b"),
  (FeedbackType::RetryRequest, r"\bredo\b"),
  (FeedbackType::Preference, r"\bi( prefer|'d rather| would rather|'d prefer| would prefer)\b"),
  (FeedbackType::Preference, r"^(always|from now on|next time)\b"),
  (FeedbackType::Preference, r"\binstead\b"),
];

const POSITIVE_RULES: &[(FeedbackType, &str)] = &[
  (FeedbackType::Praise, r"\b(great|awesome|perfect|excellent|amazing|nice|good) (job|work)\b"),
  (FeedbackType::Praise, r"^(great|awesome|perfect|excellent|amazing|brilliant|nice)\b"),
  (FeedbackType::Praise, r"\bwell done\b"),
  (FeedbackType::Gratitude, r"\b(thanks|thank you|thx|cheers|appreciate it)\b"),
  (FeedbackType::SuccessConfirmation, r"\b(that|it) (worked|works)\b"),
  (FeedbackType::SuccessConfirmation, r"\bthat'?s (it|right|correct|exactly)\b"),
  (FeedbackType::SuccessConfirmation, r"\bexactly\b"),
  (FeedbackType::Affirmation, r"^(yes|yep|yeah|yup|correct|right|ok|okay|sure)\b"),
];

const NEGATIVE_RULES: &[(FeedbackType, &str)] = &[
  (FeedbackType::Frustration, r"\b(ugh|argh|damn|dammit|come on|seriously)\b"),
  (FeedbackType::Frustration, r"\bwhy (did|would|do) you\b"),
  (FeedbackType::Disappointment, r"\b(disappointing|useless|terrible|awful|not helpful|unhelpful)\b"),
  (FeedbackType::Stop, r"^(stop|cancel|quit|enough|shut up|be quiet)\b"),
  (FeedbackType::ExplicitNegative, r"\b(that'?s|it'?s|this is) (bad|broken|annoying)\b"),
  (FeedbackType::ExplicitNegative, r"\b(didn'?t|doesn'?t|does not|did not) work\b"),
  (FeedbackType::ExplicitNegative, r"\bi (hate|dislike)\b"),
];

/// Capture group 1 holds the intended behavior. Run against the trimmed
/// original text so the captured fragment keeps its casing.
const INTENT_PATTERNS: &[&str] = &[
  r"(?i)\bi (?:meant|mean|said)\s+(.+)",
  r"(?i)\bi(?: would|'d) (?:prefer|rather(?: have)?|like)\s+(.+)",
  r"(?i)\bi prefer\s+(.+)",
  r"(?i)\bwhat i (?:meant|wanted) (?:was|is)\s+(.+)",
  r"(?i)\b(?:use|open|try|play)\s+(.+?)\s+instead\b",
  r"(?i)\binstead(?: of [^,]+)?,?\s+(?:use|open|try|play)\s+(.+)",
  r"(?i)\bfrom now on,?\s+(?:use|open|play)\s+(.+)",
  r"(?i)\bshould(?: have|'ve)? (?:been|used|opened|be)\s+(.+)",
  r"(?i)\bnot [^,]+,\s*(?:use |open )?(.+)",
];

/// Compile a static rule table. A pattern that fails to compile is dropped;
/// the unit tests assert none do.
fn compile<T: Copy>(rules: &[(T, &str)]) -> Vec<(T, Regex)> {
  rules
    .iter()
    .filter_map(|(tag, pattern)| Regex::new(pattern).ok().map(|re| (*tag, re)))
    .collect()
}

/// Stateless utterance classifier. Build once and share.
pub struct FeedbackClassifier {
  correction: Vec<(FeedbackType, Regex)>,
  positive:   Vec<(FeedbackType, Regex)>,
  negative:   Vec<(FeedbackType, Regex)>,
  intent:     Vec<Regex>,
}

impl Default for FeedbackClassifier {
  fn default() -> Self { Self::new() }
}

impl FeedbackClassifier {
  pub fn new() -> Self {
    Self {
      correction: compile(CORRECTION_RULES),
      positive:   compile(POSITIVE_RULES),
      negative:   compile(NEGATIVE_RULES),
      intent:     INTENT_PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect(),
    }
  }

  pub fn classify(&self, text: &str) -> Classification {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    if lower.is_empty() {
      return Classification::none();
    }

    for rules in [&self.correction, &self.positive, &self.negative] {
      if let Some((feedback_type, _)) = rules.iter().find(|(_, re)| re.is_match(&lower)) {
        let kind = feedback_type.kind();
        let intent = if kind == UtteranceKind::Correction {
          self.extract_intent(trimmed)
        } else {
          None
        };
        return Classification { kind, feedback_type: Some(*feedback_type), intent };
      }
    }
    Classification::none()
  }

  /// Pull the literal intended behavior out of a correction, if stated.
  pub fn extract_intent(&self, text: &str) -> Option<String> {
    self
      .intent
      .iter()
      .filter_map(|re| re.captures(text))
      .filter_map(|caps| caps.get(1).map(|m| clean_intent(m.as_str())))
      .find(|intent| !intent.is_empty())
  }
}

fn clean_intent(raw: &str) -> String {
  let mut s = raw.trim().trim_end_matches(['.', '!', '?', ',', ';']).trim();
  for suffix in [" instead", " please"] {
    let cut = s.len().saturating_sub(suffix.len());
    if s.get(cut..).is_some_and(|tail| tail.eq_ignore_ascii_case(suffix)) {
      s = s[..cut].trim_end();
    }
  }
  s.to_owned()
}

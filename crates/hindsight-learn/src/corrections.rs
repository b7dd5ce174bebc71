//! The correction learning engine.

use std::sync::Arc;

use chrono::Utc;
use hindsight_core::{
  Filter, Query, Table,
  memory::{Correction, CorrectionScope, CorrectionWrite, DecayPolicy, NewCorrection},
  record::Fields,
  store::MemoryStore,
};
use strsim::normalized_levenshtein;

use crate::arguments::{
  self, ALIAS_CATEGORY, DEFAULT_CATEGORY, LearnedArguments, SHORTCUT_CATEGORY,
};

/// Triggers at least this similar to an existing one reinforce it instead of
/// creating a new correction.
pub const REINFORCE_SIMILARITY: f64 = 0.8;

/// Minimum score for a correction to match an utterance.
pub const MATCH_FLOOR: f64 = 0.6;

/// Score given when the trigger appears verbatim inside the utterance.
const CONTAINMENT_SCORE: f64 = 0.9;

fn normalize(text: &str) -> String { text.trim().to_lowercase() }

/// Learns, matches and applies corrections kept in a [`MemoryStore`].
pub struct CorrectionEngine<S> {
  store:  Arc<S>,
  policy: DecayPolicy,
}

impl<S> Clone for CorrectionEngine<S> {
  fn clone(&self) -> Self { Self { store: self.store.clone(), policy: self.policy } }
}

impl<S: MemoryStore> CorrectionEngine<S> {
  pub fn new(store: Arc<S>) -> Self { Self::with_policy(store, DecayPolicy::default()) }

  pub fn with_policy(store: Arc<S>, policy: DecayPolicy) -> Self { Self { store, policy } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn policy(&self) -> DecayPolicy { self.policy }

  // ─── Learning ──────────────────────────────────────────────────────────────

  /// Learn a correction. A correction in the same scope whose trigger is at
  /// least [`REINFORCE_SIMILARITY`] similar is reinforced and takes the new
  /// behavior; otherwise a new correction is stored.
  pub async fn learn_correction(
    &self,
    mut correction: NewCorrection,
  ) -> Result<CorrectionWrite, S::Error> {
    correction.trigger_pattern = normalize(&correction.trigger_pattern);
    let correct = correction.correct_behavior.clone();

    let everything = DecayPolicy { min_confidence: 0.0, ..self.policy };
    let existing = self
      .store
      .relevant_corrections(everything, correction.scope.session_id().map(str::to_owned))
      .await?;

    let mut best: Option<(f64, i64)> = None;
    for c in existing.iter().filter(|c| c.scope() == correction.scope) {
      let score = normalized_levenshtein(&c.trigger_pattern, &correction.trigger_pattern);
      if score >= REINFORCE_SIMILARITY && best.is_none_or(|(top, _)| score > top) {
        best = Some((score, c.id));
      }
    }

    let write = match best {
      Some((score, id)) => {
        tracing::debug!(id, score, "reinforcing similar correction");
        self.store.reinforce_correction(id, correction).await?;
        CorrectionWrite { id, reinforced: true }
      }
      None => self.store.add_or_reinforce_correction(correction).await?,
    };
    tracing::info!(id = write.id, reinforced = write.reinforced, %correct, "learned correction");

    if let Some(family) = arguments::family_of(&correct) {
      self.learn_alias(family, &correct).await?;
    }
    Ok(write)
  }

  pub async fn learn_default(
    &self,
    tool: &str,
    argument: &str,
    value: &str,
  ) -> Result<(), S::Error> {
    self
      .store
      .upsert_user_attribute(
        arguments::default_key(tool, argument),
        value.to_owned(),
        Some(DEFAULT_CATEGORY.to_owned()),
      )
      .await?;
    Ok(())
  }

  pub async fn learn_shortcut(&self, phrase: &str, expansion: &str) -> Result<(), S::Error> {
    self
      .store
      .upsert_user_attribute(
        arguments::user_info_key(SHORTCUT_CATEGORY, phrase),
        expansion.to_owned(),
        Some(SHORTCUT_CATEGORY.to_owned()),
      )
      .await?;
    Ok(())
  }

  /// Resolve the generic name `generic` ("browser") to `concrete` from now on.
  pub async fn learn_alias(&self, generic: &str, concrete: &str) -> Result<(), S::Error> {
    self
      .store
      .upsert_user_attribute(
        arguments::user_info_key(ALIAS_CATEGORY, generic),
        concrete.trim().to_owned(),
        Some(ALIAS_CATEGORY.to_owned()),
      )
      .await?;
    tracing::debug!(generic, concrete, "learned alias");
    Ok(())
  }

  // ─── Matching ──────────────────────────────────────────────────────────────

  /// The permanent correction best matching `input`, if any scores above
  /// [`MATCH_FLOOR`]. The match is marked used.
  pub async fn find_matching_correction(
    &self,
    input: &str,
  ) -> Result<Option<Correction>, S::Error> {
    self.find_match(input, None).await
  }

  /// Like [`find_matching_correction`](Self::find_matching_correction), but
  /// also considers corrections scoped to `session`.
  pub async fn find_matching_in_session(
    &self,
    input: &str,
    session: &str,
  ) -> Result<Option<Correction>, S::Error> {
    self.find_match(input, Some(session.to_owned())).await
  }

  async fn find_match(
    &self,
    input: &str,
    session: Option<String>,
  ) -> Result<Option<Correction>, S::Error> {
    let input = normalize(input);
    if input.is_empty() {
      return Ok(None);
    }
    self.store.decay_stale_corrections(self.policy, Utc::now()).await?;
    let candidates = self.store.relevant_corrections(self.policy, session).await?;

    let mut best: Option<(f64, Correction)> = None;
    for c in candidates {
      let trigger = normalize(&c.trigger_pattern);
      if trigger.is_empty() {
        continue;
      }
      let score = if input.contains(&trigger) {
        CONTAINMENT_SCORE
      } else {
        normalized_levenshtein(&input, &trigger)
      };
      let top = best.as_ref().map_or(MATCH_FLOOR, |(top, _)| *top);
      if score > top {
        best = Some((score, c));
      }
    }

    let Some((score, mut correction)) = best else {
      return Ok(None);
    };
    self.store.mark_correction_used(correction.id).await?;
    correction.use_count += 1;
    correction.last_used = Some(Utc::now());
    tracing::debug!(id = correction.id, score, "matched correction");
    Ok(Some(correction))
  }

  /// Permanent corrections scoped to `tool` (and `action`), strongest first.
  pub async fn corrections_for(
    &self,
    tool: &str,
    action: Option<&str>,
  ) -> Result<Vec<Correction>, S::Error> {
    self.store.decay_stale_corrections(self.policy, Utc::now()).await?;
    let mut scoped: Vec<Correction> = self
      .store
      .relevant_corrections(self.policy, None)
      .await?
      .into_iter()
      .filter(|c| c.applies_to(tool, action))
      .collect();
    scoped.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(scoped)
  }

  /// Corrections learned with session scope `session`.
  pub async fn session_corrections(&self, session: &str) -> Result<Vec<Correction>, S::Error> {
    let everything = DecayPolicy { min_confidence: 0.0, ..self.policy };
    let scope = CorrectionScope::Session(session.to_owned());
    Ok(
      self
        .store
        .relevant_corrections(everything, Some(session.to_owned()))
        .await?
        .into_iter()
        .filter(|c| c.scope() == scope)
        .collect(),
    )
  }

  /// Discard the session's corrections. Returns how many were removed.
  pub async fn end_session(&self, session: &str) -> Result<usize, S::Error> {
    let purged = self.store.purge_session_corrections(session.to_owned()).await?;
    tracing::info!(session, purged, "ended session");
    Ok(purged)
  }

  // ─── Applying ──────────────────────────────────────────────────────────────

  /// Load everything learned that applies to a `tool.action` call.
  pub async fn learned_arguments(
    &self,
    tool: &str,
    action: &str,
  ) -> Result<LearnedArguments, S::Error> {
    let mut learned = LearnedArguments {
      corrections: self.corrections_for(tool, Some(action)).await?,
      ..LearnedArguments::default()
    };

    let attributes = self
      .store
      .select(Table::UserInfo, Query::new(Filter::new().not_null("category")))
      .await?;
    for record in &attributes {
      if let (Some(key), Some(value), Some(category)) =
        (record.get_str("key"), record.get_str("value"), record.get_str("category"))
      {
        learned.absorb_attribute(tool, key, value, category);
      }
    }
    Ok(learned)
  }

  /// Rewrite `args` with everything learned for `tool.action`. Never fails:
  /// when the store cannot be read the arguments are returned unchanged.
  pub async fn apply_to_arguments(&self, tool: &str, action: &str, args: Fields) -> Fields {
    match self.learned_arguments(tool, action).await {
      Ok(learned) => learned.apply(args),
      Err(error) => {
        tracing::warn!(%error, tool, action, "could not load learned arguments");
        args
      }
    }
  }
}

//! Retention pruning.
//!
//! Deletes by timestamp and confidence predicates only, so a prune can run
//! alongside normal traffic: rows written after the cutoff are never touched.

use chrono::{DateTime, Duration, Utc};
use hindsight_core::memory::{PruneReport, RetentionPolicy};

use crate::{Result, SqliteStore, encode::encode_dt, fts};

fn cutoff(now: DateTime<Utc>, days: u32) -> String {
  encode_dt(now - Duration::days(i64::from(days)))
}

impl SqliteStore {
  pub(crate) async fn prune_with(
    &self,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
  ) -> Result<PruneReport> {
    let exchange_cutoff = cutoff(now, policy.exchange_days);
    let action_cutoff = cutoff(now, policy.action_days);
    let error_cutoff = cutoff(now, policy.error_days);
    let correction_cutoff = cutoff(now, policy.correction_days);

    let report = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exchanges = if policy.keep_high_value {
          tx.execute(
            "DELETE FROM exchanges WHERE created_at < ?1 AND feedback_id IS NULL",
            [&exchange_cutoff],
          )?
        } else {
          tx.execute("DELETE FROM exchanges WHERE created_at < ?1", [&exchange_cutoff])?
        };

        let actions = tx.execute("DELETE FROM actions WHERE created_at < ?1", [&action_cutoff])?;

        let error_patterns = tx.execute(
          "DELETE FROM error_patterns WHERE last_occurred < ?1 AND solution IS NULL",
          [&error_cutoff],
        )?;

        let corrections = tx.execute(
          "DELETE FROM corrections
           WHERE confidence < ?1 AND use_count = 0 AND created_at < ?2",
          rusqlite::params![policy.correction_floor, correction_cutoff],
        )?;

        let index_entries = fts::remove_orphans(&tx)?;
        tx.commit()?;

        Ok(PruneReport { exchanges, actions, error_patterns, corrections, index_entries })
      })
      .await?;

    // VACUUM cannot run inside a transaction.
    self
      .conn
      .call(|conn| {
        conn.execute_batch("VACUUM")?;
        Ok(())
      })
      .await?;

    tracing::info!(
      exchanges = report.exchanges,
      actions = report.actions,
      error_patterns = report.error_patterns,
      corrections = report.corrections,
      index_entries = report.index_entries,
      "pruned memory store"
    );
    Ok(report)
  }
}

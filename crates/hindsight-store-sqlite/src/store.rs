//! [`SqliteStore`], the SQLite implementation of [`MemoryStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::Value as SqlValue};
use serde::Serialize;

use hindsight_core::{
  Error as CoreError,
  memory::{
    Correction, CorrectionWrite, DecayPolicy, ErrorPattern, NewCorrection, NewErrorPattern,
    NewFeedback, PruneReport, REINFORCE_STEP, RetentionPolicy, ToolOutcome, ToolUsagePattern,
  },
  record::{Fields, Filter, Query, Record, to_fields},
  search::{SearchHit, SearchQuery},
  store::MemoryStore,
  table::{Column, Table},
};

use crate::{
  Result,
  encode::{encode_dt, from_sql, to_sql},
  fts,
  schema::SCHEMA,
};

/// Longest error message kept on an error pattern.
const MAX_ERROR_MESSAGE: usize = 500;

// ─── SQL building ────────────────────────────────────────────────────────────

/// Render `filter` as a `WHERE` clause with positional parameters.
///
/// Column names come from the validated static column list, never from the
/// caller, so interpolating them is safe; values are always bound.
pub(crate) fn where_clause(table: Table, filter: &Filter) -> Result<(String, Vec<SqlValue>)> {
  if filter.is_empty() {
    return Ok((String::new(), vec![]));
  }

  let mut conds = Vec::with_capacity(filter.conditions.len());
  let mut params = vec![];
  for c in &filter.conditions {
    let column = table.column(&c.column)?;
    if c.op.is_binary() {
      params.push(to_sql(column, &c.value)?);
      conds.push(format!("{} {} ?", column.name, c.op.sql()));
    } else {
      conds.push(format!("{} {}", column.name, c.op.sql()));
    }
  }
  Ok((format!(" WHERE {}", conds.join(" AND ")), params))
}

/// `id, col1, col2, ...` for a table.
pub(crate) fn select_list(table: Table) -> String {
  std::iter::once("id")
    .chain(table.columns().iter().map(|c| c.name))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Read one row selected with [`select_list`].
pub(crate) fn read_record(row: &rusqlite::Row<'_>, columns: &[Column]) -> rusqlite::Result<Record> {
  let id: i64 = row.get(0)?;
  let mut fields = Fields::new();
  for (i, column) in columns.iter().enumerate() {
    let value = from_sql(column.kind, row.get_ref(i + 1)?);
    if !value.is_null() {
      fields.insert(column.name.to_owned(), value);
    }
  }
  Ok(Record { id, fields })
}

/// Bind every field of `fields` for an insert statement; `verb` is
/// `INSERT` or `INSERT OR IGNORE`.
pub(crate) fn insert_parts(
  verb: &str,
  table: Table,
  fields: &Fields,
) -> Result<(String, Vec<SqlValue>)> {
  let mut names = Vec::with_capacity(fields.len());
  let mut params = Vec::with_capacity(fields.len());
  for (name, value) in fields {
    let column = table.column(name)?;
    names.push(column.name);
    params.push(to_sql(column, value)?);
  }
  let placeholders = vec!["?"; names.len()].join(", ");
  Ok((
    format!("{verb} INTO {} ({}) VALUES ({placeholders})", table.as_str(), names.join(", ")),
    params,
  ))
}

/// Fill in `created_at` / `updated_at` when the caller left them out.
pub(crate) fn stamp_insert(table: Table, fields: &mut Fields, now: DateTime<Utc>) {
  let now = encode_dt(now);
  if !fields.contains_key("created_at") {
    fields.insert("created_at".into(), now.clone().into());
  }
  if table.has_updated_at() && !fields.contains_key("updated_at") {
    fields.insert("updated_at".into(), now.into());
  }
}

fn truncate(s: &str, max: usize) -> String { s.chars().take(max).collect() }

// ─── Store ───────────────────────────────────────────────────────────────────

/// A hindsight memory store backed by a single SQLite file plus its FTS5
/// mirror.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// Row counts per table plus the size of the search index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
  pub tables:        Vec<(Table, u64)>,
  pub index_entries: u64,
}

impl StoreStats {
  pub fn rows(&self, table: Table) -> u64 {
    self.tables.iter().find(|(t, _)| *t == table).map_or(0, |(_, n)| *n)
  }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Close the underlying connection, flushing the WAL.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  pub async fn stats(&self) -> Result<StoreStats> {
    let tables: Vec<Table> = Table::all().collect();
    self
      .conn
      .call(move |conn| {
        let mut counts = Vec::with_capacity(tables.len());
        for table in tables {
          let n: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.as_str()),
            [],
            |r| r.get(0),
          )?;
          counts.push((table, n as u64));
        }
        let index_entries: i64 =
          conn.query_row("SELECT COUNT(*) FROM memory_fts", [], |r| r.get(0))?;
        Ok(StoreStats { tables: counts, index_entries: index_entries as u64 })
      })
      .await
      .map_err(Into::into)
  }

  /// Run a `SELECT` over `table` with a pre-rendered tail (`WHERE ...`,
  /// `ORDER BY ...`) and decode each row.
  pub(crate) async fn select_where(
    &self,
    table: Table,
    tail: String,
    params: Vec<SqlValue>,
  ) -> Result<Vec<Record>> {
    let sql = format!("SELECT {} FROM {}{tail}", select_list(table), table.as_str());
    let columns = table.columns();

    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), |row| read_record(row, columns))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Into::into)
  }

  async fn select_one(&self, table: Table, id: i64) -> Result<Option<Record>> {
    let mut rows = self
      .select_where(table, " WHERE id = ?".into(), vec![SqlValue::Integer(id)])
      .await?;
    Ok(rows.pop())
  }

  async fn select_decoded<T: serde::de::DeserializeOwned>(
    &self,
    table: Table,
    id: i64,
  ) -> Result<T> {
    let record = self
      .select_one(table, id)
      .await?
      .ok_or(tokio_rusqlite::Error::Rusqlite(rusqlite::Error::QueryReturnedNoRows))?;
    Ok(record.decode()?)
  }

  /// Run a single-row upsert (`... RETURNING id`) and keep the row's index
  /// entry in step, all in one transaction.
  async fn upsert_returning_id(
    &self,
    table: Table,
    sql: &'static str,
    params: Vec<SqlValue>,
  ) -> Result<i64> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let id: i64 =
          tx.query_row(sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?;
        if table.is_indexable() {
          fts::reindex_rows(&tx, table, &[id])?;
        }
        tx.commit()?;
        Ok(id)
      })
      .await
      .map_err(Into::into)
  }
}

// ─── MemoryStore impl ────────────────────────────────────────────────────────

impl MemoryStore for SqliteStore {
  type Error = crate::Error;

  // ── Generic rows ──────────────────────────────────────────────────────────

  async fn insert(&self, table: Table, mut fields: Fields) -> Result<i64> {
    table.validate_fields(&fields)?;
    stamp_insert(table, &mut fields, Utc::now());

    let document = table.index_document(&fields);
    let (sql, params) = insert_parts("INSERT", table, &fields)?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
        let id = tx.last_insert_rowid();
        if let Some(doc) = document {
          fts::insert_entry(&tx, table, id, &doc)?;
        }
        tx.commit()?;
        Ok(id)
      })
      .await
      .map_err(Into::into)
  }

  async fn update(&self, table: Table, mut fields: Fields, filter: Filter) -> Result<usize> {
    if table.is_append_only() {
      return Err(CoreError::AppendOnly(table).into());
    }
    table.validate_fields(&fields)?;
    filter.validate(table)?;

    if let Some(name) = fields
      .keys()
      .find(|k| *k == "id" || table.sole_mutable_column().is_some_and(|m| m != k.as_str()))
    {
      return Err(CoreError::ImmutableColumn { table, column: name.clone() }.into());
    }
    if fields.is_empty() {
      return Ok(0);
    }
    if table.has_updated_at() && !fields.contains_key("updated_at") {
      fields.insert("updated_at".into(), encode_dt(Utc::now()).into());
    }

    let mut sets = Vec::with_capacity(fields.len());
    let mut params = Vec::with_capacity(fields.len());
    for (name, value) in &fields {
      let column = table.column(name)?;
      sets.push(format!("{} = ?", column.name));
      params.push(to_sql(column, value)?);
    }
    let (where_sql, where_params) = where_clause(table, &filter)?;
    let update_sql = format!("UPDATE {} SET {}{where_sql}", table.as_str(), sets.join(", "));
    let ids_sql = format!("SELECT id FROM {}{where_sql}", table.as_str());
    params.extend(where_params.iter().cloned());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let ids: Vec<i64> = if table.is_indexable() {
          let mut stmt = tx.prepare(&ids_sql)?;
          stmt
            .query_map(rusqlite::params_from_iter(where_params.iter()), |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?
        } else {
          vec![]
        };
        let changed = tx.execute(&update_sql, rusqlite::params_from_iter(params.iter()))?;
        fts::reindex_rows(&tx, table, &ids)?;
        tx.commit()?;
        Ok(changed)
      })
      .await
      .map_err(Into::into)
  }

  async fn delete(&self, table: Table, filter: Filter) -> Result<usize> {
    let (where_sql, params) = where_clause(table, &filter)?;
    let ids_sql = format!("SELECT id FROM {}{where_sql}", table.as_str());
    let delete_sql = format!("DELETE FROM {}{where_sql}", table.as_str());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if table.is_indexable() {
          let ids: Vec<i64> = {
            let mut stmt = tx.prepare(&ids_sql)?;
            stmt
              .query_map(rusqlite::params_from_iter(params.iter()), |r| r.get(0))?
              .collect::<rusqlite::Result<_>>()?
          };
          fts::remove_entries(&tx, table, &ids)?;
        }
        let deleted = tx.execute(&delete_sql, rusqlite::params_from_iter(params.iter()))?;
        tx.commit()?;
        Ok(deleted)
      })
      .await
      .map_err(Into::into)
  }

  async fn select(&self, table: Table, query: Query) -> Result<Vec<Record>> {
    query.validate(table)?;
    let (mut tail, mut params) = where_clause(table, &query.filter)?;

    match &query.order {
      Some(order) => {
        let column = table.column(&order.column)?;
        let dir = if order.descending { "DESC" } else { "ASC" };
        tail.push_str(&format!(" ORDER BY {} {dir}, id ASC", column.name));
      }
      None => tail.push_str(" ORDER BY id ASC"),
    }
    if query.limit.is_some() || query.offset.is_some() {
      tail.push_str(" LIMIT ? OFFSET ?");
      params.push(SqlValue::Integer(query.limit.map_or(-1, |l| l as i64)));
      params.push(SqlValue::Integer(query.offset.unwrap_or(0) as i64));
    }

    self.select_where(table, tail, params).await
  }

  async fn count(&self, table: Table, filter: Filter) -> Result<u64> {
    let (where_sql, params) = where_clause(table, &filter)?;
    let sql = format!("SELECT COUNT(*) FROM {}{where_sql}", table.as_str());

    let n: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&sql, rusqlite::params_from_iter(params.iter()), |r| r.get(0))?)
      })
      .await?;
    Ok(n as u64)
  }

  async fn search(&self, query: SearchQuery) -> Result<Vec<SearchHit>> {
    fts::search(&self.conn, query).await
  }

  // ── Upserts ───────────────────────────────────────────────────────────────

  async fn upsert_topic(&self, name: String) -> Result<i64> {
    let name = name.trim().to_lowercase();
    let now = encode_dt(Utc::now());
    self
      .upsert_returning_id(
        Table::Topics,
        "INSERT INTO topics
           (name, mention_count, first_discussed, last_discussed, created_at, updated_at)
         VALUES (?1, 1, ?2, ?2, ?2, ?2)
         ON CONFLICT(name) DO UPDATE SET
           mention_count  = mention_count + 1,
           last_discussed = excluded.last_discussed,
           updated_at     = excluded.updated_at
         RETURNING id",
        vec![SqlValue::Text(name), SqlValue::Text(now)],
      )
      .await
  }

  async fn upsert_location(&self, name: String, path: String, kind: Option<String>) -> Result<i64> {
    let now = encode_dt(Utc::now());
    self
      .upsert_returning_id(
        Table::Locations,
        "INSERT INTO locations (name, path, kind, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(name, path) DO UPDATE SET
           kind       = COALESCE(excluded.kind, kind),
           updated_at = excluded.updated_at
         RETURNING id",
        vec![
          SqlValue::Text(name),
          SqlValue::Text(path),
          kind.map_or(SqlValue::Null, SqlValue::Text),
          SqlValue::Text(now),
        ],
      )
      .await
  }

  async fn upsert_user_attribute(
    &self,
    key: String,
    value: String,
    category: Option<String>,
  ) -> Result<i64> {
    let now = encode_dt(Utc::now());
    self
      .upsert_returning_id(
        Table::UserInfo,
        "INSERT INTO user_info (key, value, category, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(key) DO UPDATE SET
           value      = excluded.value,
           category   = COALESCE(excluded.category, category),
           updated_at = excluded.updated_at
         RETURNING id",
        vec![
          SqlValue::Text(key),
          SqlValue::Text(value),
          category.map_or(SqlValue::Null, SqlValue::Text),
          SqlValue::Text(now),
        ],
      )
      .await
  }

  // ── Feedback ──────────────────────────────────────────────────────────────

  async fn log_feedback(&self, feedback: NewFeedback) -> Result<i64> {
    let fields = to_fields(&feedback)?;
    self.insert(Table::Feedback, fields).await
  }

  async fn mark_feedback_applied(&self, id: i64) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute("UPDATE feedback SET applied = 1 WHERE id = ?1", [id])?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Corrections ───────────────────────────────────────────────────────────

  async fn add_or_reinforce_correction(&self, c: NewCorrection) -> Result<CorrectionWrite> {
    let trigger = c.trigger_pattern.trim().to_lowercase();
    let now = encode_dt(Utc::now());
    let is_permanent = c.scope.is_permanent();
    let session = c.scope.session_id().map(str::to_owned);

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing: Option<i64> = tx
          .query_row(
            "SELECT id FROM corrections
             WHERE trigger_pattern = ?1
               AND is_permanent = ?2
               AND COALESCE(session_id, '') = COALESCE(?3, '')
             ORDER BY id LIMIT 1",
            rusqlite::params![trigger, is_permanent, session],
            |r| r.get(0),
          )
          .optional()?;

        let write = match existing {
          Some(id) => {
            reinforce(&tx, id, &c, &now)?;
            CorrectionWrite { id, reinforced: true }
          }
          None => {
            tx.execute(
              "INSERT INTO corrections (
                 trigger_pattern, wrong_behavior, correct_behavior,
                 tool_name, action_name, argument_name,
                 confidence, use_count, session_id, is_permanent,
                 created_at, updated_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1.0, 0, ?7, ?8, ?9, ?9)",
              rusqlite::params![
                trigger,
                c.wrong_behavior,
                c.correct_behavior,
                c.tool_name,
                c.action_name,
                c.argument_name,
                session,
                is_permanent,
                now,
              ],
            )?;
            CorrectionWrite { id: tx.last_insert_rowid(), reinforced: false }
          }
        };
        tx.commit()?;
        Ok(write)
      })
      .await
      .map_err(Into::into)
  }

  async fn reinforce_correction(&self, id: i64, correction: NewCorrection) -> Result<()> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        reinforce(conn, id, &correction, &now)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn mark_correction_used(&self, id: i64) -> Result<()> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE corrections
           SET use_count = use_count + 1, last_used = ?1, updated_at = ?1
           WHERE id = ?2",
          rusqlite::params![now, id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn decay_stale_corrections(&self, policy: DecayPolicy, now: DateTime<Utc>) -> Result<usize> {
    let cutoff = encode_dt(now - policy.stale_after);
    let now = encode_dt(now);

    let decayed = self
      .conn
      .call(move |conn| {
        // The latest of creation, last use and last decay marks the start of
        // the current idle window, so each window decays a row at most once.
        Ok(conn.execute(
          "UPDATE corrections
           SET confidence = MAX(confidence * ?1, ?2),
               decayed_at = ?3
           WHERE confidence > ?4
             AND MAX(
                   created_at,
                   COALESCE(last_used, created_at),
                   COALESCE(decayed_at, created_at)
                 ) < ?5",
          rusqlite::params![policy.factor, policy.floor, now, policy.min_confidence, cutoff],
        )?)
      })
      .await?;

    if decayed > 0 {
      tracing::debug!(decayed, "decayed stale corrections");
    }
    Ok(decayed)
  }

  async fn relevant_corrections(
    &self,
    policy: DecayPolicy,
    session: Option<String>,
  ) -> Result<Vec<Correction>> {
    let records = self
      .select_where(
        Table::Corrections,
        " WHERE confidence >= ?1 AND (is_permanent = 1 OR (?2 IS NOT NULL AND session_id = ?2))
          ORDER BY id ASC"
          .into(),
        vec![
          SqlValue::Real(policy.min_confidence),
          session.map_or(SqlValue::Null, SqlValue::Text),
        ],
      )
      .await?;

    records.iter().map(|r| Ok(r.decode()?)).collect()
  }

  async fn purge_session_corrections(&self, session: String) -> Result<usize> {
    let purged = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM corrections WHERE session_id = ?1 AND is_permanent = 0",
          [session],
        )?)
      })
      .await?;
    Ok(purged)
  }

  // ── Error & tool patterns ─────────────────────────────────────────────────

  async fn log_error_pattern(&self, error: NewErrorPattern) -> Result<ErrorPattern> {
    let now = encode_dt(Utc::now());
    let id = self
      .upsert_returning_id(
        Table::ErrorPatterns,
        "INSERT INTO error_patterns (
           tool_name, action_name, error_type, error_message,
           occurrence_count, last_occurred, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5, ?5)
         ON CONFLICT(tool_name, action_name, error_type) DO UPDATE SET
           occurrence_count = occurrence_count + 1,
           error_message    = excluded.error_message,
           last_occurred    = excluded.last_occurred,
           updated_at       = excluded.updated_at
         RETURNING id",
        vec![
          SqlValue::Text(error.tool_name),
          SqlValue::Text(error.action_name),
          SqlValue::Text(error.error_type),
          SqlValue::Text(truncate(&error.error_message, MAX_ERROR_MESSAGE)),
          SqlValue::Text(now),
        ],
      )
      .await?;
    self.select_decoded(Table::ErrorPatterns, id).await
  }

  async fn record_error_solution(
    &self,
    tool: String,
    action: String,
    error_type: String,
    solution: String,
  ) -> Result<()> {
    let now = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO error_patterns (
             tool_name, action_name, error_type, occurrence_count, solution,
             last_occurred, created_at, updated_at
           ) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5, ?5)
           ON CONFLICT(tool_name, action_name, error_type) DO UPDATE SET
             solution   = excluded.solution,
             updated_at = excluded.updated_at",
          rusqlite::params![tool, action, error_type, solution, now],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn known_solution(
    &self,
    tool: String,
    action: String,
    error_type: String,
  ) -> Result<Option<String>> {
    let solution = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT solution FROM error_patterns
             WHERE tool_name = ?1 AND action_name = ?2 AND error_type = ?3
               AND solution IS NOT NULL",
            rusqlite::params![tool, action, error_type],
            |r| r.get::<_, String>(0),
          )
          .optional()?)
      })
      .await?;
    Ok(solution)
  }

  async fn update_tool_usage_pattern(&self, outcome: ToolOutcome) -> Result<ToolUsagePattern> {
    let now = encode_dt(Utc::now());
    let duration = outcome.duration_ms.map(|d| d as f64);
    let success = i64::from(outcome.success);

    let id = self
      .conn
      .call(move |conn| {
        // Every expression on the right of `SET` sees the pre-update row.
        Ok(conn.query_row(
          "INSERT INTO tool_patterns (
             tool_name, action_name, use_count, success_count, success_rate,
             avg_duration_ms, last_used, created_at, updated_at
           ) VALUES (?1, ?2, 1, ?3, CAST(?3 AS REAL), COALESCE(?4, 0.0), ?5, ?5, ?5)
           ON CONFLICT(tool_name, action_name) DO UPDATE SET
             use_count       = use_count + 1,
             success_count   = success_count + ?3,
             success_rate    = CAST(success_count + ?3 AS REAL) / (use_count + 1),
             avg_duration_ms = CASE
                                 WHEN ?4 IS NULL THEN avg_duration_ms
                                 ELSE (avg_duration_ms * use_count + ?4) / (use_count + 1)
                               END,
             last_used       = excluded.last_used,
             updated_at      = excluded.updated_at
           RETURNING id",
          rusqlite::params![outcome.tool_name, outcome.action_name, success, duration, now],
          |r| r.get::<_, i64>(0),
        )?)
      })
      .await?;

    self.select_decoded(Table::ToolPatterns, id).await
  }

  // ── Retention ─────────────────────────────────────────────────────────────

  async fn prune(&self, policy: RetentionPolicy, now: DateTime<Utc>) -> Result<PruneReport> {
    self.prune_with(policy, now).await
  }
}

/// Bump a correction's confidence by one step and overwrite its behavior.
fn reinforce(
  conn: &rusqlite::Connection,
  id: i64,
  c: &NewCorrection,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE corrections
     SET confidence       = MIN(1.0, confidence + ?1),
         correct_behavior = ?2,
         wrong_behavior   = COALESCE(?3, wrong_behavior),
         tool_name        = COALESCE(?4, tool_name),
         action_name      = COALESCE(?5, action_name),
         argument_name    = COALESCE(?6, argument_name),
         updated_at       = ?7
     WHERE id = ?8",
    rusqlite::params![
      REINFORCE_STEP,
      c.correct_behavior,
      c.wrong_behavior,
      c.tool_name,
      c.action_name,
      c.argument_name,
      now,
      id,
    ],
  )?;
  Ok(())
}

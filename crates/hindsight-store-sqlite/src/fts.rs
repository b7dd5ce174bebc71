//! Full-text index maintenance and ranked search over `memory_fts`.
//!
//! The index holds at most one entry per indexable row, tagged with the
//! source table and row id. Entries are written in the same transaction as
//! the row they mirror; the whole index can be rebuilt from primary tables.

use hindsight_core::{
  Table,
  record::Fields,
  search::{SearchHit, SearchQuery},
};
use rusqlite::{Connection, OptionalExtension as _, types::Value as SqlValue};
use serde_json::Value;

use crate::{Result, SqliteStore};

// ─── Maintenance (inside a caller's transaction) ─────────────────────────────

pub(crate) fn insert_entry(
  conn: &Connection,
  table: Table,
  id: i64,
  document: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO memory_fts (content, source, source_id) VALUES (?1, ?2, ?3)",
    rusqlite::params![document, table.as_str(), id],
  )?;
  Ok(())
}

pub(crate) fn remove_entries(conn: &Connection, table: Table, ids: &[i64]) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare("DELETE FROM memory_fts WHERE source = ?1 AND source_id = ?2")?;
  for id in ids {
    stmt.execute(rusqlite::params![table.as_str(), id])?;
  }
  Ok(())
}

/// Read the indexed columns of one row and build its document.
fn row_document(conn: &Connection, table: Table, id: i64) -> rusqlite::Result<Option<String>> {
  let columns = table.index_columns();
  let sql = format!("SELECT {} FROM {} WHERE id = ?1", columns.join(", "), table.as_str());
  let fields = conn
    .query_row(&sql, [id], |row| text_fields(row, columns, 0))
    .optional()?;
  Ok(fields.and_then(|f| table.index_document(&f)))
}

fn text_fields(
  row: &rusqlite::Row<'_>,
  columns: &[&'static str],
  offset: usize,
) -> rusqlite::Result<Fields> {
  let mut fields = Fields::new();
  for (i, name) in columns.iter().enumerate() {
    if let Some(text) = row.get::<_, Option<String>>(i + offset)? {
      fields.insert((*name).to_owned(), Value::String(text));
    }
  }
  Ok(fields)
}

/// Replace the index entries of `ids` with freshly derived documents.
pub(crate) fn reindex_rows(conn: &Connection, table: Table, ids: &[i64]) -> rusqlite::Result<()> {
  if !table.is_indexable() {
    return Ok(());
  }
  remove_entries(conn, table, ids)?;
  for &id in ids {
    if let Some(doc) = row_document(conn, table, id)? {
      insert_entry(conn, table, id, &doc)?;
    }
  }
  Ok(())
}

/// Drop entries whose source row no longer exists.
pub(crate) fn remove_orphans(conn: &Connection) -> rusqlite::Result<usize> {
  let indexable: Vec<Table> = Table::all().filter(|t| t.is_indexable()).collect();
  let mut removed = 0;
  for table in &indexable {
    removed += conn.execute(
      &format!(
        "DELETE FROM memory_fts
         WHERE source = ?1 AND source_id NOT IN (SELECT id FROM {})",
        table.as_str()
      ),
      [table.as_str()],
    )?;
  }
  let known = indexable.iter().map(|t| format!("'{}'", t.as_str())).collect::<Vec<_>>().join(", ");
  removed += conn.execute(&format!("DELETE FROM memory_fts WHERE source NOT IN ({known})"), [])?;
  Ok(removed)
}

fn rebuild(conn: &Connection) -> rusqlite::Result<usize> {
  conn.execute("DELETE FROM memory_fts", [])?;
  let mut indexed = 0;
  for table in Table::all().filter(|t| t.is_indexable()) {
    let columns = table.index_columns();
    let sql = format!("SELECT id, {} FROM {}", columns.join(", "), table.as_str());
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map([], |row| Ok((row.get::<_, i64>(0)?, text_fields(row, columns, 1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    for (id, fields) in rows {
      if let Some(doc) = table.index_document(&fields) {
        insert_entry(conn, table, id, &doc)?;
        indexed += 1;
      }
    }
  }
  Ok(indexed)
}

// ─── Rebuild ─────────────────────────────────────────────────────────────────

impl SqliteStore {
  /// Discard the index and rebuild it from the primary tables. Returns the
  /// number of entries written.
  pub async fn rebuild_index(&self) -> Result<usize> {
    let indexed = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let indexed = rebuild(&tx)?;
        tx.commit()?;
        Ok(indexed)
      })
      .await?;
    tracing::info!(indexed, "rebuilt full-text index");
    Ok(indexed)
  }

  /// Rebuild the index only when it is empty while indexable tables are not.
  /// Returns `Some(entries)` when a rebuild ran.
  pub async fn rebuild_index_if_empty(&self) -> Result<Option<usize>> {
    let sources: Vec<Table> = Table::all().filter(|t| t.is_indexable()).collect();
    let needed = self
      .conn
      .call(move |conn| {
        let entries: i64 = conn.query_row("SELECT COUNT(*) FROM memory_fts", [], |r| r.get(0))?;
        if entries > 0 {
          return Ok(false);
        }
        for table in sources {
          let any: Option<i64> = conn
            .query_row(&format!("SELECT 1 FROM {} LIMIT 1", table.as_str()), [], |r| r.get(0))
            .optional()?;
          if any.is_some() {
            return Ok(true);
          }
        }
        Ok(false)
      })
      .await?;

    if !needed {
      return Ok(None);
    }
    self.rebuild_index().await.map(Some)
  }
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Split free text into index terms.
fn terms(text: &str) -> Vec<String> {
  text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|t| !t.is_empty())
    .map(str::to_lowercase)
    .collect()
}

/// Every term must appear; `prefix` turns each into a prefix query.
fn match_expression(terms: &[String], prefix: bool) -> String {
  let star = if prefix { "*" } else { "" };
  terms.iter().map(|t| format!("\"{t}\"{star}")).collect::<Vec<_>>().join(" ")
}

type RawHit = (String, String, i64, f64);

fn match_hits(
  conn: &Connection,
  expression: &str,
  source: Option<&str>,
  limit: i64,
) -> rusqlite::Result<Vec<RawHit>> {
  let mut stmt = conn.prepare(
    "SELECT content, source, source_id, bm25(memory_fts)
     FROM memory_fts
     WHERE memory_fts MATCH ?1
       AND (?2 IS NULL OR source = ?2)
     ORDER BY bm25(memory_fts)
     LIMIT ?3",
  )?;
  stmt
    .query_map(rusqlite::params![expression, source, limit], |row| {
      // bm25() is lower-is-better; flip it so callers sort descending.
      Ok((row.get(0)?, row.get(1)?, row.get(2)?, -row.get::<_, f64>(3)?))
    })?
    .collect()
}

/// Substring scan over the primary tables, for text the tokenizer cannot
/// match (partial words, punctuation).
fn scan_hits(
  conn: &Connection,
  needle: &str,
  source: Option<Table>,
  limit: i64,
) -> rusqlite::Result<Vec<RawHit>> {
  let escaped = needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
  let pattern = SqlValue::Text(format!("%{escaped}%"));
  let mut hits = vec![];

  for table in Table::all().filter(|t| t.is_indexable() && source.is_none_or(|s| s == *t)) {
    let remaining = limit - hits.len() as i64;
    if remaining <= 0 {
      break;
    }
    let columns = table.index_columns();
    let conds = columns
      .iter()
      .map(|c| format!("{c} LIKE ?1 ESCAPE '\\'"))
      .collect::<Vec<_>>()
      .join(" OR ");
    let sql = format!(
      "SELECT id, {} FROM {} WHERE {conds} ORDER BY id LIMIT ?2",
      columns.join(", "),
      table.as_str()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params![pattern, remaining], |row| {
        Ok((row.get::<_, i64>(0)?, text_fields(row, columns, 1)?))
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    for (id, fields) in rows {
      if let Some(doc) = table.index_document(&fields) {
        hits.push((doc, table.as_str().to_owned(), id, 0.0));
      }
    }
  }
  Ok(hits)
}

pub(crate) async fn search(
  conn: &tokio_rusqlite::Connection,
  query: SearchQuery,
) -> Result<Vec<SearchHit>> {
  let needle = query.text.trim().to_owned();
  if needle.is_empty() || query.limit == 0 {
    return Ok(vec![]);
  }
  let terms = terms(&needle);
  let source = query.source;
  let limit = query.limit as i64;

  let raw = conn
    .call(move |conn| {
      let source_name = source.map(Table::as_str);
      if !terms.is_empty() {
        let hits = match_hits(conn, &match_expression(&terms, false), source_name, limit)?;
        if !hits.is_empty() {
          return Ok(hits);
        }
        let hits = match_hits(conn, &match_expression(&terms, true), source_name, limit)?;
        if !hits.is_empty() {
          return Ok(hits);
        }
      }
      Ok(scan_hits(conn, &needle, source, limit)?)
    })
    .await?;

  Ok(
    raw
      .into_iter()
      .filter_map(|(content, source, source_id, rank)| match Table::parse(&source) {
        Ok(source) => Some(SearchHit { content, source, source_id, rank }),
        Err(_) => {
          tracing::warn!(%source, source_id, "skipping index entry with unknown source");
          None
        }
      })
      .collect(),
  )
}

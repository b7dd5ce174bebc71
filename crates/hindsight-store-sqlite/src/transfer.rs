//! JSON export and import.
//!
//! Export dumps every primary table as human-readable JSON. Import accepts
//! that document (rows keep their ids, so importing twice is a no-op) or the
//! legacy flat memory file, where de-duplication happens on natural keys.

use std::{collections::BTreeMap, path::Path};

use chrono::Utc;
use hindsight_core::{
  Filter, Query, Table,
  record::{Fields, fields},
  store::MemoryStore,
};
use rusqlite::types::Value as SqlValue;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
  Error, Result, SqliteStore,
  encode::{decode_dt_lenient, encode_dt},
  fts,
  store::{insert_parts, stamp_insert},
};

pub const EXPORT_FORMAT: &str = "hindsight-export";
const EXPORT_VERSION: u32 = 1;

/// Which document shape an import recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportFormat {
  Export,
  Legacy,
}

/// Rows newly written by an import, per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
  pub format: ImportFormat,
  pub rows:   BTreeMap<Table, usize>,
}

impl ImportReport {
  fn new(format: ImportFormat) -> Self { Self { format, rows: BTreeMap::new() } }

  fn bump(&mut self, table: Table) { *self.rows.entry(table).or_default() += 1; }

  pub fn total(&self) -> usize { self.rows.values().sum() }
}

/// One prepared `INSERT OR IGNORE` plus the index document of its row.
struct PreparedRow {
  table:    Table,
  sql:      String,
  params:   Vec<SqlValue>,
  document: Option<String>,
}

// ─── Export ──────────────────────────────────────────────────────────────────

impl SqliteStore {
  /// Build the export document for every table.
  pub async fn export_document(&self) -> Result<Value> {
    let mut tables = serde_json::Map::new();
    for table in Table::all() {
      let rows = self.select(table, Query::all()).await?;
      tables.insert(
        table.as_str().to_owned(),
        Value::Array(rows.iter().map(|r| r.to_json()).collect()),
      );
    }
    Ok(json!({
      "format":      EXPORT_FORMAT,
      "version":     EXPORT_VERSION,
      "exported_at": encode_dt(Utc::now()),
      "tables":      tables,
    }))
  }

  pub async fn export_json(&self, path: impl AsRef<Path>) -> Result<()> {
    let document = self.export_document().await?;
    tokio::fs::write(path.as_ref(), serde_json::to_vec_pretty(&document)?).await?;
    tracing::info!(path = %path.as_ref().display(), "exported memory store");
    Ok(())
  }

  // ─── Import ────────────────────────────────────────────────────────────────

  /// Import a file written by [`export_json`](Self::export_json) or a legacy
  /// memory file. A missing file imports nothing.
  pub async fn import_json(&self, path: impl AsRef<Path>) -> Result<ImportReport> {
    let path = path.as_ref();
    let bytes = match tokio::fs::read(path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        tracing::info!(path = %path.display(), "no import file found");
        return Ok(ImportReport::new(ImportFormat::Legacy));
      }
      Err(e) => return Err(e.into()),
    };
    let document: Value = serde_json::from_slice(&bytes)?;
    let report = self.import_document(document).await?;
    tracing::info!(path = %path.display(), rows = report.total(), format = ?report.format, "imported memory");
    Ok(report)
  }

  pub async fn import_document(&self, document: Value) -> Result<ImportReport> {
    let Value::Object(map) = document else {
      return Err(Error::UnknownFormat("expected a JSON object".into()));
    };

    match map.get("format").and_then(Value::as_str) {
      Some(EXPORT_FORMAT) => self.import_export(map).await,
      Some(other) => Err(Error::UnknownFormat(other.to_owned())),
      None if LEGACY_KEYS.iter().any(|k| map.contains_key(*k)) => self.import_legacy(map).await,
      None => Err(Error::UnknownFormat("no recognised sections".into())),
    }
  }

  async fn import_export(&self, mut map: Fields) -> Result<ImportReport> {
    let Some(Value::Object(mut tables)) = map.remove("tables") else {
      return Err(Error::UnknownFormat("missing `tables`".into()));
    };

    let now = Utc::now();
    let mut prepared = vec![];
    for table in Table::all() {
      let Some(Value::Array(rows)) = tables.remove(table.as_str()) else {
        continue;
      };
      for row in rows {
        let mut row = fields(row);
        stamp_insert(table, &mut row, now);
        let document = table.index_document(&row);
        let (sql, params) = insert_parts("INSERT OR IGNORE", table, &row)?;
        prepared.push(PreparedRow { table, sql, params, document });
      }
    }
    for name in tables.keys() {
      tracing::warn!(table = %name, "skipping unknown table in import");
    }

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = vec![];
        for row in prepared {
          if tx.execute(&row.sql, rusqlite::params_from_iter(row.params.iter()))? == 0 {
            continue;
          }
          let id = tx.last_insert_rowid();
          if let Some(doc) = &row.document {
            fts::insert_entry(&tx, row.table, id, doc)?;
          }
          written.push(row.table);
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    let mut report = ImportReport::new(ImportFormat::Export);
    for table in written {
      report.bump(table);
    }
    Ok(report)
  }
}

// ─── Legacy memory file ──────────────────────────────────────────────────────

const LEGACY_KEYS: &[&str] = &[
  "user_info",
  "facts",
  "discovered_locations",
  "scripts_created",
  "topics_discussed",
  "important_dates",
  "action_log",
];

fn as_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

/// Normalise a loose timestamp, falling back to now.
fn timestamp(value: Option<&Value>) -> String {
  value
    .and_then(Value::as_str)
    .and_then(|s| decode_dt_lenient(s).ok())
    .map_or_else(|| encode_dt(Utc::now()), encode_dt)
}

/// `"app_path_chrome"` / `"C:\\...\\chrome.exe"` style entries.
fn legacy_location(entry: &Value) -> Option<(String, String)> {
  let key = entry.get("key").and_then(Value::as_str)?;
  let value = entry.get("value").and_then(Value::as_str)?;
  let name = key.replace("app_path_", "").replace("app_", "");
  let path = if let Some((_, path)) = value.rsplit_once(" at ") {
    path
  } else if let Some((_, path)) = value.rsplit_once(": ") {
    path
  } else {
    value
  };
  let path = path.trim();
  (!name.is_empty() && !path.is_empty()).then(|| (name, path.to_owned()))
}

/// A parsed `"[2025-01-02 10:58:18] tool.action (args) -> status"` line.
#[derive(Debug, PartialEq, Eq)]
struct LegacyAction {
  timestamp: Option<String>,
  tool:      String,
  action:    String,
  success:   bool,
}

fn parse_legacy_action(line: &str) -> Option<LegacyAction> {
  let (timestamp, rest) = match line.strip_prefix('[').and_then(|l| l.split_once("] ")) {
    Some((ts, rest)) => (Some(ts.to_owned()), rest),
    None => (None, line),
  };
  let (call, status) = rest.rsplit_once(" -> ")?;
  let (tool, action) = call.split_once('.')?;
  let action = action.split(" (").next().unwrap_or(action);
  Some(LegacyAction {
    timestamp,
    tool: tool.trim().to_owned(),
    action: action.trim().to_owned(),
    success: status.trim().eq_ignore_ascii_case("success"),
  })
}

impl SqliteStore {
  async fn insert_fact_once(&self, content: String, category: &str, created_at: String) -> Result<bool> {
    if self.count(Table::Facts, Filter::new().eq("content", content.as_str())).await? > 0 {
      return Ok(false);
    }
    self
      .insert(
        Table::Facts,
        fields(json!({ "content": content, "category": category, "created_at": created_at })),
      )
      .await?;
    Ok(true)
  }

  async fn import_legacy(&self, map: Fields) -> Result<ImportReport> {
    let mut report = ImportReport::new(ImportFormat::Legacy);

    if let Some(Value::Object(info)) = map.get("user_info") {
      for (key, value) in info {
        let value = as_text(value);
        let existing = self
          .select(Table::UserInfo, Query::new(Filter::new().eq("key", key.as_str())))
          .await?;
        if existing.first().and_then(|r| r.get_str("value")) == Some(value.as_str()) {
          continue;
        }
        self.upsert_user_attribute(key.clone(), value, None).await?;
        report.bump(Table::UserInfo);
      }
    }

    if let Some(Value::Array(facts)) = map.get("facts") {
      for fact in facts {
        let content = fact.get("content").map_or_else(|| as_text(fact), as_text);
        let category = fact.get("category").and_then(Value::as_str).unwrap_or("general");
        if self.insert_fact_once(content, category, timestamp(fact.get("timestamp"))).await? {
          report.bump(Table::Facts);
        }
      }
    }

    if let Some(Value::Object(dates)) = map.get("important_dates") {
      for (name, date) in dates {
        let content = format!("{name}: {}", as_text(date));
        if self.insert_fact_once(content, "important_date", timestamp(None)).await? {
          report.bump(Table::Facts);
        }
      }
    }

    let locations = map
      .get("discovered_locations")
      .and_then(Value::as_array)
      .into_iter()
      .flatten()
      .filter_map(legacy_location)
      .map(|(name, path)| (name, path, "app_path"));
    let scripts = map
      .get("scripts_created")
      .and_then(Value::as_array)
      .into_iter()
      .flatten()
      .filter_map(|s| {
        let name = s.get("name").and_then(Value::as_str)?;
        let path = s.get("path").and_then(Value::as_str)?;
        Some((name.to_owned(), path.to_owned(), "script"))
      });
    for (name, path, kind) in locations.chain(scripts).collect::<Vec<_>>() {
      let filter = Filter::new().eq("name", name.as_str()).eq("path", path.as_str());
      if self.count(Table::Locations, filter).await? > 0 {
        continue;
      }
      self.upsert_location(name, path, Some(kind.to_owned())).await?;
      report.bump(Table::Locations);
    }

    if let Some(Value::Object(topics)) = map.get("topics_discussed") {
      for (name, data) in topics {
        let name = name.trim().to_lowercase();
        if self.count(Table::Topics, Filter::new().eq("name", name.as_str())).await? > 0 {
          continue;
        }
        let count = data.get("count").and_then(Value::as_i64).unwrap_or(1);
        self
          .insert(
            Table::Topics,
            fields(json!({
              "name":            name,
              "mention_count":   count,
              "first_discussed": timestamp(data.get("first_discussed")),
              "last_discussed":  timestamp(data.get("last_discussed")),
            })),
          )
          .await?;
        report.bump(Table::Topics);
      }
    }

    if let Some(Value::Array(log)) = map.get("action_log") {
      for entry in log {
        let line = entry.get("value").map_or_else(|| as_text(entry), as_text);
        let Some(action) = parse_legacy_action(&line) else {
          tracing::debug!(%line, "skipping unparseable legacy action");
          continue;
        };
        let at = entry.get("timestamp").cloned().or(action.timestamp.map(Value::String));
        let created_at = timestamp(at.as_ref());
        let filter = Filter::new()
          .eq("tool_name", action.tool.as_str())
          .eq("action_name", action.action.as_str());
        // Undated lines are stamped at import time, so only the raw line identifies them.
        let filter = match at {
          Some(_) => filter.eq("created_at", created_at.as_str()),
          None => filter.eq("result", line.as_str()),
        };
        if self.count(Table::Actions, filter).await? > 0 {
          continue;
        }
        self
          .insert(
            Table::Actions,
            fields(json!({
              "tool_name":   action.tool,
              "action_name": action.action,
              "result":      line,
              "success":     action.success,
              "created_at":  created_at,
            })),
          )
          .await?;
        report.bump(Table::Actions);
      }
    }

    Ok(report)
  }
}

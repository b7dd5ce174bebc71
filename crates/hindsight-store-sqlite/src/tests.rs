//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use hindsight_core::{
  Error as CoreError, Filter, Order, Query, Table,
  memory::{
    Correction, CorrectionScope, DecayPolicy, FeedbackKind, NewCorrection, NewErrorPattern,
    NewFeedback, RetentionPolicy, ToolOutcome,
  },
  record::fields,
  search::SearchQuery,
  store::MemoryStore,
};
use serde_json::json;

use crate::{Error, ImportFormat, SqliteStore, encode::encode_dt};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

async fn correction(s: &SqliteStore, id: i64) -> Correction {
  s.select(Table::Corrections, Query::new(Filter::by_id(id)))
    .await
    .unwrap()[0]
    .decode()
    .unwrap()
}

// ─── Generic rows ────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_select_round_trip() {
  let s = store().await;

  let id = s
    .insert(
      Table::Actions,
      fields(json!({
        "tool_name": "windows",
        "action_name": "open_app",
        "arguments": { "app": "chrome" },
        "success": true,
      })),
    )
    .await
    .unwrap();

  let rows = s.select(Table::Actions, Query::new(Filter::by_id(id))).await.unwrap();
  assert_eq!(rows.len(), 1);
  let row = &rows[0];
  assert_eq!(row.get("arguments"), Some(&json!({ "app": "chrome" })));
  assert_eq!(row.get("success"), Some(&json!(true)));
  assert!(row.get_str("created_at").is_some());
}

#[tokio::test]
async fn select_orders_limits_and_offsets() {
  let s = store().await;
  for (i, name) in ["alpha", "beta", "gamma", "delta"].iter().enumerate() {
    s.insert(
      Table::Tasks,
      fields(json!({ "title": name, "priority": i as i64 })),
    )
    .await
    .unwrap();
  }

  let rows = s
    .select(
      Table::Tasks,
      Query::new(Filter::new().ge("priority", 1))
        .order_by(Order::desc("priority"))
        .limit(2)
        .offset(1),
    )
    .await
    .unwrap();
  let titles: Vec<_> = rows.iter().filter_map(|r| r.get_str("title")).collect();
  assert_eq!(titles, ["gamma", "beta"]);

  assert_eq!(s.count(Table::Tasks, Filter::new()).await.unwrap(), 4);
  assert_eq!(
    s.count(Table::Tasks, Filter::new().like("title", "%ta")).await.unwrap(),
    2
  );
}

#[tokio::test]
async fn unknown_column_fails_before_io() {
  let s = store().await;
  let err = s
    .insert(Table::Facts, fields(json!({ "content": "x", "owner": "me" })))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::InvalidColumn { .. })));

  let err = s
    .select(Table::Facts, Query::new(Filter::new().eq("1=1; --", 1)))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::InvalidColumn { .. })));
  assert_eq!(s.count(Table::Facts, Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn append_only_tables_reject_updates() {
  let s = store().await;
  let id = s
    .insert(
      Table::Exchanges,
      fields(json!({ "user_input": "hi", "ai_response": "hello" })),
    )
    .await
    .unwrap();

  let err = s
    .update(Table::Exchanges, fields(json!({ "mood": "happy" })), Filter::by_id(id))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::AppendOnly(Table::Exchanges))));
}

#[tokio::test]
async fn feedback_is_immutable_except_applied() {
  let s = store().await;
  let id = s
    .log_feedback(NewFeedback {
      kind:             FeedbackKind::Negative,
      feedback_type:    Some("frustration".into()),
      message:          "ugh".into(),
      prior_action:     None,
      corrected_action: None,
    })
    .await
    .unwrap();

  let err = s
    .update(Table::Feedback, fields(json!({ "message": "edited" })), Filter::by_id(id))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Core(CoreError::ImmutableColumn { .. })));

  s.mark_feedback_applied(id).await.unwrap();
  let rows = s.select(Table::Feedback, Query::new(Filter::by_id(id))).await.unwrap();
  assert_eq!(rows[0].get("applied"), Some(&json!(true)));
  assert_eq!(rows[0].get_str("kind"), Some("negative"));
}

#[tokio::test]
async fn update_refreshes_updated_at() {
  let s = store().await;
  let old = encode_dt(Utc::now() - Duration::days(1));
  let id = s
    .insert(
      Table::Notes,
      fields(json!({ "content": "draft", "created_at": old, "updated_at": old })),
    )
    .await
    .unwrap();

  let changed = s
    .update(Table::Notes, fields(json!({ "content": "final" })), Filter::by_id(id))
    .await
    .unwrap();
  assert_eq!(changed, 1);

  let row = &s.select(Table::Notes, Query::new(Filter::by_id(id))).await.unwrap()[0];
  assert_eq!(row.get_str("content"), Some("final"));
  assert!(row.get_str("updated_at").unwrap() > old.as_str());
  assert_eq!(row.get_str("created_at"), Some(old.as_str()));
}

// ─── Full-text index ─────────────────────────────────────────────────────────

#[tokio::test]
async fn search_finds_exactly_the_unique_row() {
  let s = store().await;
  let mut ids = vec![];
  for word in ["apple", "banana", "cherry", "damson", "elderberry"] {
    let id = s
      .insert(
        Table::Facts,
        fields(json!({ "content": format!("the user likes {word} pie") })),
      )
      .await
      .unwrap();
    ids.push(id);
  }

  let hits = s.search(SearchQuery::new("cherry")).await.unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].source, Table::Facts);
  assert_eq!(hits[0].source_id, ids[2]);

  let all = s.search(SearchQuery::new("pie")).await.unwrap();
  assert_eq!(all.len(), 5);
}

#[tokio::test]
async fn search_falls_back_to_prefix_then_substring() {
  let s = store().await;
  let id = s
    .insert(Table::Facts, fields(json!({ "content": "favourite browser is firefox" })))
    .await
    .unwrap();

  let prefix = s.search(SearchQuery::new("firef")).await.unwrap();
  assert_eq!(prefix.len(), 1);
  assert_eq!(prefix[0].source_id, id);

  let substring = s.search(SearchQuery::new("refo")).await.unwrap();
  assert_eq!(substring.len(), 1);
  assert_eq!(substring[0].source_id, id);
  assert_eq!(substring[0].rank, 0.0);

  assert!(s.search(SearchQuery::new("safari")).await.unwrap().is_empty());
}

#[tokio::test]
async fn search_respects_source_filter() {
  let s = store().await;
  s.insert(Table::Facts, fields(json!({ "content": "project deadline friday" })))
    .await
    .unwrap();
  let note = s
    .insert(Table::Notes, fields(json!({ "title": "deadline", "content": "ship it" })))
    .await
    .unwrap();

  let hits = s
    .search(SearchQuery::new("deadline").source(Table::Notes))
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].source_id, note);
  assert_eq!(hits[0].content, "deadline ship it");
}

#[tokio::test]
async fn update_and_delete_keep_index_in_step() {
  let s = store().await;
  let id = s
    .insert(Table::Facts, fields(json!({ "content": "lives in lisbon" })))
    .await
    .unwrap();

  s.update(Table::Facts, fields(json!({ "content": "lives in porto" })), Filter::by_id(id))
    .await
    .unwrap();
  assert!(s.search(SearchQuery::new("lisbon")).await.unwrap().is_empty());
  assert_eq!(s.search(SearchQuery::new("porto")).await.unwrap().len(), 1);
  assert_eq!(s.stats().await.unwrap().index_entries, 1);

  s.delete(Table::Facts, Filter::by_id(id)).await.unwrap();
  assert!(s.search(SearchQuery::new("porto")).await.unwrap().is_empty());
  assert_eq!(s.stats().await.unwrap().index_entries, 0);
}

#[tokio::test]
async fn empty_index_is_rebuilt_once() {
  let s = store().await;
  s.insert(Table::Facts, fields(json!({ "content": "owns a cat named miso" })))
    .await
    .unwrap();
  s.upsert_user_attribute("name".into(), "Ada".into(), None).await.unwrap();

  s.conn
    .call(|conn| {
      conn.execute("DELETE FROM memory_fts", [])?;
      Ok(())
    })
    .await
    .unwrap();
  // Still reachable through the substring scan.
  assert_eq!(s.search(SearchQuery::new("miso")).await.unwrap().len(), 1);

  assert_eq!(s.rebuild_index_if_empty().await.unwrap(), Some(2));
  assert_eq!(s.rebuild_index_if_empty().await.unwrap(), None);

  let hits = s.search(SearchQuery::new("ada")).await.unwrap();
  assert_eq!(hits[0].content, "name: Ada");
  assert!(hits[0].rank > 0.0);
}

// ─── Upserts ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_topic_counts_mentions() {
  let s = store().await;
  let a = s.upsert_topic("Rust".into()).await.unwrap();
  let b = s.upsert_topic("rust ".into()).await.unwrap();
  assert_eq!(a, b);

  let row = &s.select(Table::Topics, Query::all()).await.unwrap()[0];
  assert_eq!(row.get_str("name"), Some("rust"));
  assert_eq!(row.get("mention_count"), Some(&json!(2)));
}

#[tokio::test]
async fn upsert_location_and_attribute_are_keyed() {
  let s = store().await;
  let a = s
    .upsert_location("chrome".into(), "C:/chrome.exe".into(), Some("app_path".into()))
    .await
    .unwrap();
  let b = s
    .upsert_location("chrome".into(), "C:/chrome.exe".into(), None)
    .await
    .unwrap();
  assert_eq!(a, b);
  assert_eq!(s.count(Table::Locations, Filter::new()).await.unwrap(), 1);

  s.upsert_user_attribute("city".into(), "Oslo".into(), None).await.unwrap();
  s.upsert_user_attribute("city".into(), "Bergen".into(), None).await.unwrap();
  let rows = s.select(Table::UserInfo, Query::all()).await.unwrap();
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].get_str("value"), Some("Bergen"));
  assert_eq!(s.search(SearchQuery::new("bergen")).await.unwrap().len(), 1);
  assert!(s.search(SearchQuery::new("oslo")).await.unwrap().is_empty());
}

// ─── Corrections ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn relearning_reinforces_a_single_record() {
  let s = store().await;
  let learn = || NewCorrection::new("No, I meant firefox", "firefox").tool("windows", None);

  let first = s.add_or_reinforce_correction(learn()).await.unwrap();
  let second = s.add_or_reinforce_correction(learn()).await.unwrap();
  assert!(!first.reinforced);
  assert!(second.reinforced);
  assert_eq!(first.id, second.id);

  assert_eq!(s.count(Table::Corrections, Filter::new()).await.unwrap(), 1);
  let c = correction(&s, first.id).await;
  assert_eq!(c.confidence, 1.0);
  assert_eq!(c.trigger_pattern, "no, i meant firefox");
}

#[tokio::test]
async fn reinforcement_overwrites_behavior() {
  let s = store().await;
  let write = s
    .add_or_reinforce_correction(NewCorrection::new("use dark mode", "dark"))
    .await
    .unwrap();
  s.update(
    Table::Corrections,
    fields(json!({ "confidence": 0.5 })),
    Filter::by_id(write.id),
  )
  .await
  .unwrap();

  s.reinforce_correction(write.id, NewCorrection::new("use dark mode", "darker"))
    .await
    .unwrap();
  let c = correction(&s, write.id).await;
  assert!((c.confidence - 0.6).abs() < 1e-9);
  assert_eq!(c.correct_behavior, "darker");
}

#[tokio::test]
async fn decay_applies_once_per_idle_window() {
  let s = store().await;
  let now = Utc::now();
  let id = s
    .insert(
      Table::Corrections,
      fields(json!({
        "trigger_pattern": "open my editor",
        "correct_behavior": "code",
        "created_at": encode_dt(now - Duration::days(30)),
        "last_used": encode_dt(now - Duration::days(8)),
      })),
    )
    .await
    .unwrap();

  let policy = DecayPolicy::default();
  assert_eq!(s.decay_stale_corrections(policy, now).await.unwrap(), 1);
  assert_eq!(correction(&s, id).await.confidence, 0.9);

  assert_eq!(s.decay_stale_corrections(policy, Utc::now()).await.unwrap(), 0);
  assert_eq!(correction(&s, id).await.confidence, 0.9);

  // A full window later it decays again.
  let later = Utc::now() + Duration::days(8);
  assert_eq!(s.decay_stale_corrections(policy, later).await.unwrap(), 1);
  assert!((correction(&s, id).await.confidence - 0.81).abs() < 1e-9);
}

#[tokio::test]
async fn decay_stops_at_pruning_floor() {
  let s = store().await;
  let now = Utc::now();
  let id = s
    .insert(
      Table::Corrections,
      fields(json!({
        "trigger_pattern": "quiet",
        "correct_behavior": "mute",
        "confidence": 0.3,
        "created_at": encode_dt(now - Duration::days(30)),
      })),
    )
    .await
    .unwrap();

  assert_eq!(s.decay_stale_corrections(DecayPolicy::default(), now).await.unwrap(), 0);
  assert_eq!(correction(&s, id).await.confidence, 0.3);
}

#[tokio::test]
async fn session_corrections_are_scoped_and_purged() {
  let s = store().await;
  let session = CorrectionScope::Session("s-1".into());
  s.add_or_reinforce_correction(NewCorrection::new("louder", "volume up").scope(session))
    .await
    .unwrap();
  s.add_or_reinforce_correction(NewCorrection::new("brighter", "brightness up"))
    .await
    .unwrap();

  let policy = DecayPolicy::default();
  let permanent = s.relevant_corrections(policy, None).await.unwrap();
  assert_eq!(permanent.len(), 1);
  assert_eq!(permanent[0].trigger_pattern, "brighter");

  let with_session = s.relevant_corrections(policy, Some("s-1".into())).await.unwrap();
  assert_eq!(with_session.len(), 2);
  assert_eq!(with_session[0].scope(), CorrectionScope::Session("s-1".into()));

  assert_eq!(s.purge_session_corrections("s-1".into()).await.unwrap(), 1);
  assert_eq!(s.count(Table::Corrections, Filter::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn mark_used_bumps_count_and_timestamp() {
  let s = store().await;
  let w = s
    .add_or_reinforce_correction(NewCorrection::new("play jazz", "jazz radio"))
    .await
    .unwrap();
  s.mark_correction_used(w.id).await.unwrap();
  s.mark_correction_used(w.id).await.unwrap();

  let c = correction(&s, w.id).await;
  assert_eq!(c.use_count, 2);
  assert!(c.last_used.is_some());
}

// ─── Error & tool patterns ───────────────────────────────────────────────────

fn timeout(tool: &str) -> NewErrorPattern {
  NewErrorPattern {
    tool_name:     tool.into(),
    action_name:   "fetch".into(),
    error_type:    "transient".into(),
    error_message: "connection timed out".into(),
  }
}

#[tokio::test]
async fn error_patterns_increment_per_key() {
  let s = store().await;
  s.log_error_pattern(timeout("web")).await.unwrap();
  let second = s.log_error_pattern(timeout("web")).await.unwrap();
  s.log_error_pattern(timeout("mail")).await.unwrap();

  assert_eq!(second.occurrence_count, 2);
  assert_eq!(s.count(Table::ErrorPatterns, Filter::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn solutions_are_recorded_without_counting() {
  let s = store().await;
  s.log_error_pattern(timeout("web")).await.unwrap();
  assert_eq!(
    s.known_solution("web".into(), "fetch".into(), "transient".into()).await.unwrap(),
    None
  );

  s.record_error_solution("web".into(), "fetch".into(), "transient".into(), "retry".into())
    .await
    .unwrap();
  assert_eq!(
    s.known_solution("web".into(), "fetch".into(), "transient".into()).await.unwrap(),
    Some("retry".into())
  );

  let row = &s.select(Table::ErrorPatterns, Query::all()).await.unwrap()[0];
  assert_eq!(row.get("occurrence_count"), Some(&json!(1)));
}

#[tokio::test]
async fn tool_usage_tracks_running_averages() {
  let s = store().await;
  let outcome = |success, ms| ToolOutcome {
    tool_name:   "spotify".into(),
    action_name: "play".into(),
    success,
    duration_ms: Some(ms),
  };

  s.update_tool_usage_pattern(outcome(true, 100)).await.unwrap();
  s.update_tool_usage_pattern(outcome(false, 300)).await.unwrap();
  let p = s.update_tool_usage_pattern(outcome(true, 200)).await.unwrap();

  assert_eq!(p.use_count, 3);
  assert_eq!(p.success_count, 2);
  assert!((p.success_rate - 2.0 / 3.0).abs() < 1e-9);
  assert!((p.avg_duration_ms - 200.0).abs() < 1e-9);
}

// ─── Retention ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn prune_honours_windows_and_high_value_rows() {
  let s = store().await;
  let now = Utc::now();
  let old = encode_dt(now - Duration::days(120));

  let stale = s
    .insert(
      Table::Exchanges,
      fields(json!({ "user_input": "old chat", "ai_response": "ok", "created_at": old })),
    )
    .await
    .unwrap();
  let kept = s
    .insert(
      Table::Exchanges,
      fields(json!({
        "user_input": "old correction", "ai_response": "sorry",
        "feedback_id": 1, "created_at": old,
      })),
    )
    .await
    .unwrap();
  s.insert(
    Table::Exchanges,
    fields(json!({ "user_input": "fresh chat", "ai_response": "hi" })),
  )
  .await
  .unwrap();
  s.insert(
    Table::Actions,
    fields(json!({ "tool_name": "t", "action_name": "a", "created_at": old })),
  )
  .await
  .unwrap();
  s.insert(
    Table::ErrorPatterns,
    fields(json!({
      "tool_name": "t", "action_name": "a", "error_type": "unknown",
      "last_occurred": old, "created_at": old,
    })),
  )
  .await
  .unwrap();
  s.insert(
    Table::Corrections,
    fields(json!({
      "trigger_pattern": "weak", "correct_behavior": "x",
      "confidence": 0.1, "created_at": old,
    })),
  )
  .await
  .unwrap();

  let report = s.prune(RetentionPolicy::default(), now).await.unwrap();
  assert_eq!(report.exchanges, 1);
  assert_eq!(report.actions, 1);
  assert_eq!(report.error_patterns, 1);
  assert_eq!(report.corrections, 1);
  assert_eq!(report.index_entries, 1);

  let remaining: Vec<i64> = s
    .select(Table::Exchanges, Query::all())
    .await
    .unwrap()
    .iter()
    .map(|r| r.id)
    .collect();
  assert!(!remaining.contains(&stale));
  assert!(remaining.contains(&kept));
  assert!(s.search(SearchQuery::new("old chat")).await.unwrap().iter().all(|h| h.source_id != stale));
}

// ─── Export / import ─────────────────────────────────────────────────────────

#[tokio::test]
async fn export_then_import_reproduces_row_counts() {
  let s = store().await;
  s.insert(Table::Facts, fields(json!({ "content": "likes tea" }))).await.unwrap();
  s.upsert_user_attribute("name".into(), "Ada".into(), Some("profile".into()))
    .await
    .unwrap();
  s.add_or_reinforce_correction(NewCorrection::new("no, firefox", "firefox"))
    .await
    .unwrap();
  s.log_error_pattern(timeout("web")).await.unwrap();
  s.upsert_topic("music".into()).await.unwrap();
  s.insert(
    Table::Exchanges,
    fields(json!({ "user_input": "hi", "ai_response": "hey", "tools_used": ["web"] })),
  )
  .await
  .unwrap();

  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("export.json");
  s.export_json(&path).await.unwrap();

  let fresh = store().await;
  let report = fresh.import_json(&path).await.unwrap();
  assert_eq!(report.format, ImportFormat::Export);

  let (before, after) = (s.stats().await.unwrap(), fresh.stats().await.unwrap());
  assert_eq!(before.tables, after.tables);
  assert_eq!(before.index_entries, after.index_entries);

  // Importing the same document again writes nothing.
  let again = fresh.import_json(&path).await.unwrap();
  assert_eq!(again.total(), 0);
  assert_eq!(fresh.stats().await.unwrap().tables, before.tables);

  let exchange = &fresh.select(Table::Exchanges, Query::all()).await.unwrap()[0];
  assert_eq!(exchange.get("tools_used"), Some(&json!(["web"])));
}

#[tokio::test]
async fn legacy_import_is_idempotent() {
  let legacy = json!({
    "user_info": { "name": "Ada", "age": 36 },
    "facts": [
      { "content": "prefers firefox", "category": "preference", "timestamp": "2025-01-02T03:04:05.123456" },
      "plain string fact",
    ],
    "discovered_locations": [
      { "key": "app_path_chrome", "value": "Found Chrome at C:/chrome.exe" },
    ],
    "scripts_created": [ { "name": "backup", "path": "C:/scripts/backup.ps1" } ],
    "topics_discussed": { "Rust": { "count": 4, "first_discussed": "2025-01-01T00:00:00" } },
    "important_dates": { "birthday": "1989-12-10" },
    "action_log": [
      { "value": "[2025-12-25 10:58:18] system_info.get_user_folders -> success" },
      { "value": "[2025-12-25 11:00:00] windows.open_app (app=chrome) -> error" },
      { "value": "garbage" },
    ],
  });

  let s = store().await;
  let first = s.import_document(legacy.clone()).await.unwrap();
  assert_eq!(first.format, ImportFormat::Legacy);
  assert_eq!(first.rows.get(&Table::UserInfo), Some(&2));
  assert_eq!(first.rows.get(&Table::Facts), Some(&3));
  assert_eq!(first.rows.get(&Table::Locations), Some(&2));
  assert_eq!(first.rows.get(&Table::Topics), Some(&1));
  assert_eq!(first.rows.get(&Table::Actions), Some(&2));

  let second = s.import_document(legacy).await.unwrap();
  assert_eq!(second.total(), 0);

  let failed = s
    .count(Table::Actions, Filter::new().eq("success", false))
    .await
    .unwrap();
  assert_eq!(failed, 1);
  assert_eq!(s.search(SearchQuery::new("birthday")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn undated_legacy_actions_import_once() {
  let legacy = json!({
    "action_log": [
      "windows.open_app -> success",
      { "value": "media.play (song=jazz) -> error" },
    ],
  });

  let s = store().await;
  let first = s.import_document(legacy.clone()).await.unwrap();
  assert_eq!(first.rows.get(&Table::Actions), Some(&2));

  let second = s.import_document(legacy).await.unwrap();
  assert_eq!(second.total(), 0);
  assert_eq!(s.count(Table::Actions, Filter::new()).await.unwrap(), 2);

  let opened = Filter::new().eq("tool_name", "windows").eq("action_name", "open_app");
  assert_eq!(s.count(Table::Actions, opened).await.unwrap(), 1);
}

#[tokio::test]
async fn unrecognised_documents_are_rejected() {
  let s = store().await;
  let err = s.import_document(json!({ "hello": "world" })).await.unwrap_err();
  assert!(matches!(err, Error::UnknownFormat(_)));

  let dir = tempfile::tempdir().unwrap();
  let report = s.import_json(dir.path().join("missing.json")).await.unwrap();
  assert_eq!(report.total(), 0);
}

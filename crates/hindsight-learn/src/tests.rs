//! Correction engine tests against an in-memory SQLite store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use hindsight_core::{
  Filter, Query, Table,
  memory::{CorrectionScope, NewCorrection},
  record::fields,
  store::MemoryStore,
};
use hindsight_store_sqlite::SqliteStore;
use serde_json::json;

use crate::{CorrectionEngine, FeedbackClassifier, UtteranceKind};

async fn engine() -> CorrectionEngine<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  CorrectionEngine::new(Arc::new(store))
}

fn browser_correction(trigger: &str) -> NewCorrection {
  NewCorrection::new(trigger, "firefox")
    .wrong("chrome")
    .tool("windows", Some("open_app".into()))
    .argument("app")
}

#[tokio::test]
async fn similar_triggers_reinforce() {
  let e = engine().await;
  let first = e.learn_correction(browser_correction("No, I meant firefox")).await.unwrap();
  assert!(!first.reinforced);

  let second = e.learn_correction(browser_correction("no i meant firefox")).await.unwrap();
  assert!(second.reinforced);
  assert_eq!(second.id, first.id);

  let third = e.learn_correction(NewCorrection::new("turn it down", "volume down")).await.unwrap();
  assert!(!third.reinforced);
  assert_eq!(e.store().count(Table::Corrections, Filter::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn triggers_are_stored_normalized() {
  let e = engine().await;
  let w = e.learn_correction(NewCorrection::new("  Open My EDITOR ", "code")).await.unwrap();
  let rows = e.store().select(Table::Corrections, Query::new(Filter::by_id(w.id))).await.unwrap();
  assert_eq!(rows[0].get_str("trigger_pattern"), Some("open my editor"));
}

#[tokio::test]
async fn matching_prefers_containment_and_marks_used() {
  let e = engine().await;
  e.learn_correction(NewCorrection::new("my music", "spotify")).await.unwrap();
  e.learn_correction(NewCorrection::new("the news", "bbc news")).await.unwrap();

  let hit = e.find_matching_correction("play my music please").await.unwrap().unwrap();
  assert_eq!(hit.correct_behavior, "spotify");
  assert_eq!(hit.use_count, 1);

  let rows = e
    .store()
    .select(Table::Corrections, Query::new(Filter::by_id(hit.id)))
    .await
    .unwrap();
  assert_eq!(rows[0].get("use_count"), Some(&json!(1)));
  assert!(rows[0].get_str("last_used").is_some());
}

#[tokio::test]
async fn matching_needs_score_above_floor() {
  let e = engine().await;
  e.learn_correction(NewCorrection::new("open the editor", "code")).await.unwrap();

  assert!(e.find_matching_correction("what time is it").await.unwrap().is_none());
  assert!(e.find_matching_correction("").await.unwrap().is_none());
  // Close enough by edit distance.
  let hit = e.find_matching_correction("open the editr").await.unwrap();
  assert_eq!(hit.map(|c| c.correct_behavior), Some("code".into()));
}

#[tokio::test]
async fn low_confidence_corrections_are_not_offered() {
  let e = engine().await;
  let now = Utc::now();
  e.store()
    .insert(
      Table::Corrections,
      fields(json!({
        "trigger_pattern": "my music",
        "correct_behavior": "spotify",
        "confidence": 0.2,
        "created_at": (now - Duration::days(30)).to_rfc3339(),
      })),
    )
    .await
    .unwrap();
  assert!(e.find_matching_correction("my music").await.unwrap().is_none());
}

#[tokio::test]
async fn session_scope() {
  let e = engine().await;
  let scope = CorrectionScope::Session("s-1".into());
  e.learn_correction(NewCorrection::new("louder", "volume up").scope(scope.clone()))
    .await
    .unwrap();
  e.learn_correction(NewCorrection::new("brighter", "brightness up")).await.unwrap();

  assert!(e.find_matching_correction("louder").await.unwrap().is_none());
  let hit = e.find_matching_in_session("louder", "s-1").await.unwrap().unwrap();
  assert_eq!(hit.scope(), scope);

  let session = e.session_corrections("s-1").await.unwrap();
  assert_eq!(session.len(), 1);
  assert_eq!(session[0].trigger_pattern, "louder");

  assert_eq!(e.end_session("s-1").await.unwrap(), 1);
  assert!(e.session_corrections("s-1").await.unwrap().is_empty());
  assert_eq!(e.store().count(Table::Corrections, Filter::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn corrections_for_filters_by_tool_and_action() {
  let e = engine().await;
  e.learn_correction(browser_correction("no i meant firefox")).await.unwrap();
  e.learn_correction(NewCorrection::new("louder", "volume up").tool("audio", None))
    .await
    .unwrap();

  let windows = e.corrections_for("windows", Some("open_app")).await.unwrap();
  assert_eq!(windows.len(), 1);
  assert_eq!(windows[0].argument_name.as_deref(), Some("app"));
  assert!(e.corrections_for("windows", Some("close_app")).await.unwrap().is_empty());
  // A correction without an action applies to every action of its tool.
  assert_eq!(e.corrections_for("audio", Some("set_volume")).await.unwrap().len(), 1);
}

#[tokio::test]
async fn correcting_to_a_browser_teaches_the_alias() {
  let e = engine().await;
  e.learn_correction(browser_correction("no, i meant firefox")).await.unwrap();

  let args = e
    .apply_to_arguments("windows", "open_app", fields(json!({ "app": "the browser" })))
    .await;
  assert_eq!(args["app"], "firefox");

  let args = e
    .apply_to_arguments("windows", "open_app", fields(json!({ "app": "chrome" })))
    .await;
  assert_eq!(args["app"], "firefox");

  let args = e
    .apply_to_arguments("files", "open", fields(json!({ "path": "notes.txt" })))
    .await;
  assert_eq!(args["path"], "notes.txt");
}

#[tokio::test]
async fn defaults_and_shortcuts() {
  let e = engine().await;
  e.learn_default("windows", "monitor", "2").await.unwrap();
  e.learn_default("media", "volume", "40").await.unwrap();
  e.learn_shortcut("my docs", "D:\\Documents").await.unwrap();

  let args = e
    .apply_to_arguments("windows", "move_window", fields(json!({ "target": "my docs" })))
    .await;
  assert_eq!(args["monitor"], "2");
  assert_eq!(args["target"], "D:\\Documents");
  assert!(args.get("volume").is_none());

  // Learning a default again replaces it.
  e.learn_default("windows", "monitor", "1").await.unwrap();
  let args = e.apply_to_arguments("windows", "move_window", fields(json!({}))).await;
  assert_eq!(args["monitor"], "1");
}

#[tokio::test]
async fn classified_correction_feeds_the_engine() {
  let e = engine().await;
  let classification = FeedbackClassifier::new().classify("no, I meant firefox");
  assert_eq!(classification.kind, UtteranceKind::Correction);

  let intent = classification.intent.unwrap();
  let prior = fields(json!({ "app": "chrome" }));
  let (argument, wrong) = crate::arguments::corrected_argument(&prior, &intent).unwrap();
  e.learn_correction(
    NewCorrection::new("no, I meant firefox", intent)
      .wrong(wrong)
      .tool("windows", Some("open_app".into()))
      .argument(argument),
  )
  .await
  .unwrap();

  let args = e
    .apply_to_arguments("windows", "open_app", fields(json!({ "app": "browser" })))
    .await;
  assert_eq!(args["app"], "firefox");
}

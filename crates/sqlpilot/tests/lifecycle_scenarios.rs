mod common;

use common::{engine_with, lifecycle_with, orders_store, SinkCall, ORDERS_SQL};
use sqlpilot::engine::SENTINEL;
use sqlpilot::lifecycle::{Event, Transition};
use sqlpilot::suggestion_log::{read_entries, Status};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn capture(text: &str, window: &str) -> Event {
  Event::Capture { text: text.to_string(), window_title: window.to_string() }
}

#[tokio::test]
async fn test_accepted_suggestion_is_committed_and_logged() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("suggestions_log.csv");
  let mut lifecycle =
    lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &["sql workbench"]);

  let shown = lifecycle.handle(capture("SELECT * FROM orders", "SQL Workbench - prod")).await;
  assert_eq!(shown, Transition::Displayed);
  assert!(lifecycle.state().displayed);

  let ghost = format!("  -- suggestion: {ORDERS_SQL}");
  assert_eq!(lifecycle.sink().calls, vec![SinkCall::Display(ghost.clone())]);

  assert_eq!(lifecycle.handle(Event::Accept).await, Transition::Accepted);
  assert!(!lifecycle.state().displayed);
  assert_eq!(
    lifecycle.sink().calls[1..],
    [SinkCall::Remove(ghost.chars().count()), SinkCall::Commit(ORDERS_SQL.to_string())]
  );

  let entries = read_entries(&log_path).unwrap();
  assert_eq!(entries.len(), 1);
  let row = &entries[0];
  assert_eq!(row.status, Status::Accepted);
  assert_eq!(row.suggestion, ORDERS_SQL);
  assert_eq!(row.user_input, "SELECT * FROM orders");
  assert_eq!(row.model_name, "llama-test");
  assert_eq!(row.vector_store_kind, "flat_index");
  assert_eq!(row.embedding_model, "static-embedder");
  assert!(row.retrieved_context.contains("Prompt: list orders"));
}

#[tokio::test]
async fn test_dismissed_suggestion_is_logged_without_commit() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  lifecycle.handle(capture("SELECT * FROM orders", "anything")).await;
  assert_eq!(lifecycle.handle(Event::Dismiss).await, Transition::Dismissed);

  assert!(!lifecycle.state().displayed);
  assert!(!lifecycle.sink().calls.iter().any(|c| matches!(c, SinkCall::Commit(_))));
  let entries = read_entries(&log_path).unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].status, Status::Dismissed);
}

#[tokio::test]
async fn test_empty_capture_is_a_no_op() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  assert_eq!(lifecycle.handle(capture("   \n", "anything")).await, Transition::NoOp);

  assert!(!lifecycle.state().displayed);
  assert!(lifecycle.sink().calls.is_empty());
  assert!(read_entries(&log_path).unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_capture_while_displayed_dismisses_the_ghost() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  lifecycle.handle(capture("SELECT 1", "w")).await;
  assert_eq!(lifecycle.handle(capture("  ", "w")).await, Transition::Dismissed);

  assert!(!lifecycle.state().displayed);
  assert!(matches!(lifecycle.sink().calls.last(), Some(SinkCall::Remove(_))));
  let entries = read_entries(&log_path).unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].user_input, "SELECT 1");
  assert_eq!(entries[0].status, Status::Dismissed);
}

#[tokio::test]
async fn test_second_dismiss_is_a_no_op() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  lifecycle.handle(capture("SELECT * FROM orders", "anything")).await;
  assert_eq!(lifecycle.handle(Event::Dismiss).await, Transition::Dismissed);
  assert_eq!(lifecycle.handle(Event::Dismiss).await, Transition::NoOp);
  assert_eq!(lifecycle.handle(Event::Accept).await, Transition::NoOp);

  assert_eq!(read_entries(&log_path).unwrap().len(), 1);
}

#[tokio::test]
async fn test_untracked_window_is_ignored() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle =
    lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &["DBeaver", "pgAdmin"]);

  let transition = lifecycle.handle(capture("SELECT 1", "Slack - general")).await;
  assert!(matches!(transition, Transition::Ignored(reason) if reason.contains("Slack")));
  assert!(!lifecycle.state().displayed);

  let transition = lifecycle.handle(capture("SELECT 1", "dbeaver 23.1")).await;
  assert_eq!(transition, Transition::Displayed);
}

#[tokio::test]
async fn test_capture_while_displayed_supersedes_the_old_suggestion() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  lifecycle.handle(capture("first", "w")).await;
  assert_eq!(lifecycle.handle(capture("second", "w")).await, Transition::Displayed);

  assert_eq!(lifecycle.state().captured_input, "second");
  let displays = lifecycle.sink().calls.iter().filter(|c| matches!(c, SinkCall::Display(_))).count();
  let removes = lifecycle.sink().calls.iter().filter(|c| matches!(c, SinkCall::Remove(_))).count();
  assert_eq!((displays, removes), (2, 1));

  let entries = read_entries(&log_path).unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].user_input, "first");
  assert_eq!(entries[0].status, Status::Dismissed);
}

#[tokio::test]
async fn test_reset_clears_memory_but_keeps_display() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  lifecycle.handle(capture("SELECT * FROM orders", "w")).await;
  assert_eq!(lifecycle.session().engine.memory().unwrap().len(), 1);

  assert_eq!(lifecycle.handle(Event::Reset).await, Transition::Reset);
  assert!(lifecycle.session().engine.memory().unwrap().is_empty());
  assert!(lifecycle.state().displayed);
}

#[tokio::test]
async fn test_failed_generation_shows_sentinel_and_never_commits_it() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), None), &log_path, &[]);

  assert_eq!(lifecycle.handle(capture("SELECT * FROM orders", "w")).await, Transition::Displayed);
  assert_eq!(lifecycle.state().pending_suggestion, SENTINEL);

  assert_eq!(lifecycle.handle(Event::Accept).await, Transition::Dismissed);
  assert!(!lifecycle.sink().calls.iter().any(|c| matches!(c, SinkCall::Commit(_))));
  let entries = read_entries(&log_path).unwrap();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].status, Status::Dismissed);
  assert_eq!(entries[0].retrieved_context, "");
}

#[tokio::test]
async fn test_run_handles_queued_events_in_order() {
  let dir = TempDir::new().unwrap();
  let log_path = dir.path().join("log.csv");
  let mut lifecycle = lifecycle_with(engine_with(orders_store(), Some(ORDERS_SQL)), &log_path, &[]);

  let (tx, rx) = mpsc::channel(8);
  for event in [
    capture("one", "w"),
    capture("two", "w"),
    Event::Accept,
    capture("three", "w"),
    Event::Dismiss,
  ] {
    tx.send(event).await.unwrap();
  }
  drop(tx);

  lifecycle.run(rx).await;

  let statuses: Vec<(String, Status)> =
    read_entries(&log_path).unwrap().into_iter().map(|e| (e.user_input, e.status)).collect();
  assert_eq!(
    statuses,
    vec![
      ("one".to_string(), Status::Dismissed),
      ("two".to_string(), Status::Accepted),
      ("three".to_string(), Status::Dismissed),
    ]
  );
  assert!(!lifecycle.state().displayed);
}

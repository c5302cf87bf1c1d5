#![allow(dead_code)]

use async_trait::async_trait;
use sqlpilot::completion::CompletionClient;
use sqlpilot::embedding_client::Embedder;
use sqlpilot::engine::SuggestionEngine;
use sqlpilot::error::{Disposition, PilotError, Result};
use sqlpilot::lifecycle::{GhostSink, Session, SuggestionLifecycle};
use sqlpilot::retry::RetryPolicy;
use sqlpilot::suggestion_log::SuggestionLog;
use sqlpilot::vector_store::{
  BoxedVectorStore, ExampleRecord, FlatIndexBackend, MetadataTable, VectorStore, VectorStoreAdapter,
};
use std::path::Path;
use std::sync::Arc;

pub const ORDERS_SQL: &str = "SELECT * FROM orders WHERE status='open'";

/// Always returns the same two-dimensional query vector
pub struct StaticEmbedder;

#[async_trait]
impl Embedder for StaticEmbedder {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
    Ok(vec![1.0, 0.0])
  }

  fn model_name(&self) -> &str {
    "static-embedder"
  }
}

/// Replies with a fixed statement, or fails fatally when `reply` is `None`
pub struct ScriptedCompletion {
  pub reply: Option<String>,
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
  async fn complete(&self, _user_input: &str, _context: &str, _model: &str) -> Result<String> {
    self
      .reply
      .clone()
      .ok_or_else(|| PilotError::completion("model unavailable", Disposition::Fatal))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
  Display(String),
  Remove(usize),
  Commit(String),
}

#[derive(Default)]
pub struct RecordingSink {
  pub calls: Vec<SinkCall>,
}

impl GhostSink for RecordingSink {
  fn display(&mut self, text: &str) -> std::io::Result<()> {
    self.calls.push(SinkCall::Display(text.to_string()));
    Ok(())
  }

  fn remove(&mut self, n_chars: usize) -> std::io::Result<()> {
    self.calls.push(SinkCall::Remove(n_chars));
    Ok(())
  }

  fn commit(&mut self, text: &str) -> std::io::Result<()> {
    self.calls.push(SinkCall::Commit(text.to_string()));
    Ok(())
  }
}

/// One-record flat index whose only example is the "list orders" query
pub fn orders_store() -> BoxedVectorStore {
  let metadata = MetadataTable::new(vec![ExampleRecord::new("list orders", ORDERS_SQL, None)]);
  BoxedVectorStore::new(FlatIndexBackend::from_parts(2, vec![vec![1.0, 0.0]], metadata).unwrap())
}

pub fn engine_with(store: impl VectorStore + 'static, reply: Option<&str>) -> SuggestionEngine {
  let retriever =
    VectorStoreAdapter::new(BoxedVectorStore::new(store), Arc::new(StaticEmbedder), RetryPolicy::immediate(3));
  let completion = Arc::new(ScriptedCompletion { reply: reply.map(String::from) });
  SuggestionEngine::new(retriever, completion, "llama-test", 3).with_memory(3)
}

pub fn lifecycle_with(
  engine: SuggestionEngine,
  log_path: &Path,
  window_names: &[&str],
) -> SuggestionLifecycle<RecordingSink> {
  let log = SuggestionLog::open(log_path).unwrap();
  let windows = window_names.iter().map(|w| w.to_string()).collect();
  SuggestionLifecycle::new(Session::new(engine, log, windows), RecordingSink::default())
}

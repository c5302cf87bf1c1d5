use anyhow::{Context, Result};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cli::display::{format_record, format_stats};
use crate::cli::terminal::{forward_stdin, TerminalSink};
use crate::config::{Config, LogConfig};
use crate::embedding_client::HttpEmbedder;
use crate::engine::SuggestionEngine;
use crate::lifecycle::{Session, SuggestionLifecycle};
use crate::retry::RetryPolicy;
use crate::suggestion_log::{self, SuggestionLog};
use crate::vector_store::{self, VectorStoreAdapter};

const EVENT_QUEUE_DEPTH: usize = 32;

/// Explicit path first, then the default search locations
pub fn load_config(path: Option<&Path>) -> Result<Config> {
  let config = match path {
    Some(path) => Config::load_from_file(path),
    None => Config::load(),
  };
  config.context("failed to load configuration")
}

/// Interactive ghost-text session over stdin/stdout
pub async fn run_session(config_path: Option<&Path>, window: Option<String>) -> Result<()> {
  let config = load_config(config_path)?;
  let engine = SuggestionEngine::from_config(&config)?;
  let log = SuggestionLog::open(&config.log.path)
    .with_context(|| format!("failed to open {}", config.log.path.display()))?;

  // Without an explicit window every capture comes from the first tracked one
  let window_title = window
    .or_else(|| config.base.window_names.first().cloned())
    .unwrap_or_else(|| "terminal".to_string());

  bentley::info!(&format!(
    "session ready: model {}, vector store {}, log {}",
    engine.model_name(),
    engine.vector_store_kind(),
    log.path().display()
  ));
  println!(
    "{}",
    "Type SQL to capture. Enter or :accept accepts, :dismiss, :reset, :quit.".dimmed()
  );

  let session = Session::new(engine, log, config.base.window_names.clone());
  let mut lifecycle = SuggestionLifecycle::new(session, TerminalSink::stdout());

  let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
  let reader = tokio::spawn(forward_stdin(tx, window_title));
  lifecycle.run(rx).await;
  reader.await.context("stdin reader task failed")?;

  bentley::success!("session closed");
  Ok(())
}

/// One-shot generation
pub async fn suggest(config_path: Option<&Path>, text: &str) -> Result<()> {
  let config = load_config(config_path)?;
  let mut engine = SuggestionEngine::from_config(&config)?;

  let generation = engine.generate(text).await;
  if generation.failed {
    bentley::fail!("suggestion failed; see the log output for the cause");
  }
  println!("{}", generation.suggestion.green());
  println!("{}", format!("latency: {} ms", generation.latency_ms()).dimmed());
  Ok(())
}

/// Retrieval only; needs no completion credential
pub async fn search(config_path: Option<&Path>, text: &str, top_k: usize) -> Result<()> {
  let config = load_config(config_path)?;
  let embedder = Arc::new(HttpEmbedder::from_config(&config.embedding, &config.network)?);
  let store = vector_store::from_config(&config.vector_store, &config.network)?;
  let adapter = VectorStoreAdapter::new(store, embedder, RetryPolicy::from_config(&config.network))
    .with_min_relevance(config.vector_store.min_relevance);

  let records = adapter.search(text, top_k).await?;
  if records.is_empty() {
    println!("No similar examples found.");
    return Ok(());
  }

  for (i, record) in records.iter().enumerate() {
    println!("{}", format_record(i + 1, record));
  }
  Ok(())
}

/// Per-model acceptance and latency figures from the suggestion log
pub fn stats(config_path: Option<&Path>, log_path: Option<PathBuf>) -> Result<()> {
  let path = match log_path {
    Some(path) => path,
    None => load_config(config_path)
      .map(|config| config.log.path)
      .unwrap_or_else(|_| LogConfig::default().path),
  };

  let entries = suggestion_log::read_entries(&path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  if entries.is_empty() {
    println!("No suggestions logged yet.");
    return Ok(());
  }

  for model in suggestion_log::summarize(&entries) {
    println!("{}\n", format_stats(&model));
  }
  Ok(())
}

//! Retrieval-augmented suggestion generation
//!
//! One `generate` call runs the whole pipeline: schema snapshot, retrieval, context assembly,
//! completion, then session memory. Failures never escape; they collapse into [`SENTINEL`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::completion::{CompletionClient, GroqCompletionClient, UnavailableCompletion};
use crate::config::{BackendKind, Config};
use crate::context;
use crate::embedding_client::{Embedder, HttpEmbedder, UnavailableEmbedder};
use crate::error::Result;
use crate::memory::SessionMemory;
use crate::retry::RetryPolicy;
use crate::schema::{self, SchemaSource};
use crate::vector_store::{self, VectorStoreAdapter};

/// Ghost text shown when generation fails. Never stored in session memory.
pub const SENTINEL: &str = "(error generating suggestion)";

#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
  pub suggestion: String,
  pub retrieved_context: String,
  /// Retrieval plus completion; schema refresh is not counted
  pub latency: Duration,
  pub failed: bool,
}

impl Generation {
  pub fn latency_ms(&self) -> u64 {
    self.latency.as_millis() as u64
  }
}

pub struct SuggestionEngine {
  retriever: VectorStoreAdapter,
  completion: Arc<dyn CompletionClient>,
  model_name: String,
  top_k: usize,
  schema: Option<Box<dyn SchemaSource>>,
  refresh_schema: bool,
  schema_cache: Option<String>,
  memory: Option<SessionMemory>,
}

impl SuggestionEngine {
  pub fn new(
    retriever: VectorStoreAdapter,
    completion: Arc<dyn CompletionClient>,
    model_name: impl Into<String>,
    top_k: usize,
  ) -> Self {
    Self {
      retriever,
      completion,
      model_name: model_name.into(),
      top_k,
      schema: None,
      refresh_schema: true,
      schema_cache: None,
      memory: None,
    }
  }

  pub fn with_schema(mut self, source: Box<dyn SchemaSource>, refresh: bool) -> Self {
    self.schema = Some(source);
    self.refresh_schema = refresh;
    self
  }

  pub fn with_memory(mut self, limit: usize) -> Self {
    self.memory = Some(SessionMemory::new(limit));
    self
  }

  /// Wire every production collaborator named by the configuration.
  ///
  /// Missing credentials do not fail here: the affected collaborator is replaced by one that
  /// reports the problem on every call, so each capture displays the sentinel.
  pub fn from_config(config: &Config) -> Result<Self> {
    let retry = RetryPolicy::from_config(&config.network);
    let embedder: Arc<dyn Embedder> =
      match HttpEmbedder::from_config(&config.embedding, &config.network) {
        Ok(embedder) => Arc::new(embedder),
        Err(err) => {
          tracing::warn!(error = %err, "embedding service unavailable");
          Arc::new(UnavailableEmbedder::new(&config.embedding.model_name, err.message()))
        }
      };
    let store = vector_store::from_config(&config.vector_store, &config.network)?;
    let retriever = VectorStoreAdapter::new(store, embedder, retry)
      .with_min_relevance(config.vector_store.min_relevance);
    let completion: Arc<dyn CompletionClient> =
      match GroqCompletionClient::from_config(&config.llm, &config.network) {
        Ok(client) => Arc::new(client),
        Err(err) => {
          tracing::warn!(error = %err, "completion service unavailable");
          Arc::new(UnavailableCompletion::new(err.message()))
        }
      };

    let mut engine =
      Self::new(retriever, completion, &config.llm.model_name, config.vector_store.top_k);
    if let Some(source) = schema::from_config(&config.schema)? {
      engine = engine.with_schema(source, config.schema.refresh);
    }
    if config.memory.enabled {
      engine = engine.with_memory(config.memory.limit);
    }
    Ok(engine)
  }

  pub fn model_name(&self) -> &str {
    &self.model_name
  }

  pub fn vector_store_kind(&self) -> BackendKind {
    self.retriever.kind()
  }

  pub fn embedding_model(&self) -> &str {
    self.retriever.embedding_model()
  }

  pub fn memory(&self) -> Option<&SessionMemory> {
    self.memory.as_ref()
  }

  pub async fn generate(&mut self, user_input: &str) -> Generation {
    let schema_text = self.schema_snapshot().await;

    let started = Instant::now();
    let outcome = self.retrieve_and_complete(user_input, schema_text.as_deref()).await;
    let latency = started.elapsed();

    match outcome {
      Ok((suggestion, retrieved_context)) => {
        if let Some(memory) = self.memory.as_mut() {
          memory.push(user_input, &suggestion);
        }
        tracing::info!(latency_ms = latency.as_millis() as u64, "suggestion generated");
        Generation { suggestion, retrieved_context, latency, failed: false }
      }
      Err(err) => {
        tracing::error!(error = %err, "suggestion generation failed");
        Generation {
          suggestion: SENTINEL.to_string(),
          retrieved_context: String::new(),
          latency,
          failed: true,
        }
      }
    }
  }

  pub fn reset(&mut self) {
    if let Some(memory) = self.memory.as_mut() {
      memory.clear();
    }
    tracing::info!("session memory cleared");
  }

  async fn retrieve_and_complete(
    &self,
    user_input: &str,
    schema_text: Option<&str>,
  ) -> Result<(String, String)> {
    let records = self.retriever.search(user_input, self.top_k).await?;
    let history = self.memory.as_ref().map(SessionMemory::render);
    let context = context::build(&records, schema_text, history.as_deref());

    let suggestion = self.completion.complete(user_input, &context, &self.model_name).await?;
    Ok((suggestion, context))
  }

  /// Latest schema text; a failed refresh falls back to the last good snapshot
  async fn schema_snapshot(&mut self) -> Option<String> {
    let source = self.schema.as_ref()?;
    if !self.refresh_schema && self.schema_cache.is_some() {
      return self.schema_cache.clone();
    }

    match source.snapshot().await {
      Ok(text) => self.schema_cache = Some(text),
      Err(err) => tracing::warn!(error = %err, "schema refresh failed, using cached snapshot"),
    }
    self.schema_cache.clone()
  }
}

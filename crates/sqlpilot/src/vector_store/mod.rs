//! Vector store abstraction layer for example-query retrieval
//!
//! Each backend variant implements [`VectorStore`] over an already-embedded query. The
//! [`VectorStoreAdapter`] embeds the query text once, applies the retry policy, normalizes
//! ranking across score polarities and enforces the `top_k` bound.

pub mod collection_store;
pub mod flat_index;
pub mod managed_index;
pub mod metadata;

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::{BackendConfig, BackendKind, NetworkConfig, VectorStoreConfig};
use crate::embedding_client::Embedder;
use crate::error::{Disposition, PilotError, Result};
use crate::retry::RetryPolicy;

pub use collection_store::CollectionStoreBackend;
pub use flat_index::FlatIndexBackend;
pub use managed_index::ManagedIndexBackend;
pub use metadata::{ExampleRecord, MetadataTable};

/// Whether a backend's raw score grows or shrinks with relevance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScorePolarity {
  /// Smaller is better (L2 distance)
  Distance,
  /// Larger is better (cosine / dot-product score)
  Similarity,
}

/// One retrieved example with its raw backend score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
  pub prompt: String,
  pub sql: String,
  pub explanation: Option<String>,
  /// Raw value as reported by the backend; see `polarity`
  pub similarity_score: f32,
  pub polarity: ScorePolarity,
}

impl ScoredRecord {
  /// Polarity-normalized score where higher always means more relevant
  pub fn relevance(&self) -> f32 {
    match self.polarity {
      ScorePolarity::Similarity => self.similarity_score,
      ScorePolarity::Distance => 1.0 / (1.0 + self.similarity_score.max(0.0)),
    }
  }
}

/// Similarity search over a pre-built store of example queries
#[async_trait]
pub trait VectorStore: Send + Sync {
  /// Return up to `top_k` records nearest to `query`, best first
  async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>>;

  fn kind(&self) -> BackendKind;
}

/// Type-erased wrapper for VectorStore implementations
pub struct BoxedVectorStore(Box<dyn VectorStore>);

impl BoxedVectorStore {
  pub fn new<T: VectorStore + 'static>(store: T) -> Self {
    Self(Box::new(store))
  }
}

#[async_trait]
impl VectorStore for BoxedVectorStore {
  async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>> {
    self.0.search_vector(query, top_k).await
  }

  fn kind(&self) -> BackendKind {
    self.0.kind()
  }
}

/// Stands in for a backend whose credential was missing at startup.
///
/// Every search fails with the stored configuration error, so the session keeps running and
/// each capture shows the failure instead of the process exiting.
pub struct UnavailableStore {
  kind: BackendKind,
  reason: String,
}

impl UnavailableStore {
  pub fn new(kind: BackendKind, reason: impl Into<String>) -> Self {
    Self { kind, reason: reason.into() }
  }
}

#[async_trait]
impl VectorStore for UnavailableStore {
  async fn search_vector(&self, _query: &[f32], _top_k: usize) -> Result<Vec<ScoredRecord>> {
    Err(PilotError::configuration(self.reason.clone()))
  }

  fn kind(&self) -> BackendKind {
    self.kind
  }
}

/// Open the single backend variant named by the configuration
pub fn from_config(config: &VectorStoreConfig, network: &NetworkConfig) -> Result<BoxedVectorStore> {
  let store = match &config.backend {
    BackendConfig::FlatIndex { index_path, metadata_path, dimension } => {
      BoxedVectorStore::new(FlatIndexBackend::open(index_path, metadata_path, *dimension)?)
    }
    BackendConfig::ManagedIndex { host, namespace, metadata_path, api_key_env } => {
      match managed_index::read_credential(api_key_env) {
        Ok(api_key) => BoxedVectorStore::new(ManagedIndexBackend::new(
          host,
          namespace,
          api_key,
          MetadataTable::load(metadata_path)?,
          network.timeout(),
        )?),
        Err(err) => {
          tracing::warn!(error = %err, "managed index unavailable until the credential is set");
          BoxedVectorStore::new(UnavailableStore::new(BackendKind::ManagedIndex, err.message()))
        }
      }
    }
    BackendConfig::CollectionStore { path, collection } => {
      BoxedVectorStore::new(CollectionStoreBackend::open(path, collection)?)
    }
  };

  tracing::info!(kind = %store.kind(), "vector store ready");
  Ok(store)
}

/// Uniform `search(text, k)` over any backend variant
pub struct VectorStoreAdapter {
  store: BoxedVectorStore,
  embedder: Arc<dyn Embedder>,
  retry: RetryPolicy,
  min_relevance: Option<f32>,
}

impl VectorStoreAdapter {
  pub fn new(store: BoxedVectorStore, embedder: Arc<dyn Embedder>, retry: RetryPolicy) -> Self {
    Self { store, embedder, retry, min_relevance: None }
  }

  pub fn with_min_relevance(mut self, min_relevance: Option<f32>) -> Self {
    self.min_relevance = min_relevance;
    self
  }

  pub fn kind(&self) -> BackendKind {
    self.store.kind()
  }

  pub fn embedding_model(&self) -> &str {
    self.embedder.model_name()
  }

  /// Embed `query_text` once and return at most `top_k` records, most relevant first
  pub async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<ScoredRecord>> {
    if top_k == 0 {
      return Ok(Vec::new());
    }

    let embedder = &self.embedder;
    let query = self.retry.run("embed query", || embedder.embed(query_text)).await?;

    let store = &self.store;
    let query_ref = query.as_slice();
    let mut records =
      self.retry.run("vector search", || store.search_vector(query_ref, top_k)).await?;

    rank_by_relevance(&mut records);
    if let Some(floor) = self.min_relevance {
      records.retain(|r| r.relevance() >= floor);
    }
    records.truncate(top_k);

    tracing::debug!(kind = %self.kind(), hits = records.len(), "retrieved examples");
    Ok(records)
  }
}

/// Stable sort, most relevant first
pub fn rank_by_relevance(records: &mut [ScoredRecord]) {
  records.sort_by(|a, b| b.relevance().partial_cmp(&a.relevance()).unwrap_or(Ordering::Equal));
}

/// Squared euclidean distance, the metric exact L2 indexes report
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
  a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub(crate) fn dimension_mismatch(expected: usize, actual: usize) -> PilotError {
  PilotError::retrieval(
    format!("query vector has dimension {actual}, index expects {expected}"),
    Disposition::Fatal,
  )
}

//! Remote managed similarity index queried over HTTPS by namespace

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::BackendKind;
use crate::error::{disposition_for_status, disposition_for_transport, Disposition, PilotError, Result};

use super::{MetadataTable, ScorePolarity, ScoredRecord, VectorStore};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
  vector: &'a [f32],
  top_k: usize,
  namespace: &'a str,
  include_metadata: bool,
  include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
  #[serde(default)]
  matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
  id: String,
  score: f32,
}

/// Pinecone-compatible index client.
///
/// Makes one attempt per search; transient failures are classified for the caller's retry
/// policy. Match ids look like `id-42` and index the local metadata table.
pub struct ManagedIndexBackend {
  client: Client,
  query_url: String,
  namespace: String,
  api_key: String,
  metadata: MetadataTable,
  request_timeout: Duration,
}

impl ManagedIndexBackend {
  pub fn new(
    host: &str,
    namespace: &str,
    api_key: String,
    metadata: MetadataTable,
    request_timeout: Duration,
  ) -> Result<Self> {
    let client = Client::builder()
      .timeout(request_timeout)
      .build()
      .map_err(|e| PilotError::configuration(format!("failed to create HTTP client: {e}")))?;

    Ok(Self {
      client,
      query_url: format!("{}/query", normalize_host(host)),
      namespace: namespace.to_string(),
      api_key,
      metadata,
      request_timeout,
    })
  }

  async fn query(&self, vector: &[f32], top_k: usize) -> Result<QueryResponse> {
    let body = QueryRequest {
      vector,
      top_k,
      namespace: &self.namespace,
      include_metadata: false,
      include_values: false,
    };

    let send = self.client.post(&self.query_url).header("Api-Key", &self.api_key).json(&body).send();
    let response = timeout(self.request_timeout, send)
      .await
      .map_err(|_| PilotError::retrieval("managed index query timed out", Disposition::Transient))?
      .map_err(|e| {
        PilotError::retrieval(format!("managed index query failed: {e}"), disposition_for_transport(&e))
      })?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(PilotError::retrieval(
        format!("managed index returned {status}: {text}"),
        disposition_for_status(status),
      ));
    }

    response.json().await.map_err(|e| {
      PilotError::retrieval(format!("invalid managed index response: {e}"), Disposition::Fatal)
    })
  }
}

#[async_trait]
impl VectorStore for ManagedIndexBackend {
  async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>> {
    if top_k == 0 {
      return Ok(Vec::new());
    }

    let response = self.query(query, top_k).await?;
    let mut records = Vec::with_capacity(response.matches.len());

    for hit in response.matches.into_iter().take(top_k) {
      match parse_match_index(&hit.id).and_then(|i| self.metadata.get(i)) {
        Some(example) => records.push(example.scored(hit.score, ScorePolarity::Similarity)),
        None => tracing::warn!(id = %hit.id, "managed index match has no metadata row, skipping"),
      }
    }

    Ok(records)
  }

  fn kind(&self) -> BackendKind {
    BackendKind::ManagedIndex
  }
}

/// The index API key, or a configuration error naming the variable
pub fn read_credential(api_key_env: &str) -> Result<String> {
  std::env::var(api_key_env)
    .ok()
    .filter(|key| !key.trim().is_empty())
    .ok_or_else(|| {
      PilotError::configuration(format!("managed index credential {api_key_env} is not set"))
    })
}

fn normalize_host(host: &str) -> String {
  let host = host.trim_end_matches('/');
  if host.starts_with("http://") || host.starts_with("https://") {
    host.to_string()
  } else {
    format!("https://{host}")
  }
}

/// `id-42` -> 42
fn parse_match_index(id: &str) -> Option<usize> {
  id.rsplit('-').next().and_then(|n| n.parse().ok())
}

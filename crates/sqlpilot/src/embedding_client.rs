use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

use crate::config::{EmbeddingConfig, NetworkConfig};
use crate::error::{disposition_for_status, disposition_for_transport, Disposition, PilotError, Result};

/// Turns query text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>>;

  /// Identifier recorded in the suggestion log
  fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Makes exactly one attempt per call; the vector store adapter owns the retry policy.
pub struct HttpEmbedder {
  client: Client,
  base_url: String,
  model: String,
  api_key: Option<String>,
  request_timeout: Duration,
}

impl HttpEmbedder {
  pub fn from_config(embedding: &EmbeddingConfig, network: &NetworkConfig) -> Result<Self> {
    let api_key = match &embedding.api_key_env {
      Some(var) => Some(std::env::var(var).map_err(|_| {
        PilotError::configuration(format!("embedding credential {var} is not set"))
      })?),
      None => None,
    };

    Self::new(&embedding.base_url, &embedding.model_name, api_key, network.timeout())
  }

  pub fn new(
    base_url: &str,
    model: &str,
    api_key: Option<String>,
    request_timeout: Duration,
  ) -> Result<Self> {
    let client = Client::builder()
      .timeout(request_timeout)
      .build()
      .map_err(|e| PilotError::configuration(format!("failed to create HTTP client: {e}")))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      model: model.to_string(),
      api_key,
      request_timeout,
    })
  }
}

#[async_trait]
impl Embedder for HttpEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    let url = format!("{}/embeddings", self.base_url);
    let mut request = self.client.post(&url).json(&EmbeddingRequest { model: &self.model, input: text });
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = timeout(self.request_timeout, request.send())
      .await
      .map_err(|_| PilotError::retrieval("embedding request timed out", Disposition::Transient))?
      .map_err(|e| {
        PilotError::retrieval(format!("embedding request failed: {e}"), disposition_for_transport(&e))
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(PilotError::retrieval(
        format!("embedding service returned {status}: {body}"),
        disposition_for_status(status),
      ));
    }

    let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
      PilotError::retrieval(format!("invalid embedding response: {e}"), Disposition::Fatal)
    })?;

    parsed
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| PilotError::retrieval("embedding response was empty", Disposition::Fatal))
  }

  fn model_name(&self) -> &str {
    &self.model
  }
}

/// Placeholder used when the embedding credential is missing; every call fails with it
pub struct UnavailableEmbedder {
  model: String,
  reason: String,
}

impl UnavailableEmbedder {
  pub fn new(model: &str, reason: impl Into<String>) -> Self {
    Self { model: model.to_string(), reason: reason.into() }
  }
}

#[async_trait]
impl Embedder for UnavailableEmbedder {
  async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
    Err(PilotError::configuration(self.reason.clone()))
  }

  fn model_name(&self) -> &str {
    &self.model
  }
}

//! Chat-completion client that turns user input plus retrieved context into one SQL statement

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::{LlmConfig, NetworkConfig};
use crate::error::{disposition_for_status, disposition_for_transport, Disposition, PilotError, Result};
use crate::retry::RetryPolicy;

const SYSTEM_PROMPT: &str = "You are an expert SQL assistant. Only return valid SQL code. \
Do not include explanations, markdown formatting, code fences or comments. \
Return a single SQL statement.";

static SQL_START: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"(?is)\b(select|insert|update|delete|with|create|drop|alter)\b.+")
    .expect("SQL keyword pattern is a valid regex")
});

/// Language-model collaborator
#[async_trait]
pub trait CompletionClient: Send + Sync {
  /// Return a single SQL statement for `user_input`, grounded on `context`
  async fn complete(&self, user_input: &str, context: &str, model_name: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
  #[serde(default)]
  choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
  message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
  #[serde(default)]
  content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client (Groq by default)
pub struct GroqCompletionClient {
  client: Client,
  base_url: String,
  api_key: String,
  temperature: f32,
  retry: RetryPolicy,
  request_timeout: Duration,
}

impl GroqCompletionClient {
  /// Reads the bearer token from `llm.api_key_env`; a missing token is a configuration error
  pub fn from_config(llm: &LlmConfig, network: &NetworkConfig) -> Result<Self> {
    let api_key = std::env::var(&llm.api_key_env)
      .ok()
      .filter(|key| !key.trim().is_empty())
      .ok_or_else(|| {
        PilotError::configuration(format!("completion credential {} is not set", llm.api_key_env))
      })?;

    Self::new(
      &llm.base_url,
      api_key,
      llm.temperature,
      RetryPolicy::from_config(network),
      network.timeout(),
    )
  }

  pub fn new(
    base_url: &str,
    api_key: String,
    temperature: f32,
    retry: RetryPolicy,
    request_timeout: Duration,
  ) -> Result<Self> {
    let client = Client::builder()
      .timeout(request_timeout)
      .build()
      .map_err(|e| PilotError::configuration(format!("failed to create HTTP client: {e}")))?;

    Ok(Self {
      client,
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
      temperature,
      retry,
      request_timeout,
    })
  }

  async fn request(&self, body: &ChatRequest<'_>) -> Result<String> {
    let url = format!("{}/chat/completions", self.base_url);
    let send = self.client.post(&url).bearer_auth(&self.api_key).json(body).send();

    let response = timeout(self.request_timeout, send)
      .await
      .map_err(|_| PilotError::completion("completion request timed out", Disposition::Transient))?
      .map_err(|e| {
        PilotError::completion(format!("completion request failed: {e}"), disposition_for_transport(&e))
      })?;

    let status = response.status();
    if !status.is_success() {
      let text = response.text().await.unwrap_or_default();
      return Err(PilotError::completion(
        format!("completion service returned {status}: {text}"),
        disposition_for_status(status),
      ));
    }

    let parsed: ChatResponse = response.json().await.map_err(|e| {
      PilotError::completion(format!("invalid completion response: {e}"), Disposition::Fatal)
    })?;

    parsed
      .choices
      .into_iter()
      .next()
      .and_then(|choice| choice.message.content)
      .ok_or_else(|| PilotError::completion("completion response had no content", Disposition::Fatal))
  }
}

#[async_trait]
impl CompletionClient for GroqCompletionClient {
  async fn complete(&self, user_input: &str, context: &str, model_name: &str) -> Result<String> {
    let user_message = format!("Context:\n{context}\n\nUser Input:\n{user_input}");
    let body = ChatRequest {
      model: model_name,
      messages: vec![
        ChatMessage { role: "system", content: SYSTEM_PROMPT },
        ChatMessage { role: "user", content: &user_message },
      ],
      temperature: self.temperature,
    };

    let raw = self.retry.run("chat completion", || self.request(&body)).await?;
    Ok(extract_sql(&raw))
  }
}

/// Placeholder used when the completion credential is missing; every call fails with it
pub struct UnavailableCompletion {
  reason: String,
}

impl UnavailableCompletion {
  pub fn new(reason: impl Into<String>) -> Self {
    Self { reason: reason.into() }
  }
}

#[async_trait]
impl CompletionClient for UnavailableCompletion {
  async fn complete(&self, _user_input: &str, _context: &str, _model_name: &str) -> Result<String> {
    Err(PilotError::configuration(self.reason.clone()))
  }
}

/// Cut everything before the first SQL leading keyword; fall back to the trimmed text
pub fn extract_sql(raw: &str) -> String {
  match SQL_START.find(raw) {
    Some(found) => found.as_str().trim().to_string(),
    None => raw.trim().to_string(),
  }
}

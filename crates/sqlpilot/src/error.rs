//! Error kinds shared by every sqlpilot component

use thiserror::Error;

/// How the retry policy should treat a failed external call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
  /// Timeouts, connection resets, 5xx responses
  Transient,
  /// The service answered 429
  RateLimited,
  /// Anything retrying cannot fix
  Fatal,
}

impl Disposition {
  pub fn is_retryable(self) -> bool {
    !matches!(self, Disposition::Fatal)
  }
}

#[derive(Error, Debug)]
pub enum PilotError {
  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("Retrieval failed: {message}")]
  Retrieval { message: String, disposition: Disposition },

  #[error("Completion failed: {message}")]
  Completion { message: String, disposition: Disposition },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Log format error: {0}")]
  Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
  pub fn configuration(message: impl Into<String>) -> Self {
    Self::Configuration { message: message.into() }
  }

  pub fn retrieval(message: impl Into<String>, disposition: Disposition) -> Self {
    Self::Retrieval { message: message.into(), disposition }
  }

  pub fn completion(message: impl Into<String>, disposition: Disposition) -> Self {
    Self::Completion { message: message.into(), disposition }
  }

  /// The message without the variant prefix
  pub fn message(&self) -> String {
    match self {
      Self::Configuration { message }
      | Self::Retrieval { message, .. }
      | Self::Completion { message, .. } => message.clone(),
      other => other.to_string(),
    }
  }

  /// Retry classification; only retrieval and completion failures are ever retried
  pub fn disposition(&self) -> Disposition {
    match self {
      Self::Retrieval { disposition, .. } | Self::Completion { disposition, .. } => *disposition,
      _ => Disposition::Fatal,
    }
  }
}

/// Classify an HTTP status the way every collaborator client does
pub fn disposition_for_status(status: reqwest::StatusCode) -> Disposition {
  if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
    Disposition::RateLimited
  } else if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
    Disposition::Transient
  } else {
    Disposition::Fatal
  }
}

/// Classify a transport-level reqwest failure
pub fn disposition_for_transport(err: &reqwest::Error) -> Disposition {
  if err.is_timeout() || err.is_connect() || err.is_request() {
    Disposition::Transient
  } else {
    match err.status() {
      Some(status) => disposition_for_status(status),
      None => Disposition::Fatal,
    }
  }
}

//! Append-only CSV log of suggestion outcomes
//!
//! One row per accepted or dismissed suggestion. Text fields are backslash-escaped so every row
//! stays on a single physical line, and each row reaches the file through a single `write_all`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PilotError, Result};

/// Column order for schema version 1
pub const HEADER: [&str; 9] = [
  "timestamp",
  "model",
  "status",
  "user_input",
  "retrieved_context",
  "llm_suggestion",
  "latency_ms",
  "vector_store",
  "embedding_model",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
  Accepted,
  Dismissed,
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Status::Accepted => write!(f, "ACCEPTED"),
      Status::Dismissed => write!(f, "DISMISSED"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
  pub timestamp: DateTime<Utc>,
  pub model_name: String,
  pub status: Status,
  pub user_input: String,
  pub retrieved_context: String,
  pub suggestion: String,
  pub latency_ms: u64,
  pub vector_store_kind: String,
  pub embedding_model: String,
}

/// On-disk shape of a row; field order must match `HEADER`
#[derive(Serialize, Deserialize)]
struct LogRow {
  timestamp: DateTime<Utc>,
  model: String,
  status: Status,
  user_input: String,
  retrieved_context: String,
  llm_suggestion: String,
  latency_ms: u64,
  vector_store: String,
  embedding_model: String,
}

impl From<&LogEntry> for LogRow {
  fn from(entry: &LogEntry) -> Self {
    Self {
      timestamp: entry.timestamp,
      model: escape(&entry.model_name),
      status: entry.status,
      user_input: escape(&entry.user_input),
      retrieved_context: escape(&entry.retrieved_context),
      llm_suggestion: escape(&entry.suggestion),
      latency_ms: entry.latency_ms,
      vector_store: escape(&entry.vector_store_kind),
      embedding_model: escape(&entry.embedding_model),
    }
  }
}

impl From<LogRow> for LogEntry {
  fn from(row: LogRow) -> Self {
    Self {
      timestamp: row.timestamp,
      model_name: unescape(&row.model),
      status: row.status,
      user_input: unescape(&row.user_input),
      retrieved_context: unescape(&row.retrieved_context),
      suggestion: unescape(&row.llm_suggestion),
      latency_ms: row.latency_ms,
      vector_store_kind: unescape(&row.vector_store),
      embedding_model: unescape(&row.embedding_model),
    }
  }
}

pub struct SuggestionLog {
  path: PathBuf,
  file: File,
}

impl SuggestionLog {
  /// Open for appending, creating the file and its header when absent
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }

    let has_content = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    if has_content {
      check_header(&path)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if !has_content {
      file.write_all(format!("{}\n", HEADER.join(",")).as_bytes())?;
      file.flush()?;
      tracing::debug!(path = %path.display(), "created suggestion log");
    }

    Ok(Self { path, file })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Serialize the row in memory, then write it with one `write_all`
  pub fn append(&mut self, entry: &LogEntry) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.serialize(LogRow::from(entry))?;
    let bytes = writer.into_inner().map_err(|e| PilotError::Io(e.into_error()))?;

    self.file.write_all(&bytes)?;
    self.file.flush()?;
    Ok(())
  }

  pub fn read_all(&self) -> Result<Vec<LogEntry>> {
    read_entries(&self.path)
  }
}

/// Parse every row of a log file without opening it for writing
pub fn read_entries(path: &Path) -> Result<Vec<LogEntry>> {
  check_header(path)?;
  let mut reader = csv::Reader::from_path(path)?;
  reader
    .deserialize::<LogRow>()
    .map(|row| row.map(LogEntry::from).map_err(PilotError::from))
    .collect()
}

fn check_header(path: &Path) -> Result<()> {
  let mut reader = csv::Reader::from_path(path)?;
  let headers = reader.headers()?;
  if headers.iter().ne(HEADER.iter().copied()) {
    return Err(PilotError::configuration(format!(
      "{} has an unexpected header; expected {}",
      path.display(),
      HEADER.join(",")
    )));
  }
  Ok(())
}

pub fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '\\' => out.push_str("\\\\"),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      _ => out.push(c),
    }
  }
  out
}

pub fn unescape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut chars = text.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('\\') => out.push('\\'),
      Some(other) => {
        out.push('\\');
        out.push(other);
      }
      None => out.push('\\'),
    }
  }
  out
}

/// Acceptance and latency figures for one model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelStats {
  pub model_name: String,
  pub total: usize,
  pub accepted: usize,
  pub dismissed: usize,
  pub avg_latency_ms: f64,
  pub min_latency_ms: u64,
  pub max_latency_ms: u64,
}

impl ModelStats {
  pub fn acceptance_rate(&self) -> f64 {
    self.accepted as f64 / self.total as f64
  }

  pub fn rejection_rate(&self) -> f64 {
    self.dismissed as f64 / self.total as f64
  }
}

/// Per-model statistics, ordered by model name
pub fn summarize(entries: &[LogEntry]) -> Vec<ModelStats> {
  let mut by_model: BTreeMap<&str, Vec<&LogEntry>> = BTreeMap::new();
  for entry in entries {
    by_model.entry(entry.model_name.as_str()).or_default().push(entry);
  }

  by_model
    .into_iter()
    .map(|(model, rows)| {
      let latencies: Vec<u64> = rows.iter().map(|r| r.latency_ms).collect();
      let accepted = rows.iter().filter(|r| r.status == Status::Accepted).count();
      ModelStats {
        model_name: model.to_string(),
        total: rows.len(),
        accepted,
        dismissed: rows.len() - accepted,
        avg_latency_ms: latencies.iter().sum::<u64>() as f64 / latencies.len() as f64,
        min_latency_ms: latencies.iter().copied().min().unwrap_or(0),
        max_latency_ms: latencies.iter().copied().max().unwrap_or(0),
      }
    })
    .collect()
}

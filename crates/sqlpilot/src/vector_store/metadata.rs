//! Example-query metadata table shared by the flat and managed index backends

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PilotError, Result};

use super::{ScorePolarity, ScoredRecord};

/// One row of the example dataset, joined to index hits by position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleRecord {
  pub sql_prompt: String,
  pub sql: String,
  #[serde(default)]
  pub sql_explanation: Option<String>,
  /// Columns the core does not interpret (domain, complexity, ...)
  #[serde(flatten)]
  pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ExampleRecord {
  pub fn new(sql_prompt: &str, sql: &str, sql_explanation: Option<&str>) -> Self {
    Self {
      sql_prompt: sql_prompt.to_string(),
      sql: sql.to_string(),
      sql_explanation: sql_explanation.map(str::to_string),
      extra: serde_json::Map::new(),
    }
  }

  pub fn scored(&self, similarity_score: f32, polarity: ScorePolarity) -> ScoredRecord {
    ScoredRecord {
      prompt: self.sql_prompt.clone(),
      sql: self.sql.clone(),
      explanation: self.sql_explanation.clone(),
      similarity_score,
      polarity,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataTable {
  records: Vec<ExampleRecord>,
}

impl MetadataTable {
  pub fn new(records: Vec<ExampleRecord>) -> Self {
    Self { records }
  }

  /// Load a JSON array of example records
  pub fn load(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path).map_err(|e| {
      PilotError::configuration(format!("cannot read metadata {}: {e}", path.display()))
    })?;
    let records: Vec<ExampleRecord> = serde_json::from_str(&content).map_err(|e| {
      PilotError::configuration(format!("invalid metadata {}: {e}", path.display()))
    })?;

    tracing::debug!(path = %path.display(), entries = records.len(), "loaded metadata");
    Ok(Self { records })
  }

  pub fn get(&self, index: usize) -> Option<&ExampleRecord> {
    self.records.get(index)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

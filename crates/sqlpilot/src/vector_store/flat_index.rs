//! Exact nearest-neighbour search over an in-memory flat index

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::BackendKind;
use crate::error::{PilotError, Result};

use super::{dimension_mismatch, l2_distance, MetadataTable, ScorePolarity, ScoredRecord, VectorStore};

/// On-disk layout written by the offline index builder
#[derive(Debug, Serialize, Deserialize)]
pub struct FlatIndexFile {
  pub dimension: usize,
  pub vectors: Vec<Vec<f32>>,
}

/// Loads the index and its parallel metadata array once, then searches by brute-force L2.
///
/// `similarity_score` is the raw squared distance: smaller is better.
pub struct FlatIndexBackend {
  dimension: usize,
  vectors: Vec<Vec<f32>>,
  metadata: MetadataTable,
}

impl FlatIndexBackend {
  pub fn open(
    index_path: &Path,
    metadata_path: &Path,
    expected_dimension: Option<usize>,
  ) -> Result<Self> {
    let content = std::fs::read_to_string(index_path).map_err(|e| {
      PilotError::configuration(format!("cannot read index {}: {e}", index_path.display()))
    })?;
    let index: FlatIndexFile = serde_json::from_str(&content).map_err(|e| {
      PilotError::configuration(format!("invalid index {}: {e}", index_path.display()))
    })?;

    if let Some(expected) = expected_dimension {
      if expected != index.dimension {
        return Err(PilotError::configuration(format!(
          "index dimension {} does not match configured dimension {expected}",
          index.dimension
        )));
      }
    }

    let metadata = MetadataTable::load(metadata_path)?;
    Self::from_parts(index.dimension, index.vectors, metadata)
  }

  pub fn from_parts(
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    metadata: MetadataTable,
  ) -> Result<Self> {
    if vectors.len() != metadata.len() {
      return Err(PilotError::configuration(format!(
        "index holds {} vectors but metadata holds {} records",
        vectors.len(),
        metadata.len()
      )));
    }
    if let Some(position) = vectors.iter().position(|v| v.len() != dimension) {
      return Err(PilotError::configuration(format!(
        "index vector {position} does not have dimension {dimension}"
      )));
    }

    Ok(Self { dimension, vectors, metadata })
  }

  pub fn len(&self) -> usize {
    self.vectors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.vectors.is_empty()
  }
}

#[async_trait]
impl VectorStore for FlatIndexBackend {
  async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>> {
    if query.len() != self.dimension {
      return Err(dimension_mismatch(self.dimension, query.len()));
    }

    let mut hits: Vec<(usize, f32)> =
      self.vectors.iter().enumerate().map(|(i, v)| (i, l2_distance(query, v))).collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1));
    hits.truncate(top_k);

    Ok(
      hits
        .into_iter()
        .filter_map(|(i, distance)| {
          self.metadata.get(i).map(|example| example.scored(distance, ScorePolarity::Distance))
        })
        .collect(),
    )
  }

  fn kind(&self) -> BackendKind {
    BackendKind::FlatIndex
  }
}

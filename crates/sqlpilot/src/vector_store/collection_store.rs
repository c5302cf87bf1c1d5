//! Local persistent collection store backed by SQLite
//!
//! Each collection is a table whose rows carry the example metadata next to the embedding,
//! so hits need no separate metadata lookup.

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::BackendKind;
use crate::error::{Disposition, PilotError, Result};

use super::{dimension_mismatch, l2_distance, ScorePolarity, ScoredRecord, VectorStore};

pub struct CollectionStoreBackend {
  conn: Arc<Mutex<Connection>>,
  collection: String,
}

impl CollectionStoreBackend {
  /// Open an existing collection; a missing file or table is a configuration error
  pub fn open(path: &Path, collection: &str) -> Result<Self> {
    validate_collection_name(collection)?;
    if !path.exists() {
      return Err(PilotError::configuration(format!(
        "collection store {} does not exist",
        path.display()
      )));
    }

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
      .map_err(|e| PilotError::configuration(format!("cannot open {}: {e}", path.display())))?;

    let exists: Option<String> = conn
      .query_row(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![collection],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| PilotError::configuration(format!("cannot inspect collection store: {e}")))?;
    if exists.is_none() {
      return Err(PilotError::configuration(format!(
        "collection '{collection}' not found in {}",
        path.display()
      )));
    }

    Ok(Self { conn: Arc::new(Mutex::new(conn)), collection: collection.to_string() })
  }
}

/// Full-table L2 scan, run on the blocking pool
fn scan(
  conn: &Mutex<Connection>,
  collection: &str,
  query: &[f32],
  top_k: usize,
) -> Result<Vec<ScoredRecord>> {
  let conn = conn
    .lock()
    .map_err(|_| PilotError::retrieval("collection store lock poisoned", Disposition::Fatal))?;

  let sql = format!("SELECT prompt, sql, explanation, embedding FROM {collection}");
  let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
  let rows = stmt
    .query_map([], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
        row.get::<_, Vec<u8>>(3)?,
      ))
    })
    .map_err(query_failed)?;

  let mut records = Vec::new();
  for row in rows {
    let (prompt, sql, explanation, blob) = row.map_err(query_failed)?;
    let embedding = blob_to_embedding(&blob);
    if embedding.len() != query.len() {
      return Err(dimension_mismatch(embedding.len(), query.len()));
    }

    records.push(ScoredRecord {
      prompt,
      sql,
      explanation,
      similarity_score: l2_distance(query, &embedding),
      polarity: ScorePolarity::Distance,
    });
  }

  records.sort_by(|a, b| a.similarity_score.total_cmp(&b.similarity_score));
  records.truncate(top_k);
  Ok(records)
}

#[async_trait]
impl VectorStore for CollectionStoreBackend {
  async fn search_vector(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>> {
    if top_k == 0 {
      return Ok(Vec::new());
    }

    let conn = Arc::clone(&self.conn);
    let collection = self.collection.clone();
    let query = query.to_vec();
    tokio::task::spawn_blocking(move || scan(&conn, &collection, &query, top_k))
      .await
      .map_err(|e| PilotError::retrieval(format!("collection scan panicked: {e}"), Disposition::Fatal))?
  }

  fn kind(&self) -> BackendKind {
    BackendKind::CollectionStore
  }
}

/// Create the collection table if needed. Used by ingest tooling and tests.
pub fn create_collection(conn: &Connection, collection: &str) -> Result<()> {
  validate_collection_name(collection)?;
  conn
    .execute_batch(&format!(
      "CREATE TABLE IF NOT EXISTS {collection} (
         id TEXT PRIMARY KEY,
         prompt TEXT NOT NULL,
         sql TEXT NOT NULL,
         explanation TEXT,
         embedding BLOB NOT NULL
       )"
    ))
    .map_err(|e| PilotError::configuration(format!("cannot create collection: {e}")))
}

/// Insert or replace one example with its embedding
pub fn add_example(
  conn: &Connection,
  collection: &str,
  id: &str,
  prompt: &str,
  sql: &str,
  explanation: Option<&str>,
  embedding: &[f32],
) -> Result<()> {
  validate_collection_name(collection)?;
  conn
    .execute(
      &format!(
        "INSERT OR REPLACE INTO {collection} (id, prompt, sql, explanation, embedding)
         VALUES (?1, ?2, ?3, ?4, ?5)"
      ),
      params![id, prompt, sql, explanation, embedding_to_blob(embedding)],
    )
    .map_err(|e| PilotError::configuration(format!("cannot insert example {id}: {e}")))?;
  Ok(())
}

/// Table names are interpolated into SQL, so only identifiers are accepted
fn validate_collection_name(name: &str) -> Result<()> {
  let valid = !name.is_empty()
    && !name.starts_with(|c: char| c.is_ascii_digit())
    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
  if valid {
    Ok(())
  } else {
    Err(PilotError::configuration(format!("invalid collection name '{name}'")))
  }
}

fn query_failed(e: rusqlite::Error) -> PilotError {
  PilotError::retrieval(format!("collection query failed: {e}"), Disposition::Fatal)
}

pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
  embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
  blob.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  fn seeded_store(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("collection.db");
    let conn = Connection::open(&path).unwrap();
    create_collection(&conn, "sql_examples").unwrap();
    add_example(&conn, "sql_examples", "id_0", "list orders", "SELECT * FROM orders", None, &[1.0, 0.0])
      .unwrap();
    add_example(
      &conn,
      "sql_examples",
      "id_1",
      "count users",
      "SELECT COUNT(*) FROM users",
      Some("counts users"),
      &[0.0, 1.0],
    )
    .unwrap();
    path
  }

  #[test]
  fn test_blob_round_trip() {
    let v = vec![0.5, -1.25, 3.0];
    assert_eq!(blob_to_embedding(&embedding_to_blob(&v)), v);
  }

  #[tokio::test]
  async fn test_search_returns_stored_metadata_by_ascending_distance() {
    let dir = TempDir::new().unwrap();
    let store = CollectionStoreBackend::open(&seeded_store(&dir), "sql_examples").unwrap();

    let hits = store.search_vector(&[0.1, 0.9], 5).await.unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].prompt, "count users");
    assert_eq!(hits[0].explanation.as_deref(), Some("counts users"));
    assert!(hits[0].similarity_score < hits[1].similarity_score);
    assert!(store.search_vector(&[0.1, 0.9], 0).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_dimension_mismatch() {
    let dir = TempDir::new().unwrap();
    let store = CollectionStoreBackend::open(&seeded_store(&dir), "sql_examples").unwrap();

    let err = store.search_vector(&[0.1, 0.9, 0.3], 1).await.unwrap_err();
    assert!(matches!(err, PilotError::Retrieval { .. }));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_concurrent_scans_share_the_connection() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CollectionStoreBackend::open(&seeded_store(&dir), "sql_examples").unwrap());

    let handles: Vec<_> = (0..4)
      .map(|_| {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.search_vector(&[1.0, 0.0], 1).await })
      })
      .collect();

    for handle in handles {
      let hits = handle.await.unwrap().unwrap();
      assert_eq!(hits.len(), 1);
      assert_eq!(hits[0].prompt, "list orders");
    }
  }

  #[test]
  fn test_open_rejects_missing_collection_and_bad_names() {
    let dir = TempDir::new().unwrap();
    let path = seeded_store(&dir);

    assert!(CollectionStoreBackend::open(&path, "other").is_err());
    assert!(CollectionStoreBackend::open(&path, "x; DROP TABLE y").is_err());
    assert!(CollectionStoreBackend::open(&dir.path().join("missing.db"), "sql_examples").is_err());
  }
}

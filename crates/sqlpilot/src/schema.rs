//! Database schema snapshots folded into the prompt context

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use crate::config::{SchemaConfig, SchemaSourceKind};
use crate::error::{PilotError, Result};

/// Produces a textual description of the target database
#[async_trait]
pub trait SchemaSource: Send + Sync {
  async fn snapshot(&self) -> Result<String>;
}

/// Build the configured schema source, if any
pub fn from_config(config: &SchemaConfig) -> Result<Option<Box<dyn SchemaSource>>> {
  let path = match (config.source, &config.path) {
    (SchemaSourceKind::None, _) => return Ok(None),
    (_, Some(path)) => path.clone(),
    (_, None) => {
      return Err(PilotError::configuration("schema.path is required when schema.source is set"))
    }
  };

  let source: Box<dyn SchemaSource> = match config.source {
    SchemaSourceKind::File => Box::new(FileSchemaSource::new(path)),
    _ => Box::new(SqliteSchemaSource::new(path, config.sample_rows)),
  };
  Ok(Some(source))
}

/// A schema dump maintained by hand or exported by another tool
pub struct FileSchemaSource {
  path: PathBuf,
}

impl FileSchemaSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }
}

#[async_trait]
impl SchemaSource for FileSchemaSource {
  async fn snapshot(&self) -> Result<String> {
    tokio::fs::read_to_string(&self.path).await.map_err(|e| {
      PilotError::configuration(format!("cannot read schema file {}: {e}", self.path.display()))
    })
  }
}

/// Introspects a SQLite database: columns with declared types plus a few sample rows per table
pub struct SqliteSchemaSource {
  path: PathBuf,
  sample_rows: usize,
}

impl SqliteSchemaSource {
  pub fn new(path: impl Into<PathBuf>, sample_rows: usize) -> Self {
    Self { path: path.into(), sample_rows }
  }
}

#[async_trait]
impl SchemaSource for SqliteSchemaSource {
  async fn snapshot(&self) -> Result<String> {
    let path = self.path.clone();
    let sample_rows = self.sample_rows;
    tokio::task::spawn_blocking(move || describe_database(&path, sample_rows))
      .await
      .map_err(|e| PilotError::configuration(format!("schema introspection panicked: {e}")))?
  }
}

fn describe_database(path: &Path, sample_rows: usize) -> Result<String> {
  if !path.exists() {
    return Err(PilotError::configuration(format!("database {} does not exist", path.display())));
  }
  let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
    .map_err(|e| introspection_failed(path, e))?;

  let mut stmt = conn
    .prepare(
      "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .map_err(|e| introspection_failed(path, e))?;
  let tables = stmt
    .query_map([], |row| row.get::<_, String>(0))
    .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
    .map_err(|e| introspection_failed(path, e))?;

  let mut blocks = Vec::with_capacity(tables.len());
  for table in &tables {
    blocks.push(describe_table(&conn, table, sample_rows).map_err(|e| introspection_failed(path, e))?);
  }
  Ok(blocks.join("\n\n"))
}

fn describe_table(conn: &Connection, table: &str, sample_rows: usize) -> rusqlite::Result<String> {
  let quoted = quote_identifier(table);

  let mut stmt = conn.prepare(&format!("PRAGMA table_info({quoted})"))?;
  let columns = stmt
    .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let column_list = columns
    .iter()
    .map(|(name, ty)| if ty.is_empty() { name.clone() } else { format!("{name} ({ty})") })
    .collect::<Vec<_>>()
    .join(", ");
  let mut lines = vec![format!("Table: {table}"), format!("Columns: {column_list}")];

  if sample_rows > 0 {
    match sample(conn, &quoted, &columns, sample_rows) {
      Ok(rows) if !rows.is_empty() => {
        lines.push("Sample rows:".to_string());
        lines.extend(rows);
      }
      Ok(_) => {}
      Err(e) => lines.push(format!("(Could not fetch rows: {e})")),
    }
  }

  Ok(lines.join("\n"))
}

fn sample(
  conn: &Connection,
  quoted_table: &str,
  columns: &[(String, String)],
  limit: usize,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(&format!("SELECT * FROM {quoted_table} LIMIT {limit}"))?;
  let width = stmt.column_count();
  let mut rows = stmt.query([])?;

  let mut rendered = Vec::new();
  while let Some(row) = rows.next()? {
    let mut fields = Vec::with_capacity(width);
    for i in 0..width {
      let name = columns.get(i).map(|(n, _)| n.as_str()).unwrap_or("?");
      fields.push(format!("{name}: {}", render_value(row.get_ref(i)?)));
    }
    rendered.push(format!("{{{}}}", fields.join(", ")));
  }
  Ok(rendered)
}

fn render_value(value: ValueRef<'_>) -> String {
  match value {
    ValueRef::Null => "NULL".to_string(),
    ValueRef::Integer(i) => i.to_string(),
    ValueRef::Real(f) => f.to_string(),
    ValueRef::Text(t) => format!("'{}'", String::from_utf8_lossy(t)),
    ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
  }
}

fn quote_identifier(name: &str) -> String {
  format!("\"{}\"", name.replace('"', "\"\""))
}

fn introspection_failed(path: &Path, e: rusqlite::Error) -> PilotError {
  PilotError::configuration(format!("cannot introspect {}: {e}", path.display()))
}

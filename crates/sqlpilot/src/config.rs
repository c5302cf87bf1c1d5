//! Configuration management for sqlpilot
//!
//! Loads the YAML parameter file into typed structures. Unknown keys, unknown backend kinds
//! and out-of-range values are rejected at load time, never at first use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PilotError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  #[serde(default)]
  pub base: BaseConfig,
  pub vector_store: VectorStoreConfig,
  #[serde(default)]
  pub embedding: EmbeddingConfig,
  #[serde(default)]
  pub llm: LlmConfig,
  #[serde(default)]
  pub memory: MemoryConfig,
  #[serde(default)]
  pub schema: SchemaConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub log: LogConfig,
}

/// Capture filtering
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaseConfig {
  /// Window titles (case-insensitive substrings) that may trigger a suggestion.
  /// An empty list accepts every window.
  #[serde(default)]
  pub window_names: Vec<String>,
}

/// Which similarity-search backend to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
  #[serde(alias = "faiss")]
  FlatIndex,
  #[serde(alias = "pinecone")]
  ManagedIndex,
  #[serde(alias = "chromadb")]
  CollectionStore,
}

impl BackendKind {
  pub fn as_str(self) -> &'static str {
    match self {
      BackendKind::FlatIndex => "flat_index",
      BackendKind::ManagedIndex => "managed_index",
      BackendKind::CollectionStore => "collection_store",
    }
  }
}

impl fmt::Display for BackendKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Connection parameters for exactly one backend variant
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
  FlatIndex {
    index_path: PathBuf,
    metadata_path: PathBuf,
    /// Expected index dimension; checked against the index file when set
    dimension: Option<usize>,
  },
  ManagedIndex {
    host: String,
    namespace: String,
    metadata_path: PathBuf,
    api_key_env: String,
  },
  CollectionStore {
    path: PathBuf,
    collection: String,
  },
}

impl BackendConfig {
  pub fn kind(&self) -> BackendKind {
    match self {
      BackendConfig::FlatIndex { .. } => BackendKind::FlatIndex,
      BackendConfig::ManagedIndex { .. } => BackendKind::ManagedIndex,
      BackendConfig::CollectionStore { .. } => BackendKind::CollectionStore,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawVectorStoreConfig")]
pub struct VectorStoreConfig {
  pub backend: BackendConfig,
  pub top_k: usize,
  /// Drop records whose normalized relevance falls below this value
  pub min_relevance: Option<f32>,
}

/// Wire shape of the `vector_store` section before it is narrowed to one backend
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVectorStoreConfig {
  #[serde(rename = "type")]
  kind: BackendKind,
  #[serde(default = "default_top_k")]
  top_k: usize,
  #[serde(default)]
  min_relevance: Option<f32>,
  index_path: Option<PathBuf>,
  metadata_path: Option<PathBuf>,
  dimension: Option<usize>,
  host: Option<String>,
  namespace: Option<String>,
  api_key_env: Option<String>,
  path: Option<PathBuf>,
  collection: Option<String>,
}

impl TryFrom<RawVectorStoreConfig> for VectorStoreConfig {
  type Error = String;

  fn try_from(raw: RawVectorStoreConfig) -> std::result::Result<Self, Self::Error> {
    let kind = raw.kind;
    let require = |value: Option<PathBuf>, key: &str| {
      value.ok_or_else(|| format!("vector_store.{key} is required for {kind}"))
    };

    let (backend, stray) = match kind {
      BackendKind::FlatIndex => (
        BackendConfig::FlatIndex {
          index_path: require(raw.index_path, "index_path")?,
          metadata_path: require(raw.metadata_path, "metadata_path")?,
          dimension: raw.dimension,
        },
        vec![
          ("host", raw.host.is_some()),
          ("namespace", raw.namespace.is_some()),
          ("api_key_env", raw.api_key_env.is_some()),
          ("path", raw.path.is_some()),
          ("collection", raw.collection.is_some()),
        ],
      ),
      BackendKind::ManagedIndex => (
        BackendConfig::ManagedIndex {
          host: raw.host.ok_or_else(|| format!("vector_store.host is required for {kind}"))?,
          namespace: raw.namespace.unwrap_or_default(),
          metadata_path: require(raw.metadata_path, "metadata_path")?,
          api_key_env: raw.api_key_env.unwrap_or_else(|| "PINECONE_API_KEY".to_string()),
        },
        vec![
          ("index_path", raw.index_path.is_some()),
          ("dimension", raw.dimension.is_some()),
          ("path", raw.path.is_some()),
          ("collection", raw.collection.is_some()),
        ],
      ),
      BackendKind::CollectionStore => (
        BackendConfig::CollectionStore {
          path: require(raw.path, "path")?,
          collection: raw.collection.unwrap_or_else(|| "sql_examples".to_string()),
        },
        vec![
          ("index_path", raw.index_path.is_some()),
          ("metadata_path", raw.metadata_path.is_some()),
          ("dimension", raw.dimension.is_some()),
          ("host", raw.host.is_some()),
          ("namespace", raw.namespace.is_some()),
          ("api_key_env", raw.api_key_env.is_some()),
        ],
      ),
    };

    if let Some((key, _)) = stray.iter().find(|(_, present)| *present) {
      return Err(format!("vector_store.{key} does not apply to {kind}"));
    }

    Ok(Self { backend, top_k: raw.top_k, min_relevance: raw.min_relevance })
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
  #[serde(default = "default_embedding_model")]
  pub model_name: String,
  #[serde(default = "default_embedding_url")]
  pub base_url: String,
  #[serde(default)]
  pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
  #[serde(default = "default_llm_model")]
  pub model_name: String,
  #[serde(default = "default_llm_url")]
  pub base_url: String,
  #[serde(default = "default_llm_key_env")]
  pub api_key_env: String,
  #[serde(default = "default_temperature")]
  pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  #[serde(default = "default_memory_limit")]
  pub limit: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSourceKind {
  #[default]
  None,
  File,
  Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
  #[serde(default)]
  pub source: SchemaSourceKind,
  #[serde(default)]
  pub path: Option<PathBuf>,
  #[serde(default = "default_sample_rows")]
  pub sample_rows: usize,
  /// Re-read the schema before every suggestion instead of once per session
  #[serde(default = "default_true")]
  pub refresh: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_backoff_ms")]
  pub backoff_ms: u64,
  #[serde(default = "default_cooldown_ms")]
  pub rate_limit_cooldown_ms: u64,
}

impl NetworkConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
  #[serde(default = "default_log_path")]
  pub path: PathBuf,
}

// Default value functions
fn default_top_k() -> usize {
  3
}
fn default_true() -> bool {
  true
}
fn default_memory_limit() -> usize {
  3
}
fn default_sample_rows() -> usize {
  2
}
fn default_embedding_model() -> String {
  "all-MiniLM-L6-v2".to_string()
}
fn default_embedding_url() -> String {
  "http://127.0.0.1:8080/v1".to_string()
}
fn default_llm_model() -> String {
  "meta-llama/llama-4-scout-17b-16e-instruct".to_string()
}
fn default_llm_url() -> String {
  "https://api.groq.com/openai/v1".to_string()
}
fn default_llm_key_env() -> String {
  "GROQ_API_KEY".to_string()
}
fn default_temperature() -> f32 {
  0.3
}
fn default_timeout_secs() -> u64 {
  30
}
fn default_max_attempts() -> u32 {
  3
}
fn default_backoff_ms() -> u64 {
  500
}
fn default_cooldown_ms() -> u64 {
  5000
}
fn default_log_path() -> PathBuf {
  PathBuf::from("logs").join("suggestions_log.csv")
}

impl Default for EmbeddingConfig {
  fn default() -> Self {
    Self {
      model_name: default_embedding_model(),
      base_url: default_embedding_url(),
      api_key_env: None,
    }
  }
}

impl Default for LlmConfig {
  fn default() -> Self {
    Self {
      model_name: default_llm_model(),
      base_url: default_llm_url(),
      api_key_env: default_llm_key_env(),
      temperature: default_temperature(),
    }
  }
}

impl Default for MemoryConfig {
  fn default() -> Self {
    Self { enabled: true, limit: default_memory_limit() }
  }
}

impl Default for SchemaConfig {
  fn default() -> Self {
    Self {
      source: SchemaSourceKind::None,
      path: None,
      sample_rows: default_sample_rows(),
      refresh: true,
    }
  }
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      max_attempts: default_max_attempts(),
      backoff_ms: default_backoff_ms(),
      rate_limit_cooldown_ms: default_cooldown_ms(),
    }
  }
}

impl Default for LogConfig {
  fn default() -> Self {
    Self { path: default_log_path() }
  }
}

const MAX_TOP_K: usize = 100;

impl Config {
  /// Load configuration from a file
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
      PilotError::configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    Self::from_yaml_str(&content)
  }

  /// Load configuration from the working directory, then the user config directory
  pub fn load() -> Result<Self> {
    let mut candidates = vec![PathBuf::from("params.yaml"), PathBuf::from(".sqlpilot.yaml")];
    if let Some(dir) = dirs::config_dir() {
      candidates.push(dir.join("sqlpilot").join("params.yaml"));
    }

    for path in &candidates {
      if path.exists() {
        return Self::load_from_file(path);
      }
    }

    Err(PilotError::configuration(
      "no configuration found (looked for params.yaml, .sqlpilot.yaml and the user config dir)",
    ))
  }

  /// Parse and validate a YAML document, expanding `${VAR}` references first
  pub fn from_yaml_str(content: &str) -> Result<Self> {
    let mut value: serde_yaml::Value = serde_yaml::from_str(content)
      .map_err(|e| PilotError::configuration(format!("invalid YAML: {e}")))?;
    expand_env_vars(&mut value);

    let config: Config = serde_yaml::from_value(value)
      .map_err(|e| PilotError::configuration(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if self.vector_store.top_k > MAX_TOP_K {
      return Err(PilotError::configuration(format!(
        "vector_store.top_k must be at most {MAX_TOP_K}, got {}",
        self.vector_store.top_k
      )));
    }
    if self.memory.enabled && self.memory.limit == 0 {
      return Err(PilotError::configuration("memory.limit must be positive when memory is enabled"));
    }
    if self.network.max_attempts == 0 {
      return Err(PilotError::configuration("network.max_attempts must be at least 1"));
    }
    if self.schema.source != SchemaSourceKind::None && self.schema.path.is_none() {
      return Err(PilotError::configuration("schema.path is required when schema.source is set"));
    }
    Ok(())
  }
}

/// Replace whole-string `${VAR}` values with the environment variable, when it is set
fn expand_env_vars(value: &mut serde_yaml::Value) {
  match value {
    serde_yaml::Value::String(text) => {
      if let Some(name) = text.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        if let Ok(resolved) = std::env::var(name) {
          *text = resolved;
        }
      }
    }
    serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(expand_env_vars),
    serde_yaml::Value::Mapping(map) => map.iter_mut().for_each(|(_, v)| expand_env_vars(v)),
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const FLAT: &str = r#"
vector_store:
  type: flat_index
  index_path: store/index.json
  metadata_path: store/metadata.json
"#;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::from_yaml_str(FLAT).unwrap();

    assert_eq!(config.vector_store.top_k, 3);
    assert_eq!(config.vector_store.backend.kind(), BackendKind::FlatIndex);
    assert!(config.memory.enabled);
    assert_eq!(config.memory.limit, 3);
    assert_eq!(config.network.max_attempts, 3);
    assert_eq!(config.llm.api_key_env, "GROQ_API_KEY");
    assert_eq!(config.schema.source, SchemaSourceKind::None);
    assert!(config.base.window_names.is_empty());
  }

  #[test]
  fn test_unknown_backend_kind_fails_fast() {
    let err = Config::from_yaml_str("vector_store:\n  type: annoy\n  path: x\n").unwrap_err();
    assert!(matches!(err, PilotError::Configuration { .. }));
  }

  #[test]
  fn test_legacy_backend_names_are_accepted() {
    let yaml = "vector_store:\n  type: chromadb\n  path: chroma.db\n";
    let config = Config::from_yaml_str(yaml).unwrap();
    assert_eq!(
      config.vector_store.backend,
      BackendConfig::CollectionStore {
        path: PathBuf::from("chroma.db"),
        collection: "sql_examples".to_string()
      }
    );
  }

  #[test]
  fn test_unknown_key_is_rejected() {
    let yaml = format!("{FLAT}memory:\n  enabled: true\n  size: 4\n");
    assert!(Config::from_yaml_str(&yaml).is_err());
  }

  #[test]
  fn test_missing_backend_field_is_rejected() {
    let yaml = "vector_store:\n  type: managed_index\n  metadata_path: m.json\n";
    let err = Config::from_yaml_str(yaml).unwrap_err();
    assert!(err.to_string().contains("host"));
  }

  #[test]
  fn test_stray_backend_field_is_rejected() {
    let yaml = format!("{FLAT}  host: https://example.io\n");
    let err = Config::from_yaml_str(&yaml).unwrap_err();
    assert!(err.to_string().contains("does not apply"));
  }

  #[test]
  fn test_every_foreign_backend_key_is_rejected() {
    let flat = [
      "  namespace: prod\n",
      "  api_key_env: KEY\n",
      "  collection: c\n",
    ];
    for extra in flat {
      let err = Config::from_yaml_str(&format!("{FLAT}{extra}")).unwrap_err();
      assert!(err.to_string().contains("does not apply"), "{extra} was accepted");
    }

    let collection = "vector_store:\n  type: collection_store\n  path: c.db\n";
    for extra in ["  metadata_path: m.json\n", "  dimension: 384\n", "  namespace: n\n"] {
      let err = Config::from_yaml_str(&format!("{collection}{extra}")).unwrap_err();
      assert!(err.to_string().contains("does not apply"), "{extra} was accepted");
    }

    let managed = "vector_store:\n  type: managed_index\n  host: h\n  metadata_path: m.json\n";
    for extra in ["  dimension: 384\n", "  collection: c\n"] {
      let err = Config::from_yaml_str(&format!("{managed}{extra}")).unwrap_err();
      assert!(err.to_string().contains("does not apply"), "{extra} was accepted");
    }
  }

  #[test]
  fn test_range_validation() {
    let yaml = format!("{FLAT}network:\n  max_attempts: 0\n");
    assert!(Config::from_yaml_str(&yaml).is_err());

    let yaml = FLAT.replace("type: flat_index", "type: flat_index\n  top_k: 500");
    assert!(Config::from_yaml_str(&yaml).is_err());

    let yaml = format!("{FLAT}schema:\n  source: sqlite\n");
    assert!(Config::from_yaml_str(&yaml).is_err());
  }

  #[test]
  #[serial]
  fn test_env_var_expansion() {
    std::env::set_var("SQLPILOT_TEST_HOST", "https://idx.example.io");
    let yaml = r#"
vector_store:
  type: managed_index
  host: ${SQLPILOT_TEST_HOST}
  namespace: ${SQLPILOT_TEST_UNSET_NAMESPACE}
  metadata_path: meta.json
"#;
    let config = Config::from_yaml_str(yaml).unwrap();
    std::env::remove_var("SQLPILOT_TEST_HOST");

    match config.vector_store.backend {
      BackendConfig::ManagedIndex { host, namespace, api_key_env, .. } => {
        assert_eq!(host, "https://idx.example.io");
        assert_eq!(namespace, "${SQLPILOT_TEST_UNSET_NAMESPACE}");
        assert_eq!(api_key_env, "PINECONE_API_KEY");
      }
      other => panic!("expected managed index, got {other:?}"),
    }
  }
}

use serde::{Deserialize, Serialize};

pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:8000";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nvidia/nv-embedqa-e5-v5";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/clinvec";
pub const DEFAULT_VECTOR_TABLE: &str = "clinical_note_vectors";
pub const DEFAULT_CHECKPOINT_DB: &str = "vectorize_checkpoints.db";
pub const DEFAULT_ERROR_LOG: &str = "vectorization_errors.log";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn config_path() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|p| p.join("clinvec").join("config.toml"))
    }

    pub fn load() -> Result<Self, crate::error::ConfigError> {
        if let Some(path) = Self::config_path()
            && path.exists()
        {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<(), crate::error::ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            crate::error::ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), crate::error::ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_embed_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_embedding_url() -> String {
    DEFAULT_EMBEDDING_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embed_batch_size() -> u32 {
    16
}

fn default_timeout() -> u64 {
    120
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            api_key: None,
            model: default_embedding_model(),
            dimension: default_dimension(),
            batch_size: default_embed_batch_size(),
            timeout_secs: default_timeout(),
            requests_per_minute: default_requests_per_minute(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}

fn default_table() -> String {
    DEFAULT_VECTOR_TABLE.to_string()
}

fn default_pool_max() -> u32 {
    5
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl VectorStoreConfig {
    /// Table name qualified with the schema, when one is configured.
    pub fn qualified_table_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            table: default_table(),
            schema: None,
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_checkpoint_db")]
    pub checkpoint_db: String,

    #[serde(default = "default_error_log")]
    pub error_log: String,
}

fn default_batch_size() -> u32 {
    16
}

fn default_checkpoint_db() -> String {
    DEFAULT_CHECKPOINT_DB.to_string()
}

fn default_error_log() -> String {
    DEFAULT_ERROR_LOG.to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            checkpoint_db: default_checkpoint_db(),
            error_log: default_error_log(),
        }
    }
}

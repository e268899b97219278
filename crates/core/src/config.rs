//! Validated configuration shared by the index build and the query path.

use crate::chunking::ChunkingConfig;
use crate::error::ConfigError;
use crate::models::Metric;
use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_INDEX_DIR: &str = "faiss_index";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RagConfig {
    /// Folder of source PDFs read by the offline build.
    pub data_dir: PathBuf,
    /// Location of the persisted index artifact.
    pub index_dir: PathBuf,
    /// Descend into subfolders of `data_dir`.
    pub recursive: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub metric: Metric,
    /// Pinned embedding model. Must be identical at build and query time.
    pub embedding_model: String,
    pub llm_model: String,
    pub temperature: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            index_dir: PathBuf::from(DEFAULT_INDEX_DIR),
            recursive: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            metric: Metric::Cosine,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
        }
    }
}

impl RagConfig {
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn index_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.index_dir = dir.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.config.recursive = recursive;
        self
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.config.metric = metric;
        self
    }

    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm_model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Validate and return the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `chunk_overlap >= chunk_size`, `top_k == 0`,
    /// the temperature is outside `0.0..=2.0`, or a model id is blank.
    pub fn build(self) -> Result<RagConfig, ConfigError> {
        let config = self.config;
        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::ChunkOverlap {
                chunk_size: config.chunk_size,
                chunk_overlap: config.chunk_overlap,
            });
        }
        if config.top_k == 0 {
            return Err(ConfigError::ZeroTopK);
        }
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(ConfigError::Temperature(config.temperature));
        }
        if config.embedding_model.trim().is_empty() {
            return Err(ConfigError::Empty("embedding_model"));
        }
        if config.llm_model.trim().is_empty() {
            return Err(ConfigError::Empty("llm_model"));
        }
        Ok(config)
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("failed to load embedding model {model}: {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("embedding call to {backend} failed: {details}")]
    BackendCall { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding dimension {actual} does not match expected {expected}")]
    Dimension { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source directory does not exist: {0}")]
    SourceDirMissing(String),

    #[error("source path is not a directory: {0}")]
    NotADirectory(String),

    #[error("pdf parse error in {path}: {reason}")]
    PdfParse { path: String, reason: String },

    #[error("no pdf pages with text found in {0}; refusing to build an empty index")]
    NoDocuments(String),

    #[error("invalid chunking config: chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})")]
    InvalidChunkConfig {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write index artifact at {path}: {reason}")]
    IndexWrite { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no index artifact at {0}; run `fraudguard build-index` first")]
    IndexNotFound(String),

    #[error("index artifact at {path} is invalid: {reason}")]
    IndexCorrupt { path: String, reason: String },

    #[error("index was built with embedding model {index_model} but the query embedder is {embedder_model}")]
    ModelMismatch {
        index_model: String,
        embedder_model: String,
    },

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("search request failed: {0}")]
    Request(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})")]
    ChunkOverlap {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    #[error("top_k must be greater than zero")]
    ZeroTopK,

    #[error("temperature {0} is outside 0.0..=2.0")]
    Temperature(f32),

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

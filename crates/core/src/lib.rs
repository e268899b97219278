pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod loader;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod screening;
pub mod synthesis;

pub use chunking::{chunk_documents, normalize_whitespace, split_text, ChunkingConfig};
pub use config::{RagConfig, RagConfigBuilder};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HuggingFaceEmbedder, HuggingFaceOptions,
    DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{ConfigError, EmbedError, IngestError, SearchError};
pub use index::{FlatIndex, IndexManifest};
pub use loader::{
    discover_pdf_files, load_pdf_directory, LoadOptions, LoadReport, LopdfExtractor, PageText,
    PdfExtractor, SkippedPdf,
};
pub use metadata::{reduce_document, reduce_metadata};
pub use models::{Chunk, Document, Metric, RawDocument, RetrievedChunk};
pub use pipeline::{build_index, BuildReport};
pub use retriever::Retriever;
pub use screening::{KeywordScreen, Verdict};
pub use synthesis::{
    format_context, render_system_prompt, Answer, Assistant, ChatModel, GroqChatModel,
    SYSTEM_PROMPT,
};

use crate::chunking::chunk_documents;
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::index::{FlatIndex, IndexManifest};
use crate::loader::{load_pdf_directory, LoadOptions, SkippedPdf};
use crate::metadata::reduce_metadata;
use std::path::PathBuf;

pub struct BuildReport {
    pub files: usize,
    pub documents: usize,
    pub chunks: usize,
    pub skipped_files: Vec<SkippedPdf>,
    pub index_dir: PathBuf,
    pub manifest: IndexManifest,
}

/// Offline build: load PDFs, reduce metadata, chunk, embed, persist.
///
/// Nothing is written to `config.index_dir` unless every step succeeds, and
/// a folder with no extractable pages is [`IngestError::NoDocuments`].
pub fn build_index(
    config: &RagConfig,
    embedder: &dyn Embedder,
    skip_unreadable: bool,
) -> Result<BuildReport, IngestError> {
    let chunking = config.chunking();
    chunking.validate()?;

    if embedder.model_id() != config.embedding_model {
        tracing::warn!(
            configured = %config.embedding_model,
            embedder = %embedder.model_id(),
            "embedder model differs from configured model; the index records the embedder's"
        );
    }

    let report = load_pdf_directory(
        &config.data_dir,
        LoadOptions {
            recursive: config.recursive,
            skip_unreadable,
        },
    )?;

    if report.documents.is_empty() {
        return Err(IngestError::NoDocuments(config.data_dir.display().to_string()));
    }

    let documents = reduce_metadata(&report.documents);
    let chunks = chunk_documents(&documents, chunking)?;
    let chunk_count = chunks.len();

    tracing::info!(
        documents = documents.len(),
        chunks = chunk_count,
        model = %embedder.model_id(),
        "embedding chunks"
    );
    let index = FlatIndex::build(chunks, embedder, config.metric)?;
    let manifest = index.save(&config.index_dir)?;

    Ok(BuildReport {
        files: report.files,
        documents: documents.len(),
        chunks: chunk_count,
        skipped_files: report.skipped_files,
        index_dir: config.index_dir.clone(),
        manifest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_folder_aborts_before_writing() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        fs::create_dir(&data)?;
        let index_dir = dir.path().join("faiss_index");
        let config = RagConfig::builder()
            .data_dir(&data)
            .index_dir(&index_dir)
            .build()?;

        let result = build_index(&config, &CharacterNgramEmbedder::default(), false);

        assert!(matches!(result, Err(IngestError::NoDocuments(_))));
        assert!(!index_dir.exists());
        Ok(())
    }

    #[test]
    fn missing_folder_is_an_ingestion_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config = RagConfig::builder()
            .data_dir(dir.path().join("absent"))
            .index_dir(dir.path().join("faiss_index"))
            .build()?;

        let result = build_index(&config, &CharacterNgramEmbedder::default(), false);
        assert!(matches!(result, Err(IngestError::SourceDirMissing(_))));
        Ok(())
    }

    #[test]
    fn bad_chunking_is_rejected_before_loading() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut config = RagConfig::builder()
            .data_dir(dir.path().join("absent"))
            .index_dir(dir.path().join("faiss_index"))
            .build()?;
        config.chunk_overlap = config.chunk_size;

        let result = build_index(&config, &CharacterNgramEmbedder::default(), false);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig { .. })));
        Ok(())
    }

    #[test]
    fn only_unreadable_pdfs_count_as_no_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let data = dir.path().join("data");
        fs::create_dir(&data)?;
        fs::write(data.join("broken.pdf"), b"%PDF-1.4\n%broken")?;
        let index_dir = dir.path().join("faiss_index");
        let config = RagConfig::builder()
            .data_dir(&data)
            .index_dir(&index_dir)
            .build()?;

        let result = build_index(&config, &CharacterNgramEmbedder::default(), true);

        assert!(matches!(result, Err(IngestError::NoDocuments(_))));
        assert!(!index_dir.exists());
        Ok(())
    }
}

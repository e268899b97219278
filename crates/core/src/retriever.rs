use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::index::FlatIndex;
use crate::models::RetrievedChunk;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Query-side service: one embedder and one loaded index, constructed once at
/// process start and shared by reference.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index_dir: PathBuf,
    index: Option<FlatIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index_dir: impl Into<PathBuf>) -> Self {
        Self {
            embedder,
            index_dir: index_dir.into(),
            index: None,
        }
    }

    /// Construct and load in one step.
    pub fn open(embedder: Arc<dyn Embedder>, index_dir: impl Into<PathBuf>) -> Result<Self, SearchError> {
        let mut retriever = Self::new(embedder, index_dir);
        retriever.initialize()?;
        Ok(retriever)
    }

    /// Load the persisted index. Fails rather than falling back to an empty
    /// index, and refuses an index built with a different embedding model.
    pub fn initialize(&mut self) -> Result<(), SearchError> {
        let index = FlatIndex::load(&self.index_dir)?;

        if index.embedding_model() != self.embedder.model_id() {
            return Err(SearchError::ModelMismatch {
                index_model: index.embedding_model().to_string(),
                embedder_model: self.embedder.model_id().to_string(),
            });
        }
        if index.dimensions() != self.embedder.dimensions() {
            return Err(SearchError::IndexCorrupt {
                path: self.index_dir.display().to_string(),
                reason: format!(
                    "index dimension {} differs from embedder dimension {}",
                    index.dimensions(),
                    self.embedder.dimensions()
                ),
            });
        }

        self.index = Some(index);
        Ok(())
    }

    pub fn close(&mut self) {
        self.index = None;
    }

    pub fn is_ready(&self) -> bool {
        self.index.is_some()
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    pub fn index_len(&self) -> usize {
        self.index.as_ref().map(FlatIndex::len).unwrap_or(0)
    }

    /// Embed `query` and return the `min(k, index size)` nearest chunks,
    /// best first.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        let index = self
            .index
            .as_ref()
            .ok_or_else(|| SearchError::IndexNotFound(self.index_dir.display().to_string()))?;

        let query_vector = self.embedder.embed(query)?;
        let hits = index.search(&query_vector, k)?;
        tracing::debug!(k, hits = hits.len(), "retrieved chunks");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{Chunk, Metric};
    use tempfile::tempdir;

    fn build_at(path: &Path, embedder: &CharacterNgramEmbedder) -> Result<(), Box<dyn std::error::Error>> {
        let chunks = vec![
            Chunk {
                text: "Phishing emails often impersonate banks.".to_string(),
                source: "data/a.pdf".to_string(),
            },
            Chunk {
                text: "Call your bank immediately if your card is stolen.".to_string(),
                source: "data/b.pdf".to_string(),
            },
        ];
        FlatIndex::build(chunks, embedder, Metric::Cosine)?.save(path)?;
        Ok(())
    }

    #[test]
    fn retrieve_before_initialize_is_index_not_found() {
        let retriever = Retriever::new(Arc::new(CharacterNgramEmbedder::default()), "faiss_index");
        let result = retriever.retrieve("what is phishing?", 3);
        assert!(matches!(result, Err(SearchError::IndexNotFound(_))));
    }

    #[test]
    fn initialize_without_artifact_fails_loudly() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut retriever = Retriever::new(
            Arc::new(CharacterNgramEmbedder::default()),
            dir.path().join("faiss_index"),
        );
        assert!(matches!(
            retriever.initialize(),
            Err(SearchError::IndexNotFound(_))
        ));
        assert!(!retriever.is_ready());
        Ok(())
    }

    #[test]
    fn open_retrieve_and_close() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        let embedder = CharacterNgramEmbedder::default();
        build_at(&path, &embedder)?;

        let mut retriever = Retriever::open(Arc::new(embedder), &path)?;
        assert_eq!(retriever.index_len(), 2);

        let hits = retriever.retrieve("Call your bank immediately if your card is stolen.", 1)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "data/b.pdf");

        retriever.close();
        assert!(matches!(
            retriever.retrieve("anything", 1),
            Err(SearchError::IndexNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn index_from_another_model_is_refused() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        build_at(&path, &CharacterNgramEmbedder::new(64))?;

        let result = Retriever::open(Arc::new(CharacterNgramEmbedder::new(32)), &path);
        assert!(matches!(result, Err(SearchError::ModelMismatch { .. })));
        Ok(())
    }

    #[test]
    fn blank_queries_still_return_top_k() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        let embedder = CharacterNgramEmbedder::default();
        build_at(&path, &embedder)?;

        let retriever = Retriever::open(Arc::new(embedder), &path)?;

        // Too short for a trigram: zero vector, every chunk ties.
        for query in ["", " \t"] {
            let hits = retriever.retrieve(query, 3)?;
            let sources = hits.iter().map(|hit| hit.source.as_str()).collect::<Vec<_>>();
            assert_eq!(sources, vec!["data/a.pdf", "data/b.pdf"]);
            assert!(hits.iter().all(|hit| hit.score == 0.0));
        }

        assert_eq!(retriever.retrieve("", 1)?.len(), 1);
        assert_eq!(retriever.retrieve("     ", 5)?.len(), 2);
        Ok(())
    }
}

use crate::error::IngestError;
use crate::models::{Chunk, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Upper bound on chunk length, in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of one document.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            chunk_overlap: crate::config::DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            chunk_overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split `text` into windows of at most `chunk_size` characters.
///
/// A window that does not reach the end of the text is pulled back to the
/// nearest whitespace in its last quarter, when there is one. The next
/// window always starts exactly `chunk_overlap` characters before the
/// previous one ended.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + config.chunk_size).min(chars.len());
        if end < chars.len() {
            end = snap_to_whitespace(&chars, start, end, config);
        }

        pieces.push(chars[start..end].iter().collect::<String>());
        if end == chars.len() {
            break;
        }
        start = end - config.chunk_overlap;
    }

    pieces
}

fn snap_to_whitespace(chars: &[char], start: usize, end: usize, config: ChunkingConfig) -> usize {
    // Cutting at or before start + overlap would stall the window.
    let floor = (start + config.chunk_overlap + 1).max(end - config.chunk_size / 4);
    (floor..end)
        .rev()
        .find(|&index| chars[index].is_whitespace())
        .unwrap_or(end)
}

/// Chunk every document in order. Each chunk keeps its document's source.
pub fn chunk_documents(
    documents: &[Document],
    config: ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    config.validate()?;

    let chunks = documents
        .iter()
        .flat_map(|document| {
            split_text(&document.text, config)
                .into_iter()
                .map(move |text| Chunk {
                    text,
                    source: document.source.clone(),
                })
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "split documents"
    );

    Ok(chunks)
}

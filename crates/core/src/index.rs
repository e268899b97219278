//! Exact nearest-neighbour index and its on-disk artifact.
//!
//! An artifact is a directory holding `manifest.json`, `vectors.bin`
//! (little-endian `f32`, row-major) and `chunks.json`, the chunk store
//! parallel to the vector rows.

use crate::embeddings::{l2_normalize, Embedder};
use crate::error::{IngestError, SearchError};
use crate::models::{Chunk, Metric, RetrievedChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";
pub const VECTORS_FILE: &str = "vectors.bin";
pub const CHUNKS_FILE: &str = "chunks.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub embedding_model: String,
    pub dimensions: usize,
    pub metric: Metric,
    pub count: usize,
    pub vectors_sha256: String,
    pub built_at: DateTime<Utc>,
}

/// Immutable once built. Safe to share across threads for concurrent reads.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    embedding_model: String,
    dimensions: usize,
    metric: Metric,
    vectors: Vec<f32>,
    chunks: Vec<Chunk>,
}

impl FlatIndex {
    /// Embed every chunk and assemble the index. Rows keep chunk order.
    pub fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        metric: Metric,
    ) -> Result<Self, IngestError> {
        let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let embeddings = embedder.embed_batch(&texts)?;
        Self::from_embeddings(chunks, embeddings, embedder.model_id(), embedder.dimensions(), metric)
    }

    pub fn from_embeddings(
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
        embedding_model: &str,
        dimensions: usize,
        metric: Metric,
    ) -> Result<Self, IngestError> {
        if chunks.len() != embeddings.len() {
            return Err(IngestError::IndexWrite {
                path: String::new(),
                reason: format!(
                    "embedding count {} doesn't match chunk count {}",
                    embeddings.len(),
                    chunks.len()
                ),
            });
        }

        let mut vectors = Vec::with_capacity(chunks.len() * dimensions);
        for mut embedding in embeddings {
            if embedding.len() != dimensions {
                return Err(IngestError::IndexWrite {
                    path: String::new(),
                    reason: format!("embedding dimension {} != {}", embedding.len(), dimensions),
                });
            }
            if metric == Metric::Cosine {
                l2_normalize(&mut embedding);
            }
            vectors.extend(embedding);
        }

        Ok(Self {
            embedding_model: embedding_model.to_string(),
            dimensions,
            metric,
            vectors,
            chunks,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Return the `min(k, len)` closest chunks, best first. Equal scores keep
    /// insertion order.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, SearchError> {
        if query_vector.len() != self.dimensions {
            return Err(SearchError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let mut query = query_vector.to_vec();
        if self.metric == Metric::Cosine {
            l2_normalize(&mut query);
        }

        let mut scored = self
            .rows()
            .enumerate()
            .map(|(position, row)| (position, self.score(&query, row)))
            .collect::<Vec<_>>();

        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| {
                let chunk = &self.chunks[position];
                RetrievedChunk {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    score,
                }
            })
            .collect())
    }

    fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks(self.dimensions.max(1))
    }

    fn score(&self, query: &[f32], row: &[f32]) -> f32 {
        match self.metric {
            Metric::Cosine => query.iter().zip(row).map(|(a, b)| a * b).sum(),
            Metric::Euclidean => -query
                .iter()
                .zip(row)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// Persist to `path`, replacing any previous artifact.
    ///
    /// Files are written to a sibling temp directory first and swapped in
    /// with renames, so an interrupted save never leaves a loadable partial
    /// artifact at `path`.
    pub fn save(&self, path: &Path) -> Result<IndexManifest, IngestError> {
        let write_error = |reason: String| IngestError::IndexWrite {
            path: path.display().to_string(),
            reason,
        };

        let staging = sibling(path, "tmp")?;
        let result = self.write_files(&staging);
        let manifest = match result {
            Ok(manifest) => manifest,
            Err(error) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(error);
            }
        };

        let previous = if path.exists() {
            let aside = sibling(path, "old")?;
            fs::rename(path, &aside).map_err(|error| {
                let _ = fs::remove_dir_all(&staging);
                write_error(format!("cannot move previous artifact aside: {error}"))
            })?;
            Some(aside)
        } else {
            None
        };

        if let Err(error) = fs::rename(&staging, path) {
            if let Some(aside) = &previous {
                let _ = fs::rename(aside, path);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(write_error(format!("cannot move new artifact into place: {error}")));
        }

        if let Some(aside) = previous {
            if let Err(error) = fs::remove_dir_all(&aside) {
                tracing::warn!(path = %aside.display(), %error, "failed to remove previous index");
            }
        }

        tracing::info!(
            path = %path.display(),
            count = manifest.count,
            dimensions = manifest.dimensions,
            model = %manifest.embedding_model,
            "index persisted"
        );
        Ok(manifest)
    }

    fn write_files(&self, dir: &Path) -> Result<IndexManifest, IngestError> {
        fs::create_dir_all(dir)?;

        let bytes = self
            .vectors
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect::<Vec<u8>>();
        fs::write(dir.join(VECTORS_FILE), &bytes)?;
        fs::write(dir.join(CHUNKS_FILE), serde_json::to_vec(&self.chunks)?)?;

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.embedding_model.clone(),
            dimensions: self.dimensions,
            metric: self.metric,
            count: self.chunks.len(),
            vectors_sha256: sha256_hex(&bytes),
            built_at: Utc::now(),
        };
        // Manifest last: a directory without one is never treated as an index.
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
        Ok(manifest)
    }

    /// Load an artifact written by [`FlatIndex::save`].
    ///
    /// # Errors
    ///
    /// [`SearchError::IndexNotFound`] if the directory or its manifest is
    /// absent, [`SearchError::IndexCorrupt`] if the files disagree with the
    /// manifest.
    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let manifest_path = path.join(MANIFEST_FILE);
        if !path.is_dir() || !manifest_path.is_file() {
            return Err(SearchError::IndexNotFound(path.display().to_string()));
        }

        let corrupt = |reason: String| SearchError::IndexCorrupt {
            path: path.display().to_string(),
            reason,
        };

        let manifest: IndexManifest = serde_json::from_slice(&fs::read(&manifest_path)?)
            .map_err(|error| corrupt(format!("unreadable manifest: {error}")))?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "format version {} is not supported (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }

        let bytes = fs::read(path.join(VECTORS_FILE))?;
        let expected_len = manifest
            .count
            .checked_mul(manifest.dimensions)
            .and_then(|values| values.checked_mul(std::mem::size_of::<f32>()))
            .ok_or_else(|| {
                corrupt(format!(
                    "manifest size {} x {} overflows",
                    manifest.count, manifest.dimensions
                ))
            })?;
        if bytes.len() != expected_len {
            return Err(corrupt(format!(
                "{VECTORS_FILE} has {} bytes, expected {expected_len}",
                bytes.len()
            )));
        }
        if sha256_hex(&bytes) != manifest.vectors_sha256 {
            return Err(corrupt(format!("{VECTORS_FILE} checksum mismatch")));
        }

        let chunks: Vec<Chunk> = serde_json::from_slice(&fs::read(path.join(CHUNKS_FILE))?)
            .map_err(|error| corrupt(format!("unreadable chunk store: {error}")))?;
        if chunks.len() != manifest.count {
            return Err(corrupt(format!(
                "chunk store has {} entries, manifest says {}",
                chunks.len(),
                manifest.count
            )));
        }

        let vectors = bytes
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect();

        tracing::info!(
            path = %path.display(),
            count = manifest.count,
            model = %manifest.embedding_model,
            built_at = %manifest.built_at.to_rfc3339(),
            "index loaded"
        );

        Ok(Self {
            embedding_model: manifest.embedding_model,
            dimensions: manifest.dimensions,
            metric: manifest.metric,
            vectors,
            chunks,
        })
    }
}

fn sibling(path: &Path, tag: &str) -> Result<PathBuf, IngestError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::IndexWrite {
            path: path.display().to_string(),
            reason: "index path has no file name".to_string(),
        })?;
    Ok(path.with_file_name(format!(".{name}.{tag}-{}", uuid::Uuid::new_v4())))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

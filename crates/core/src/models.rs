use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SOURCE_KEY: &str = "source";
pub const UNKNOWN_SOURCE: &str = "unknown";

/// One page of extracted PDF text, with whatever metadata the loader attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl RawDocument {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A page reduced to its text and provenance. Nothing else flows past the
/// metadata reducer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub source: String,
}

impl From<Document> for RawDocument {
    fn from(value: Document) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), value.source);
        Self {
            text: value.text,
            metadata,
        }
    }
}

/// A bounded window of a [`Document`]'s text. Inherits the source unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
}

/// A chunk returned by the retriever. `score` is higher-is-closer for every
/// metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => f.write_str("cosine"),
            Metric::Euclidean => f.write_str("euclidean"),
        }
    }
}

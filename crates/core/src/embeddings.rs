//! Text embedding backends.
//!
//! Every index records the [`Embedder::model_id`] it was built with and the
//! query path refuses to search it with any other model.

use crate::error::EmbedError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;
pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/hf-inference/";
pub const HF_BATCH_SIZE: usize = 32;

const HF_BACKEND: &str = "huggingface";
const PROBE_TEXT: &str = "fraud awareness";

pub trait Embedder: Send + Sync {
    /// Identifier persisted alongside an index and checked at load time.
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Local hashing embedder: character trigrams folded into FNV-1a buckets.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model_id: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("local/char-trigram-{dimensions}"),
        }
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions];
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

/// Hosted sentence-transformer called through the Hugging Face
/// feature-extraction pipeline.
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_token: Option<String>,
    dimensions: usize,
}

#[derive(Debug, Clone)]
pub struct HuggingFaceOptions {
    pub model: String,
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for HuggingFaceOptions {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_EMBEDDING_MODEL.to_string(),
            base_url: DEFAULT_HF_BASE_URL.to_string(),
            api_token: None,
            timeout: None,
        }
    }
}

#[derive(Serialize)]
struct FeatureRequest<'a> {
    inputs: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureResponse {
    Sentences(Vec<Vec<f32>>),
    Tokens(Vec<Vec<Vec<f32>>>),
}

#[derive(Debug, Deserialize)]
struct FeatureError {
    error: String,
}

impl HuggingFaceEmbedder {
    /// Build the client and probe the model once to learn its dimension.
    ///
    /// # Errors
    ///
    /// Any failure here, network or otherwise, is [`EmbedError::ModelLoad`].
    pub fn connect(options: HuggingFaceOptions) -> Result<Self, EmbedError> {
        let model = options.model.clone();
        let load_error = |reason: String| EmbedError::ModelLoad {
            model: model.clone(),
            reason,
        };

        let endpoint = feature_extraction_url(&options.base_url, &options.model)
            .map_err(|error| load_error(error.to_string()))?;

        // `None` disables reqwest's default 30s timeout.
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|error| load_error(error.to_string()))?;

        let mut embedder = Self {
            client,
            endpoint,
            model: options.model,
            api_token: options.api_token.filter(|token| !token.trim().is_empty()),
            dimensions: 0,
        };

        let probe = embedder
            .request(&[PROBE_TEXT])
            .map_err(|error| load_error(error.to_string()))?;
        embedder.dimensions = probe
            .first()
            .map(Vec::len)
            .filter(|len| *len > 0)
            .ok_or_else(|| load_error("probe returned an empty vector".to_string()))?;

        tracing::info!(
            model = %embedder.model,
            dimensions = embedder.dimensions,
            "embedding model ready"
        );
        Ok(embedder)
    }

    fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&FeatureRequest { inputs: texts });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let details = serde_json::from_str::<FeatureError>(&body)
                .map(|error| error.error)
                .unwrap_or(body);
            return Err(EmbedError::BackendCall {
                backend: HF_BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let vectors = parse_feature_response(&body)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::BackendCall {
                backend: HF_BACKEND.to_string(),
                details: format!(
                    "returned {} vectors for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
            });
        }
        Ok(vectors)
    }

    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
        match vectors.iter().find(|vector| vector.len() != self.dimensions) {
            Some(vector) => Err(EmbedError::Dimension {
                expected: self.dimensions,
                actual: vector.len(),
            }),
            None => Ok(()),
        }
    }
}

impl Embedder for HuggingFaceEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text])?;
        vectors.pop().ok_or_else(|| EmbedError::BackendCall {
            backend: HF_BACKEND.to_string(),
            details: "empty response".to_string(),
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(HF_BATCH_SIZE) {
            tracing::debug!(model = %self.model, batch_size = batch.len(), "embedding batch");
            let embedded = self.request(batch)?;
            self.check_dimensions(&embedded)?;
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

fn feature_extraction_url(base_url: &str, model: &str) -> Result<Url, url::ParseError> {
    let base = if base_url.ends_with('/') {
        Url::parse(base_url)?
    } else {
        Url::parse(&format!("{base_url}/"))?
    };
    base.join(&format!("models/{model}/pipeline/feature-extraction"))
}

fn parse_feature_response(body: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
    let parsed: FeatureResponse =
        serde_json::from_str(body).map_err(|error| EmbedError::BackendCall {
            backend: HF_BACKEND.to_string(),
            details: format!("unexpected feature-extraction payload: {error}"),
        })?;

    Ok(match parsed {
        FeatureResponse::Sentences(vectors) => vectors,
        FeatureResponse::Tokens(per_text) => per_text.iter().map(|tokens| mean_pool(tokens)).collect(),
    })
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let width = tokens.first().map(Vec::len).unwrap_or(0);
    let mut pooled = vec![0f32; width];
    for token in tokens {
        for (slot, value) in pooled.iter_mut().zip(token) {
            *slot += value;
        }
    }
    if !tokens.is_empty() {
        let count = tokens.len() as f32;
        for slot in &mut pooled {
            *slot /= count;
        }
    }
    pooled
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Phishing emails impersonate banks").expect("embed");
        let second = embedder.embed("Phishing emails impersonate banks").expect("embed");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length_and_model_id() {
        let embedder = CharacterNgramEmbedder::new(32);
        let vector = embedder.embed("abc").expect("embed");
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.model_id(), "local/char-trigram-32");
    }

    #[test]
    fn short_text_embeds_to_zero_vector() {
        let embedder = CharacterNgramEmbedder::new(8);
        assert_eq!(embedder.embed("ab").expect("embed"), vec![0.0; 8]);
    }

    #[test]
    fn feature_url_is_built_under_models() {
        let url = feature_extraction_url(
            "https://router.huggingface.co/hf-inference",
            "sentence-transformers/all-MiniLM-L6-v2",
        )
        .expect("valid url");
        assert_eq!(
            url.as_str(),
            "https://router.huggingface.co/hf-inference/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );
    }

    #[test]
    fn sentence_level_payload_is_used_as_is() {
        let vectors = parse_feature_response("[[0.5, 1.0], [0.25, -1.0]]").expect("parse");
        assert_eq!(vectors, vec![vec![0.5, 1.0], vec![0.25, -1.0]]);
    }

    #[test]
    fn token_level_payload_is_mean_pooled() {
        let vectors = parse_feature_response("[[[1.0, 2.0], [3.0, 4.0]]]").expect("parse");
        assert_eq!(vectors, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn error_payload_is_a_backend_error() {
        let result = parse_feature_response(r#"{"error": "Model is loading"}"#);
        assert!(matches!(result, Err(EmbedError::BackendCall { .. })));
    }

    #[test]
    fn unreachable_backend_is_a_model_load_error() {
        let result = HuggingFaceEmbedder::connect(HuggingFaceOptions {
            base_url: "http://127.0.0.1:9/".to_string(),
            timeout: Some(Duration::from_millis(500)),
            ..HuggingFaceOptions::default()
        });
        assert!(matches!(result, Err(EmbedError::ModelLoad { .. })));
    }

    /// Accepts connections and never answers them.
    fn silent_listener() -> std::io::Result<std::net::SocketAddr> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        Ok(addr)
    }

    #[test]
    fn no_timeout_means_the_call_waits_past_thirty_seconds() -> Result<(), Box<dyn std::error::Error>> {
        let addr = silent_listener()?;
        let (done, finished) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = HuggingFaceEmbedder::connect(HuggingFaceOptions {
                base_url: format!("http://{addr}/"),
                timeout: None,
                ..HuggingFaceOptions::default()
            });
            let _ = done.send(result.is_ok());
        });

        let outcome = finished.recv_timeout(Duration::from_secs(35));
        assert_eq!(outcome, Err(std::sync::mpsc::RecvTimeoutError::Timeout));
        Ok(())
    }
}

//! Prompt assembly and the hosted chat model that turns retrieved context
//! into an answer.

use crate::error::SearchError;
use crate::models::RetrievedChunk;
use crate::retriever::Retriever;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const GROQ_BACKEND: &str = "groq";
const CONTEXT_SLOT: &str = "{context}";

pub const SYSTEM_PROMPT: &str = "\
You are a fraud prevention assistant. You help people recognise, avoid and recover from fraud.

Language rules (strict):
- Work out which language the user's latest message is written in.
- Always answer in that same language or style (English, Hindi, Hinglish, Tamil and so on).
- If the user mixes languages, answer in the same mix.
- Do not switch language unless the user does.
- Do not translate the user's message unless they ask you to.

What you do:
1. Analyse questions about situations that may be fraud.
2. Give clear, practical prevention advice.
3. Explain fraud types such as phishing, identity theft, card fraud, investment and online scams.
4. Give step-by-step guidance to people who have already been defrauded.
5. Share good habits for staying safe online.
6. Point out the warning signs of common schemes.
7. Explain how and where to report fraud.

Guidelines:
- Be patient and empathetic with people who may be victims.
- Base your answer on the context below and on established fraud-prevention practice.
- Recommend contacting the police, the user's bank or the relevant authority whenever that is appropriate.
- Keep answers short and actionable; use numbered steps or bullet points for procedures.
- Quote concrete examples from the context when they help.
- If the context does not cover the question, say so plainly and suggest where to look. Never invent facts.
- Do not make assumptions about the user's situation.
- Put the user's safety first.

Context from documents:
{context}

Using the context above and your knowledge of fraud prevention, give a helpful, accurate and actionable answer in the user's own language.
";

/// Join chunk texts with a blank line, in retrieval order.
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn render_system_prompt(template: &str, context: &str) -> String {
    template.replace(CONTEXT_SLOT, context)
}

pub trait ChatModel: Send + Sync {
    fn complete(&self, system: &str, user: &str) -> Result<String, SearchError>;
}

/// OpenAI-compatible chat completions on Groq.
pub struct GroqChatModel {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GroqChatModel {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Result<Self, SearchError> {
        Self::with_base_url(api_key, model, temperature, DEFAULT_GROQ_BASE_URL, None)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        base_url: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Request("GROQ_API_KEY is empty".to_string()));
        }

        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            temperature,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ChatModel for GroqChatModel {
    fn complete(&self, system: &str, user: &str) -> Result<String, SearchError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        tracing::debug!(model = %self.model, prompt_chars = system.len() + user.len(), "chat completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            let details = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|error| error.error.message)
                .unwrap_or(body);
            return Err(SearchError::BackendResponse {
                backend: GROQ_BACKEND.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        parse_chat_response(&body)
    }
}

fn parse_chat_response(body: &str) -> Result<String, SearchError> {
    let parsed: ChatResponse = serde_json::from_str(body)?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| SearchError::BackendResponse {
            backend: GROQ_BACKEND.to_string(),
            details: "response had no message content".to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Retrieve, build the prompt, ask the model. The model's text is returned
/// as-is.
pub struct Assistant {
    retriever: Arc<Retriever>,
    model: Arc<dyn ChatModel>,
    top_k: usize,
}

impl Assistant {
    pub fn new(retriever: Arc<Retriever>, model: Arc<dyn ChatModel>, top_k: usize) -> Self {
        Self {
            retriever,
            model,
            top_k,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn answer(&self, query: &str) -> Result<Answer, SearchError> {
        let sources = self.retriever.retrieve(query, self.top_k)?;
        let system = render_system_prompt(SYSTEM_PROMPT, &format_context(&sources));
        let text = self.model.complete(&system, query)?;
        Ok(Answer { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::index::FlatIndex;
    use crate::models::{Chunk, Metric};
    use std::sync::Mutex;
    use tempfile::tempdir;

    fn retrieved(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            source: "data/a.pdf".to_string(),
            score: 1.0,
        }
    }

    #[derive(Default)]
    struct RecordingModel {
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ChatModel for RecordingModel {
        fn complete(&self, system: &str, user: &str) -> Result<String, SearchError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((system.to_string(), user.to_string()));
            }
            Ok("Ne partagez jamais votre code OTP.".to_string())
        }
    }

    #[test]
    fn context_is_joined_with_blank_lines_in_order() {
        let context = format_context(&[retrieved("first"), retrieved("second")]);
        assert_eq!(context, "first\n\nsecond");
    }

    #[test]
    fn prompt_embeds_context_and_policies() {
        let prompt = render_system_prompt(SYSTEM_PROMPT, "CONTEXT-MARKER");
        assert!(prompt.contains("CONTEXT-MARKER"));
        assert!(!prompt.contains(CONTEXT_SLOT));
        assert!(prompt.contains("same language"));
        assert!(prompt.contains("police"));
    }

    #[test]
    fn chat_response_content_is_extracted() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Report it to your bank."}}]}"#;
        assert_eq!(parse_chat_response(body).expect("parse"), "Report it to your bank.");
    }

    #[test]
    fn empty_choices_are_a_backend_error() {
        let result = parse_chat_response(r#"{"choices":[]}"#);
        assert!(matches!(result, Err(SearchError::BackendResponse { .. })));
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(GroqChatModel::new("  ", "llama-3.3-70b-versatile", 0.0).is_err());
    }

    #[test]
    fn assistant_passes_context_and_returns_model_text_untouched() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        let embedder = CharacterNgramEmbedder::default();
        let chunks = vec![Chunk {
            text: "Banks never ask for your OTP over the phone.".to_string(),
            source: "data/otp.pdf".to_string(),
        }];
        FlatIndex::build(chunks, &embedder, Metric::Cosine)?.save(&path)?;

        let retriever = Arc::new(Retriever::open(Arc::new(embedder), &path)?);
        let model = Arc::new(RecordingModel::default());
        let assistant = Assistant::new(retriever, model.clone(), 3);

        let answer = assistant.answer("Mon banquier me demande mon OTP")?;

        assert_eq!(answer.text, "Ne partagez jamais votre code OTP.");
        assert_eq!(answer.sources.len(), 1);
        let calls = model.calls.lock().map_err(|_| "poisoned")?;
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("Banks never ask for your OTP over the phone."));
        assert_eq!(calls[0].1, "Mon banquier me demande mon OTP");
        Ok(())
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
    fn chat_call_without_timeout_keeps_waiting() -> Result<(), Box<dyn std::error::Error>> {
        let addr = silent_listener()?;
        let model = GroqChatModel::with_base_url(
            "gsk_test",
            "llama-3.3-70b-versatile",
            0.0,
            &format!("http://{addr}"),
            None,
        )?;
        let (done, finished) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let result = model.complete("system", "user");
            let _ = done.send(result.is_ok());
        });

        let outcome = finished.recv_timeout(std::time::Duration::from_secs(35));
        assert_eq!(outcome, Err(std::sync::mpsc::RecvTimeoutError::Timeout));
        Ok(())
    }
}

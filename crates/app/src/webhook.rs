//! WhatsApp Cloud API webhook: Meta's verification handshake plus keyword
//! screening of inbound text messages.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use fraudguard_core::KeywordScreen;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v21.0";

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

pub struct WhatsAppSender {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl WhatsAppSender {
    pub fn new(graph_url: &str, phone_number_id: &str, access_token: &str) -> anyhow::Result<Self> {
        anyhow::ensure!(!phone_number_id.trim().is_empty(), "WHATSAPP_PHONE_NUMBER_ID is empty");
        anyhow::ensure!(!access_token.trim().is_empty(), "WHATSAPP_ACCESS_TOKEN is empty");
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/{}/messages",
                graph_url.trim_end_matches('/'),
                phone_number_id.trim()
            ),
            access_token: access_token.trim().to_string(),
        })
    }
}

#[async_trait]
impl MessageSender for WhatsAppSender {
    async fn send_text(&self, to: &str, body: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&outbound_text(to, body))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        info!(%status, response = %text, "whatsapp api response");
        anyhow::ensure!(status.is_success(), "whatsapp api returned {status}: {text}");
        Ok(())
    }
}

fn outbound_text(to: &str, body: &str) -> serde_json::Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": {
            "preview_url": false,
            "body": body,
        },
    })
}

#[derive(Clone)]
pub struct WebhookState {
    verify_token: Arc<str>,
    screen: Arc<KeywordScreen>,
    sender: Arc<dyn MessageSender>,
}

impl WebhookState {
    pub fn new(verify_token: &str, screen: KeywordScreen, sender: Arc<dyn MessageSender>) -> Self {
        Self {
            verify_token: Arc::from(verify_token),
            screen: Arc::new(screen),
            sender,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    #[serde(default)]
    text: Option<TextBody>,
}

#[derive(Debug, Deserialize)]
struct TextBody {
    #[serde(default)]
    body: String,
}

impl WebhookPayload {
    /// Sender and text of the first message in the first change, if any.
    /// Non-text messages yield an empty body.
    fn first_message(&self) -> Option<(&str, &str)> {
        let message = self.entry.first()?.changes.first()?.value.messages.first()?;
        let body = message.text.as_ref().map(|text| text.body.as_str()).unwrap_or("");
        Some((message.from.as_str(), body))
    }
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .with_state(state)
}

pub async fn serve(bind: &str, state: WebhookState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "webhook listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
    }
    info!("shutting down webhook");
}

async fn verify(
    State(state): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mode = params.get("hub.mode").map(String::as_str);
    let token = params.get("hub.verify_token").map(String::as_str);
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    let token_matches =
        !state.verify_token.is_empty() && token == Some(&*state.verify_token);
    if mode == Some("subscribe") && token_matches {
        info!("webhook verified");
        return (StatusCode::OK, challenge).into_response();
    }

    warn!(?mode, "webhook verification failed");
    (StatusCode::FORBIDDEN, "Verification failed").into_response()
}

async fn receive(State(state): State<WebhookState>, body: Bytes) -> Json<serde_json::Value> {
    let ok = Json(json!({ "status": "ok" }));

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%error, "unparseable webhook payload");
            return ok;
        }
    };
    debug!(?payload, "incoming webhook");

    let Some((from, text)) = payload.first_message() else {
        return ok;
    };

    let verdict = state.screen.screen(text);
    info!(from, suspicious = verdict.is_suspicious(), ?verdict, "screened message");

    if let Err(error) = state.sender.send_text(from, verdict.reply()).await {
        warn!(%error, to = from, "failed to send whatsapp reply");
    }

    ok
}

//! Telegram Bot API transport.
//!
//! Long-polls `getUpdates` for inbound traffic and maps each update to an
//! [`InboundEvent`]. Replies go out through `sendMessage` and `sendDocument`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::channels::traits::{
    ConversationKind, InboundEvent, InboundPayload, Keyboard, OutboundMessage, Transport,
};

const API_BASE: &str = "https://api.telegram.org";
/// Long-poll wait passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Telegram Bot API adapter: long-polls `getUpdates` and sends through the
/// REST endpoints.
#[derive(Clone)]
pub struct TelegramAdapter {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

/// An update mapped to an inbound event, plus the callback query id that must
/// be acknowledged when the update was a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUpdate {
    pub event: InboundEvent,
    pub callback_query_id: Option<String>,
}

impl TelegramAdapter {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        Self::with_api_base(token, API_BASE)
    }

    /// Point the adapter at another Bot API server.
    pub fn with_api_base(token: &str, api_base: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
            .build()?;
        Ok(Self {
            token: token.trim().to_owned(),
            api_base: api_base.trim_end_matches('/').to_owned(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn call(&self, method: &str, body: &Value) -> anyhow::Result<Value> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await?;
        Self::unwrap_response(method, response).await
    }

    async fn unwrap_response(method: &str, response: reqwest::Response) -> anyhow::Result<Value> {
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        let ok = payload.get("ok").and_then(Value::as_bool).unwrap_or(false);
        if !status.is_success() || !ok {
            let description = payload
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            anyhow::bail!("telegram {method} failed ({status}): {description}");
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn answer_callback(&self, callback_query_id: &str) {
        let body = json!({ "callback_query_id": callback_query_id });
        if let Err(err) = self.call("answerCallbackQuery", &body).await {
            tracing::debug!("answerCallbackQuery failed: {err}");
        }
    }
}

/// Bot API `reply_markup` for an inline keyboard.
pub fn inline_keyboard_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| json!({ "text": b.label, "callback_data": b.token }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Map one `getUpdates` entry to an inbound event. Updates of other kinds, or
/// without a sender, yield `None`.
#[must_use]
pub fn parse_update(update: &Value) -> Option<ParsedUpdate> {
    if let Some(callback) = update.get("callback_query") {
        let requester_id = callback.get("from")?.get("id")?.as_i64()?;
        let chat = callback.get("message").and_then(|m| m.get("chat"));
        let (conversation_id, conversation_kind) = match chat {
            Some(chat) => chat_identity(chat)?,
            None => (requester_id, ConversationKind::Private),
        };
        let token = callback.get("data")?.as_str()?.to_owned();
        let callback_query_id = callback
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned);
        return Some(ParsedUpdate {
            event: InboundEvent {
                requester_id,
                conversation_id,
                conversation_kind,
                payload: InboundPayload::Button(token),
            },
            callback_query_id,
        });
    }

    let message = update.get("message")?;
    let requester_id = message.get("from")?.get("id")?.as_i64()?;
    let (conversation_id, conversation_kind) = chat_identity(message.get("chat")?)?;
    let text = message.get("text")?.as_str()?;
    Some(ParsedUpdate {
        event: InboundEvent {
            requester_id,
            conversation_id,
            conversation_kind,
            payload: parse_text(text),
        },
        callback_query_id: None,
    })
}

fn chat_identity(chat: &Value) -> Option<(i64, ConversationKind)> {
    let id = chat.get("id")?.as_i64()?;
    let kind = match chat.get("type").and_then(Value::as_str) {
        Some("private") => ConversationKind::Private,
        _ => ConversationKind::Group,
    };
    Some((id, kind))
}

/// `/name@bot arg…` becomes a command; anything else is plain text.
fn parse_text(text: &str) -> InboundPayload {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return InboundPayload::Text(text.to_owned());
    };
    let mut parts = rest.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
    if name.is_empty() {
        return InboundPayload::Text(text.to_owned());
    }
    InboundPayload::Command {
        name,
        args: parts.map(str::to_owned).collect(),
    }
}

#[async_trait]
impl Transport for TelegramAdapter {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send_message(&self, chat_id: i64, message: OutboundMessage) -> anyhow::Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": message.text,
        });
        if let Some(keyboard) = &message.keyboard {
            body["reply_markup"] = inline_keyboard_markup(keyboard);
        }
        self.call("sendMessage", &body).await?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_owned());
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "document",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );
        if let Some(caption) = caption {
            form = form.text("caption", caption.to_owned());
        }
        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await?;
        Self::unwrap_response("sendDocument", response).await?;
        Ok(())
    }

    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()> {
        if self.token.is_empty() {
            anyhow::bail!("telegram bot token is empty");
        }

        let mut offset: i64 = 0;
        loop {
            let body = json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message", "callback_query"],
            });
            let result = self.call("getUpdates", &body).await?;
            let Some(updates) = result.as_array() else {
                continue;
            };

            for update in updates {
                if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(update_id + 1);
                }
                let Some(parsed) = parse_update(update) else {
                    continue;
                };
                if let Some(id) = &parsed.callback_query_id {
                    self.answer_callback(id).await;
                }
                if inbound_tx.send(parsed.event).await.is_err() {
                    tracing::info!("inbound queue closed; telegram polling stopped");
                    return Ok(());
                }
            }
        }
    }
}

//! Transport contract and the event types that cross it.
//!
//! Inbound events carry who asked, where, and what; outbound messages are
//! plain text with an optional inline keyboard.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Whether an inbound event came from a one-to-one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Private,
    Group,
}

/// What the requester sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPayload {
    /// `/name arg arg…`, name lowercased with any `@bot` suffix removed.
    Command { name: String, args: Vec<String> },
    /// Plain text.
    Text(String),
    /// Button press carrying its token.
    Button(String),
}

/// Inbound event received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub requester_id: i64,
    pub conversation_id: i64,
    pub conversation_kind: ConversationKind,
    pub payload: InboundPayload,
}

/// One inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub token: String,
}

impl Button {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// Rows of inline buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

/// Outbound text, optionally with buttons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub keyboard: Option<Keyboard>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// Chat transport contract. Outbound calls target a conversation id or a bare
/// requester id; the transport does not distinguish.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stable transport identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Deliver a text message, with buttons when the message carries any.
    async fn send_message(&self, chat_id: i64, message: OutboundMessage) -> anyhow::Result<()>;

    /// Deliver a file.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Start receiving inbound events and forwarding them to the router.
    async fn run(&self, inbound_tx: mpsc::Sender<InboundEvent>) -> anyhow::Result<()>;
}

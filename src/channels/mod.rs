//! Chat transport and the process event loop.
//!
//! The core only sees the [`traits::Transport`] contract; the Telegram
//! adapter is one implementation of it.

pub mod runtime;
pub mod telegram;
pub mod traits;

pub use runtime::{LANE_IDLE, LANE_QUEUE, RuntimeParts, route_events, serve, supervise_transport};
pub use telegram::TelegramAdapter;
pub use traits::{ConversationKind, InboundEvent, InboundPayload, OutboundMessage, Transport};

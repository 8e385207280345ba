//! subwatch: chat-driven operator bot for tracking subscriptions and their
//! expiry.
//!
//! # Architecture
//!
//! - **Store**: SQLite records, settings and the operator table
//! - **Auth**: operator registry with the empty-registry bootstrap rule
//! - **Flow**: per-requester guided input (record creation, operator ids)
//! - **Dispatcher**: commands and button tokens mapped to actions
//! - **Scheduler**: daily digest and the reconfigurable recurring backup
//! - **Fan-out**: best-effort delivery to every operator
//! - **Channels**: transport contract, Telegram adapter, per-requester lanes

pub mod auth;
pub mod backup;
pub mod callback;
pub mod channels;
pub mod clock;
pub mod command;
pub mod config;
pub mod dates;
pub mod dispatcher;
pub mod error;
pub mod export;
pub mod fanout;
pub mod flow;
pub mod render;
pub mod scheduler;
pub mod store;

#[doc(hidden)]
pub mod test_utils;

pub use auth::AdminRegistry;
pub use config::BotConfig;
pub use dispatcher::Dispatcher;
pub use error::{BotError, Result};

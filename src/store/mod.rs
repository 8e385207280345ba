//! Persistent storage for subscription records, process settings and the
//! operator table.
//!
//! Sub-modules:
//! - `schema`: SQLite DDL definitions.
//! - `types`: record and setting types shared with the rest of the crate.
//! - `sqlite`: the SQLite-backed [`SubscriptionStore`].

pub(crate) mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::SubscriptionStore;
pub use types::{MAX_GRANT_DAYS, NewSubscription, SettingKey, Subscription, local_midnight};

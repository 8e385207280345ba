//! Per-requester guided input.
//!
//! Two flows share one table: record creation (description, then purchase
//! date) and operator management (one numeric id). State lives in memory only
//! and is lost on restart.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use crate::dates::parse_purchase_date;

/// Which operator-management action is waiting for an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    Add,
    Remove,
}

/// A requester's pending flow. Absence from the table means idle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingFlow {
    AwaitingDescription,
    AwaitingDate { description: String },
    AwaitingOperatorId(AdminAction),
}

/// Why input was rejected without advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyDescription,
    BadDate,
    BadOperatorId,
}

/// Outcome of feeding one text message to a pending flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Input rejected; the flow stays where it was.
    Reprompt(PendingFlow, Rejection),
    /// Input accepted; the flow moves on.
    Next(PendingFlow),
    /// Record flow complete.
    CreateRecord {
        description: String,
        purchase_date: NaiveDate,
    },
    /// Operator flow complete.
    ApplyAdmin { action: AdminAction, operator_id: i64 },
}

/// Feed `text` to `state`.
pub fn advance(state: PendingFlow, text: &str) -> Transition {
    match state {
        PendingFlow::AwaitingDescription => {
            let description = text.trim();
            if description.is_empty() {
                Transition::Reprompt(PendingFlow::AwaitingDescription, Rejection::EmptyDescription)
            } else {
                Transition::Next(PendingFlow::AwaitingDate {
                    description: description.to_owned(),
                })
            }
        }
        PendingFlow::AwaitingDate { description } => match parse_purchase_date(text) {
            Ok(purchase_date) => Transition::CreateRecord {
                description,
                purchase_date,
            },
            Err(_) => Transition::Reprompt(PendingFlow::AwaitingDate { description }, Rejection::BadDate),
        },
        PendingFlow::AwaitingOperatorId(action) => match parse_operator_id(text) {
            Some(operator_id) => Transition::ApplyAdmin {
                action,
                operator_id,
            },
            None => Transition::Reprompt(
                PendingFlow::AwaitingOperatorId(action),
                Rejection::BadOperatorId,
            ),
        },
    }
}

/// Digits only after trimming; no sign.
pub fn parse_operator_id(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Pending flows keyed by requester id.
#[derive(Debug, Default)]
pub struct FlowTable {
    pending: Mutex<HashMap<i64, PendingFlow>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) a flow for `requester`.
    pub fn begin(&self, requester: i64, flow: PendingFlow) {
        self.map().insert(requester, flow);
    }

    /// Remove and return the pending flow.
    pub fn take(&self, requester: i64) -> Option<PendingFlow> {
        self.map().remove(&requester)
    }

    /// Current flow without clearing it.
    pub fn peek(&self, requester: i64) -> Option<PendingFlow> {
        self.map().get(&requester).cloned()
    }

    /// Drop any pending flow. Returns whether one existed.
    pub fn cancel(&self, requester: i64) -> bool {
        self.take(requester).is_some()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<i64, PendingFlow>> {
        // Entries are replaced whole, so a poisoned map is still consistent.
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

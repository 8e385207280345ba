//! Operator registry and the authorization check.
//!
//! The registry is backed by the store's `admins` table. While it is empty,
//! anyone talking to the bot in a private conversation is treated as an
//! operator so the first operator can register. Once one id is listed, only
//! listed ids pass.

use std::sync::Arc;

use crate::channels::traits::ConversationKind;
use crate::error::Result;
use crate::store::SubscriptionStore;

/// Mutable set of operator ids.
#[derive(Clone)]
pub struct AdminRegistry {
    store: Arc<SubscriptionStore>,
}

impl AdminRegistry {
    pub fn new(store: Arc<SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Operator ids in insertion order.
    pub fn list(&self) -> Result<Vec<i64>> {
        self.store.list_admins()
    }

    /// Returns `false` when the id was already registered.
    pub fn add(&self, id: i64) -> Result<bool> {
        let added = self.store.add_admin(id)?;
        if added {
            tracing::info!(operator = id, "operator added");
        }
        Ok(added)
    }

    /// Returns `false` when the id was not registered.
    pub fn remove(&self, id: i64) -> Result<bool> {
        let removed = self.store.remove_admin(id)?;
        if removed {
            tracing::info!(operator = id, "operator removed");
        }
        Ok(removed)
    }

    /// Insert the configured seed ids; existing entries are left alone.
    pub fn seed(&self, ids: &[i64]) -> Result<usize> {
        let mut added = 0;
        for id in ids {
            if self.store.add_admin(*id)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Whether `requester` may use the bot from a conversation of `kind`.
    ///
    /// A store failure denies.
    pub fn is_authorized(&self, requester: i64, kind: ConversationKind) -> bool {
        match self.store.list_admins() {
            Ok(ids) if ids.is_empty() => kind == ConversationKind::Private,
            Ok(ids) => ids.contains(&requester),
            Err(e) => {
                tracing::warn!(requester, error = %e, "operator lookup failed; denying");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn registry() -> AdminRegistry {
        let store = SubscriptionStore::open_in_memory(chrono_tz::UTC).expect("store");
        AdminRegistry::new(Arc::new(store))
    }

    // Privilege-escalation surface: with no operators registered, ANY private
    // chat user is authorized and can add themselves. Kept intentionally.
    #[test]
    fn empty_registry_authorizes_any_private_requester() {
        let reg = registry();
        assert!(reg.is_authorized(1234, ConversationKind::Private));
        assert!(reg.is_authorized(9999, ConversationKind::Private));
        assert!(!reg.is_authorized(1234, ConversationKind::Group));
    }

    #[test]
    fn populated_registry_only_authorizes_listed_ids() {
        let reg = registry();
        assert!(reg.add(42).expect("add"));
        assert!(reg.is_authorized(42, ConversationKind::Private));
        assert!(reg.is_authorized(42, ConversationKind::Group));
        assert!(!reg.is_authorized(1234, ConversationKind::Private));
        assert!(!reg.is_authorized(1234, ConversationKind::Group));
    }

    #[test]
    fn removing_last_operator_reopens_bootstrap() {
        let reg = registry();
        reg.add(42).expect("add");
        assert!(!reg.is_authorized(7, ConversationKind::Private));
        assert!(reg.remove(42).expect("remove"));
        assert!(reg.is_authorized(7, ConversationKind::Private));
    }

    #[test]
    fn add_is_idempotent_and_remove_reports_absence() {
        let reg = registry();
        assert!(reg.add(5).expect("add"));
        assert!(!reg.add(5).expect("re-add"));
        assert_eq!(reg.list().expect("list"), vec![5]);
        assert!(!reg.remove(6).expect("remove missing"));
    }

    #[test]
    fn seed_skips_existing_ids() {
        let reg = registry();
        reg.add(2).expect("add");
        assert_eq!(reg.seed(&[1, 2, 3]).expect("seed"), 2);
        assert_eq!(reg.list().expect("list"), vec![2, 1, 3]);
    }
}

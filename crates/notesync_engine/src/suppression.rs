//! Scoped suppression of the local-to-remote push path.
//!
//! Writes made while applying a chunk fire the same "document saved" event
//! as user edits. Holding a [`SuppressionGuard`] for the account makes
//! [`OutboundSync`](crate::OutboundSync) ignore those events.

use crate::account::AccountId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-account registry of active suppression guards.
#[derive(Debug, Clone, Default)]
pub struct PushSuppression {
    active: Arc<Mutex<HashMap<AccountId, usize>>>,
}

impl PushSuppression {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses pushes for `account` until the guard is dropped.
    pub fn suppress(&self, account: &AccountId) -> SuppressionGuard {
        *self.active.lock().entry(account.clone()).or_insert(0) += 1;
        SuppressionGuard {
            active: Arc::clone(&self.active),
            account: account.clone(),
        }
    }

    /// Returns true while any guard for `account` is alive.
    pub fn is_suppressed(&self, account: &AccountId) -> bool {
        self.active.lock().get(account).is_some_and(|n| *n > 0)
    }
}

/// Keeps pushes suppressed for one account while alive.
#[derive(Debug)]
#[must_use = "suppression ends when the guard is dropped"]
pub struct SuppressionGuard {
    active: Arc<Mutex<HashMap<AccountId, usize>>>,
    account: AccountId,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock();
        if let Some(count) = active.get_mut(&self.account) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&self.account);
            }
        }
    }
}

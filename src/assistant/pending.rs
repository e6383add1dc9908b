//! In-memory holding area for tool calls awaiting user confirmation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

use crate::core::ids::UserId;

/// A tool call waiting for the owner to confirm or reject it.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingToolCall {
    /// Function to run on confirmation.
    pub function_name: String,
    /// Parsed arguments.
    pub arguments: Value,
    /// User the call belongs to.
    pub owner: UserId,
    created_at: Instant,
}

/// Why a pending call could not be taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TakeError {
    /// No entry with that id, or it belongs to someone else.
    NotFound,
    /// The entry existed but outlived its TTL.
    Expired,
}

/// Map of pending tool calls keyed by upstream call id.
///
/// Entries expire after the configured TTL; expiry is checked on access
/// and enforced in bulk by [`PendingToolCalls::sweep`]. Process-local by
/// design: pending confirmations do not survive a restart.
#[derive(Clone)]
pub struct PendingToolCalls {
    entries: Arc<DashMap<String, PendingToolCall>>,
    ttl: Duration,
}

impl PendingToolCalls {
    /// An empty map whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Store a call awaiting confirmation. A repeated id overwrites the
    /// earlier entry.
    pub fn insert(&self, id: String, function_name: String, arguments: Value, owner: UserId) {
        self.entries.insert(
            id,
            PendingToolCall {
                function_name,
                arguments,
                owner,
                created_at: Instant::now(),
            },
        );
    }

    /// Remove and return the call with `id` if it belongs to `owner` and
    /// has not expired. An entry owned by someone else is reported as
    /// missing rather than leaked.
    ///
    /// # Errors
    /// [`TakeError::NotFound`] for an unknown or foreign id,
    /// [`TakeError::Expired`] when the entry outlived its TTL.
    pub fn take(&self, id: &str, owner: UserId) -> Result<PendingToolCall, TakeError> {
        let entry = self.entries.get(id).ok_or(TakeError::NotFound)?;
        if entry.owner != owner {
            return Err(TakeError::NotFound);
        }
        let expired = entry.created_at.elapsed() > self.ttl;
        drop(entry);

        // Remove in both cases: confirmation is single-shot.
        let (_, call) = self.entries.remove(id).ok_or(TakeError::NotFound)?;
        if expired {
            return Err(TakeError::Expired);
        }
        Ok(call)
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, call| call.created_at.elapsed() <= self.ttl);
        before - self.entries.len()
    }

    /// Number of live entries, expired ones included until swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn take_is_single_shot() {
        let pending = PendingToolCalls::new(Duration::from_secs(300));
        let owner = UserId::new();
        pending.insert(
            "call_1".to_string(),
            "create_task".to_string(),
            json!({"title": "T"}),
            owner,
        );

        let call = pending.take("call_1", owner).unwrap();
        assert_eq!(call.function_name, "create_task");
        assert_eq!(pending.take("call_1", owner), Err(TakeError::NotFound));
    }

    #[test]
    fn foreign_owner_cannot_take() {
        let pending = PendingToolCalls::new(Duration::from_secs(300));
        let owner = UserId::new();
        pending.insert("call_1".to_string(), "list_tasks".to_string(), json!({}), owner);

        assert_eq!(
            pending.take("call_1", UserId::new()),
            Err(TakeError::NotFound)
        );
        // Still there for the rightful owner.
        assert!(pending.take("call_1", owner).is_ok());
    }

    #[test]
    fn expired_entry_is_reported_and_removed() {
        let pending = PendingToolCalls::new(Duration::ZERO);
        let owner = UserId::new();
        pending.insert("call_1".to_string(), "list_tasks".to_string(), json!({}), owner);

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(pending.take("call_1", owner), Err(TakeError::Expired));
        assert!(pending.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let pending = PendingToolCalls::new(Duration::from_millis(10));
        let owner = UserId::new();
        pending.insert("old".to_string(), "list_tasks".to_string(), json!({}), owner);
        std::thread::sleep(Duration::from_millis(20));
        pending.insert("new".to_string(), "list_notes".to_string(), json!({}), owner);

        assert_eq!(pending.sweep(), 1);
        assert_eq!(pending.len(), 1);
        assert!(pending.take("new", owner).is_ok());
    }
}

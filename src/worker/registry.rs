//! Connection registry
//!
//! Maps each open connection to whoever is currently responsible for it.
//! Every component that hands a connection to a different owner updates
//! the registry, so the sweeper and diagnostics always see current
//! ownership.

use crate::worker::ConnId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Who is driving a connection right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// No fiber attached; waiting for request bytes or a pool slot.
    Idle,
    /// A request-processing fiber owns the connection.
    Fiber,
    /// User handler code is running; the connection must not be treated
    /// as an idle or timeout target until ownership is restored.
    Dispatch,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<ConnId, Owner>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted (or connected) socket as idle and
    /// returns its connection id.
    pub async fn register(&self) -> ConnId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().await.insert(id, Owner::Idle);
        id
    }

    pub async fn set_owner(&self, id: ConnId, owner: Owner) {
        if let Some(entry) = self.entries.lock().await.get_mut(&id) {
            *entry = owner;
        }
    }

    pub async fn owner(&self, id: ConnId) -> Option<Owner> {
        self.entries.lock().await.get(&id).copied()
    }

    /// Removes a closed connection. A connection stays registered for as
    /// long as its socket is open.
    pub async fn remove(&self, id: ConnId) {
        self.entries.lock().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn idle_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|o| **o == Owner::Idle)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_and_reattach() {
        let reg = ConnectionRegistry::new();
        let id = reg.register().await;
        assert_eq!(reg.owner(id).await, Some(Owner::Idle));

        reg.set_owner(id, Owner::Fiber).await;
        assert_eq!(reg.owner(id).await, Some(Owner::Fiber));

        reg.remove(id).await;
        assert_eq!(reg.owner(id).await, None);
        assert!(reg.is_empty().await);
    }
}

// ── Request correlation ──
//
// Pairs each emitted request with the acknowledgement that answers it.
// The first resolution wins; duplicate, late and orphaned acks are
// dropped. A guard removes the entry when the waiting future goes away,
// whether it completed, timed out or was dropped.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outstanding requests keyed by id.
#[derive(Default)]
pub struct PendingTable {
    pending: DashMap<RequestId, oneshot::Sender<Value>>,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a slot. Keep the guard alive for as long as the reply matters.
    pub fn register(self: &Arc<Self>) -> (PendingGuard, oneshot::Receiver<Value>) {
        let id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let guard = PendingGuard {
            table: Arc::clone(self),
            id,
        };
        (guard, rx)
    }

    /// Deliver a reply. Returns `false` when nobody is waiting for it.
    pub fn resolve(&self, id: RequestId, reply: Value) -> bool {
        let Some((_, tx)) = self.pending.remove(&id) else {
            debug!(request_id = %id, "ack for unknown or settled request ignored");
            return false;
        };
        if tx.send(reply).is_err() {
            debug!(request_id = %id, "ack arrived after the caller gave up");
            return false;
        }
        true
    }

    /// Drop every waiter; their futures resolve as abandoned.
    pub fn clear(&self) {
        let abandoned = self.pending.len();
        self.pending.clear();
        if abandoned > 0 {
            debug!(abandoned, "pending requests abandoned");
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Removes its table entry on drop.
pub struct PendingGuard {
    table: Arc<PendingTable>,
    id: RequestId,
}

impl PendingGuard {
    pub fn id(&self) -> RequestId {
        self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.pending.remove(&self.id);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn first_resolution_wins() {
        let table = PendingTable::new();
        let (guard, rx) = table.register();

        assert!(table.resolve(guard.id(), json!(1)));
        assert!(!table.resolve(guard.id(), json!(2)));
        assert_eq!(rx.await.unwrap(), json!(1));
    }

    #[test]
    fn dropping_the_guard_removes_the_entry() {
        let table = PendingTable::new();
        let (guard, _rx) = table.register();
        let id = guard.id();
        assert_eq!(table.len(), 1);

        drop(guard);
        assert!(table.is_empty());
        assert!(!table.resolve(id, json!(null)));
    }

    #[tokio::test]
    async fn clear_abandons_waiters() {
        let table = PendingTable::new();
        let (_guard, rx) = table.register();
        table.clear();
        assert!(rx.await.is_err());
    }
}

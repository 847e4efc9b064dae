//! CorrelationTable: matches results to the calls that are waiting on them.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use wsrpc_protocol::{CallId, Payload};
use wsrpc_transport::ClientId;

/// Who a pending call was sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOwner {
    pub client_id: ClientId,
    /// Serial of the connection the call was written to.
    pub serial: u64,
}

struct PendingCall {
    owner: CallOwner,
    slot: oneshot::Sender<Payload>,
}

/// Outstanding calls keyed by correlation id.
///
/// Removing the entry from the map is what makes delivery exactly-once:
/// whichever of fulfill/abort removes it first owns the slot.
pub struct CorrelationTable {
    next_id: AtomicU64,
    pending: DashMap<CallId, PendingCall>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            pending: DashMap::new(),
        }
    }

    /// Next correlation id. Starts at 1; never reused within the process.
    pub fn next_id(&self) -> CallId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Create the delivery slot for `id` and return its receiving end.
    pub fn register(&self, id: CallId, owner: CallOwner) -> oneshot::Receiver<Payload> {
        let (slot, rx) = oneshot::channel();
        if self.pending.insert(id, PendingCall { owner, slot }).is_some() {
            warn!("Correlation id {id} registered twice; earlier waiter dropped");
        }
        rx
    }

    /// Deliver `value` to the call waiting on `id`.
    ///
    /// Unknown ids (never issued, already answered, aborted) are dropped.
    /// Returns whether a waiter received the value.
    pub fn fulfill(&self, id: CallId, value: Payload) -> bool {
        let Some((_, call)) = self.pending.remove(&id) else {
            debug!("Dropping result for unknown call {id}");
            return false;
        };
        if call.slot.send(value).is_err() {
            debug!("Waiter for call {id} ({}) is gone", call.owner.client_id);
            return false;
        }
        true
    }

    /// Close the slot for `id` without a value.
    pub fn abort(&self, id: CallId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Abort every call sent to `client_id`, on any connection.
    pub fn abort_client(&self, client_id: &ClientId) -> usize {
        self.abort_where(|owner| &owner.client_id == client_id)
    }

    /// Abort every call written to the connection with `serial`.
    pub fn abort_connection(&self, serial: u64) -> usize {
        self.abort_where(|owner| owner.serial == serial)
    }

    fn abort_where(&self, matches: impl Fn(&CallOwner) -> bool) -> usize {
        let ids: Vec<CallId> = self
            .pending
            .iter()
            .filter(|entry| matches(&entry.value().owner))
            .map(|entry| *entry.key())
            .collect();
        ids.into_iter().filter(|id| self.abort(*id)).count()
    }

    /// Number of outstanding calls.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: CallId) -> bool {
        self.pending.contains_key(&id)
    }
}

impl Default for CorrelationTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn owner(client: &str, serial: u64) -> CallOwner {
        CallOwner {
            client_id: ClientId::from(client),
            serial,
        }
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let table = CorrelationTable::new();
        assert_eq!(table.next_id(), 1);
        assert_eq!(table.next_id(), 2);
        assert_eq!(table.next_id(), 3);
    }

    #[test]
    fn concurrent_ids_are_unique() {
        let table = Arc::new(CorrelationTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                std::thread::spawn(move || (0..1000).map(|_| table.next_id()).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 8000);
    }

    #[tokio::test]
    async fn fulfill_delivers_once() {
        let table = CorrelationTable::new();
        let id = table.next_id();
        let rx = table.register(id, owner("a", 1));

        assert!(table.fulfill(id, json!(7)));
        assert_eq!(rx.await.unwrap(), json!(7));
        assert!(!table.fulfill(id, json!(8)), "duplicate must be dropped");
        assert_eq!(table.pending(), 0);
    }

    #[tokio::test]
    async fn unknown_result_leaves_others_untouched() {
        let table = CorrelationTable::new();
        let a = table.next_id();
        let b = table.next_id();
        let mut rx_a = table.register(a, owner("c", 1));
        let rx_b = table.register(b, owner("c", 1));

        assert!(!table.fulfill(999, json!("stray")));
        assert_eq!(table.pending(), 2);

        assert!(table.fulfill(b, json!("b")));
        assert_eq!(rx_b.await.unwrap(), json!("b"));
        assert!(rx_a.try_recv().is_err());
        assert!(table.is_pending(a));
    }

    #[tokio::test]
    async fn abort_closes_without_value() {
        let table = CorrelationTable::new();
        let id = table.next_id();
        let rx = table.register(id, owner("a", 1));
        assert!(table.abort(id));
        assert!(rx.await.is_err());
        assert!(!table.abort(id));
        assert!(!table.fulfill(id, json!(1)));
    }

    #[tokio::test]
    async fn abort_connection_only_hits_that_serial() {
        let table = CorrelationTable::new();
        let old = table.register(table.next_id(), owner("x", 1));
        let new = table.register(table.next_id(), owner("x", 2));
        let other = table.register(table.next_id(), owner("y", 3));

        assert_eq!(table.abort_connection(1), 1);
        assert!(old.await.is_err());
        assert_eq!(table.pending(), 2);

        assert_eq!(table.abort_client(&ClientId::from("x")), 1);
        assert!(new.await.is_err());
        assert_eq!(table.pending(), 1);
        drop(other);
    }

    #[tokio::test]
    async fn fulfill_after_waiter_dropped_reports_false() {
        let table = CorrelationTable::new();
        let id = table.next_id();
        drop(table.register(id, owner("a", 1)));
        assert!(!table.fulfill(id, json!(null)));
        assert_eq!(table.pending(), 0);
    }
}

//! ConnectionRegistry: maps a client id to its live connection.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::connection::{ClientId, Connection};

/// Client id → connection.
///
/// Uses parking_lot::RwLock so lookups from request handlers and removals
/// from session teardown never hold the lock across an await.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ClientId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the connection for its client id.
    /// Returns the connection that was replaced, if any.
    pub fn register(&self, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        let client_id = conn.client_id().clone();
        let replaced = self.connections.write().insert(client_id.clone(), conn);
        match &replaced {
            Some(old) => info!("Connection replaced: {client_id} (serial {})", old.serial()),
            None => debug!("Connection registered: {client_id}"),
        }
        replaced
    }

    pub fn lookup(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        self.connections.read().get(client_id).cloned()
    }

    pub fn remove(&self, client_id: &ClientId) -> Option<Arc<Connection>> {
        self.connections.write().remove(client_id)
    }

    /// Remove the entry only if it is still the connection with `serial`.
    ///
    /// A session tearing down must not evict a newer connection that
    /// re-registered the same client id.
    pub fn remove_if_current(&self, client_id: &ClientId, serial: u64) -> bool {
        let mut connections = self.connections.write();
        match connections.get(client_id) {
            Some(conn) if conn.serial() == serial => {
                connections.remove(client_id);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.connections.read().contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.connections.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::connection;

    #[test]
    fn register_lookup_remove() {
        let reg = ConnectionRegistry::new();
        let (conn, _rx) = connection("alice");
        let conn = Arc::new(conn);
        assert!(reg.register(conn.clone()).is_none());

        let found = reg.lookup(&ClientId::from("alice")).unwrap();
        assert!(Arc::ptr_eq(&found, &conn));
        assert_eq!(reg.len(), 1);

        assert!(reg.remove(&ClientId::from("alice")).is_some());
        assert!(reg.lookup(&ClientId::from("alice")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn register_replaces_same_client() {
        let reg = ConnectionRegistry::new();
        let (first, _r1) = connection("bob");
        let (second, _r2) = connection("bob");
        let first = Arc::new(first);
        let second = Arc::new(second);

        reg.register(first.clone());
        let replaced = reg.register(second.clone()).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert_eq!(reg.lookup(&ClientId::from("bob")).unwrap().serial(), second.serial());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn stale_teardown_keeps_newer_connection() {
        let reg = ConnectionRegistry::new();
        let (old, _r1) = connection("carol");
        let (new, _r2) = connection("carol");
        let (old, new) = (Arc::new(old), Arc::new(new));
        let id = ClientId::from("carol");

        reg.register(old.clone());
        reg.register(new.clone());
        assert!(!reg.remove_if_current(&id, old.serial()));
        assert!(reg.contains(&id));
        assert!(reg.remove_if_current(&id, new.serial()));
        assert!(!reg.contains(&id));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let reg = ConnectionRegistry::new();
        assert!(reg.remove(&ClientId::from("nobody")).is_none());
        assert!(!reg.remove_if_current(&ClientId::from("nobody"), 1));
    }

    #[test]
    fn client_ids_lists_all() {
        let reg = ConnectionRegistry::new();
        for name in ["x", "y", "z"] {
            let (c, _rx) = connection(name);
            reg.register(Arc::new(c));
        }
        let mut ids = reg.client_ids();
        ids.sort();
        assert_eq!(ids, vec![ClientId::from("x"), ClientId::from("y"), ClientId::from("z")]);
    }
}

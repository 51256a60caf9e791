//! Connection manager for tracking UDP peers by address.

use super::{client::OutboundDatagram, Connection, ConnectionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Central registry of live connections.
#[derive(Debug)]
pub struct ConnectionManager {
    connections: DashMap<SocketAddr, Arc<Connection>>,
    next_id: AtomicU64,
    max_connections: usize,
    outbound: mpsc::UnboundedSender<OutboundDatagram>,
}

impl ConnectionManager {
    pub fn new(max_connections: usize, outbound: mpsc::UnboundedSender<OutboundDatagram>) -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_connections,
            outbound,
        }
    }

    /// Returns the connection for `remote_addr`, creating it on first contact.
    ///
    /// Returns `None` when the server is at capacity.
    pub fn get_or_create(&self, remote_addr: SocketAddr) -> Option<Arc<Connection>> {
        if let Some(existing) = self.connections.get(&remote_addr) {
            return Some(existing.clone());
        }

        if self.connections.len() >= self.max_connections {
            warn!(
                "🚫 Dropping datagram from {}: connection limit of {} reached",
                remote_addr, self.max_connections
            );
            return None;
        }

        let connection = match self.connections.entry(remote_addr) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let connection = Arc::new(Connection::new(id, remote_addr, self.outbound.clone()));
                entry.insert(connection.clone());
                info!("🔗 Connection {} from {}", id, remote_addr);
                connection
            }
        };

        Some(connection)
    }

    pub fn get(&self, remote_addr: &SocketAddr) -> Option<Arc<Connection>> {
        self.connections.get(remote_addr).map(|entry| entry.clone())
    }

    pub fn get_by_id(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .iter()
            .find(|entry| entry.id() == id)
            .map(|entry| entry.clone())
    }

    pub fn remove(&self, remote_addr: &SocketAddr) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(remote_addr).map(|(_, connection)| connection);
        if let Some(connection) = &removed {
            info!(
                "❌ Connection {} from {} removed",
                connection.id(),
                connection.remote_addr()
            );
        }
        removed
    }

    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|entry| entry.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_address_reuses_connection() {
        let (sender, _rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(10, sender);
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        let first = manager.get_or_create(addr).unwrap();
        let second = manager.get_or_create(addr).unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get_by_id(first.id()).unwrap().remote_addr(), addr);

        manager.remove(&addr);
        let third = manager.get_or_create(addr).unwrap();
        assert_ne!(first.id(), third.id());
    }

    #[test]
    fn test_capacity_limit() {
        let (sender, _rx) = mpsc::unbounded_channel();
        let manager = ConnectionManager::new(1, sender);

        assert!(manager.get_or_create("127.0.0.1:5000".parse().unwrap()).is_some());
        assert!(manager.get_or_create("127.0.0.1:5001".parse().unwrap()).is_none());
        assert!(manager.get_or_create("127.0.0.1:5000".parse().unwrap()).is_some());
    }
}

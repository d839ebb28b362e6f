//! # Connection Registry
//!
//! Tracks open chat connections for capacity limiting and health reporting.
//! Sessions register on start and deregister on stop; the registry is shared
//! across the actix workers behind a `std::sync::RwLock` (all operations are
//! short and never await).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Metadata kept per open connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// When the connection registered
    pub connected_at: DateTime<Utc>,

    /// Remote peer address, when the transport exposes one
    pub peer: Option<String>,
}

/// Shared registry of open chat connections.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, ConnectionInfo>>,
    max_connections: usize,
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
        }
    }

    /// Register a new connection, returning its ID.
    ///
    /// Fails when the configured connection cap is reached; the caller is
    /// expected to refuse the connection with an error message.
    pub fn register(&self, peer: Option<String>) -> Result<Uuid, String> {
        let mut connections = self
            .connections
            .write()
            .map_err(|_| "Connection registry lock poisoned".to_string())?;

        if connections.len() >= self.max_connections {
            warn!(
                "Refusing chat connection: {} active (limit {})",
                connections.len(),
                self.max_connections
            );
            return Err(format!(
                "Maximum number of connections reached ({})",
                self.max_connections
            ));
        }

        let id = Uuid::new_v4();
        connections.insert(
            id,
            ConnectionInfo {
                connected_at: Utc::now(),
                peer,
            },
        );
        debug!("Registered chat connection {}", id);
        Ok(id)
    }

    /// Remove a connection. Removing an unknown ID is a no-op.
    pub fn deregister(&self, id: &Uuid) {
        if let Ok(mut connections) = self.connections.write() {
            if connections.remove(id).is_some() {
                debug!("Deregistered chat connection {}", id);
            }
        }
    }

    /// Number of currently open connections.
    pub fn count(&self) -> usize {
        self.connections.read().map(|c| c.len()).unwrap_or(0)
    }

    /// IDs of currently open connections.
    pub fn ids(&self) -> Vec<Uuid> {
        self.connections
            .read()
            .map(|c| c.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let registry = ConnectionRegistry::new(4);
        let id = registry.register(Some("127.0.0.1:5000".to_string())).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.ids().contains(&id));

        registry.deregister(&id);
        assert_eq!(registry.count(), 0);

        // Removing again is harmless.
        registry.deregister(&id);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_capacity_limit_refuses_extra_connections() {
        let registry = ConnectionRegistry::new(2);
        let first = registry.register(None).unwrap();
        registry.register(None).unwrap();

        let refused = registry.register(None);
        assert!(refused.is_err());
        assert_eq!(registry.count(), 2);

        // Capacity frees up after a deregister.
        registry.deregister(&first);
        assert!(registry.register(None).is_ok());
    }

    #[test]
    fn test_concurrent_register_respects_cap() {
        use std::sync::Arc;

        let registry = Arc::new(ConnectionRegistry::new(8));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.register(None).is_ok())
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|accepted| *accepted)
            .count();
        assert_eq!(accepted, 8);
        assert_eq!(registry.count(), 8);
    }
}

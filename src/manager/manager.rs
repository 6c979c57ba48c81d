use crate::core::config::ConnectOptions;
use crate::core::connection::{Connection, ConnectionMetrics, SendOutcome};
use crate::envelope::Envelope;
use crate::router::MessageRouter;
use crate::traits::{DuraSockError, Result, Transport};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregate snapshot over all managed connections
#[derive(Debug, Clone)]
pub struct ManagerMetrics {
    pub total_connections: usize,
    pub per_connection: Vec<ConnectionMetrics>,
}

/// Owner of a named collection of [`Connection`]s
///
/// Every connection it creates feeds the shared [`MessageRouter`], each
/// dispatched message tagged with its originating identity and a receipt
/// timestamp, so handlers can discriminate by source. The manager is a plain
/// value: construct one per scope and pass it around; independent instances
/// coexist freely (tests included).
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, Connection>>,
    router: Arc<MessageRouter>,
    transport: Arc<dyn Transport>,
}

impl ConnectionManager {
    /// Create a manager with its own router
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_router(transport, Arc::new(MessageRouter::new()))
    }

    /// Create a manager around an existing shared router
    pub fn with_router(transport: Arc<dyn Transport>, router: Arc<MessageRouter>) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            router,
            transport,
        }
    }

    /// The shared router all managed connections dispatch into
    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    /// Create and register a connection under `identity`
    ///
    /// The connection is spawned but not connected; call
    /// [`Connection::connect`] on the returned handle. Fails with
    /// [`DuraSockError::DuplicateIdentity`] when the identity is taken.
    pub fn create_connection(
        &self,
        identity: impl Into<String>,
        target: impl Into<String>,
        options: ConnectOptions,
    ) -> Result<Connection> {
        let identity = identity.into();
        let mut connections = self.connections.write();

        if connections.contains_key(&identity) {
            return Err(DuraSockError::DuplicateIdentity(identity));
        }

        let connection = Connection::spawn_routed(
            identity.clone(),
            target,
            options,
            Arc::clone(&self.transport),
            Some(Arc::clone(&self.router)),
        );
        connections.insert(identity.clone(), connection.clone());
        info!(%identity, "connection registered");
        Ok(connection)
    }

    /// Look up a connection by identity
    pub fn get_connection(&self, identity: &str) -> Option<Connection> {
        self.connections.read().get(identity).cloned()
    }

    /// Close and delete a connection; no-op if absent
    pub fn remove_connection(&self, identity: &str) {
        let removed = self.connections.write().remove(identity);
        if let Some(connection) = removed {
            debug!(%identity, "removing connection");
            let _ = connection.close();
        }
    }

    /// Send to one connection by identity
    ///
    /// Fails with [`DuraSockError::UnknownIdentity`] when no such connection
    /// exists; otherwise the usual send semantics apply (queued when not
    /// sendable).
    pub async fn send_to(&self, identity: &str, envelope: Envelope) -> Result<SendOutcome> {
        let connection = self
            .get_connection(identity)
            .ok_or_else(|| DuraSockError::UnknownIdentity(identity.to_string()))?;
        connection.send(envelope).await
    }

    /// Best-effort broadcast to every sendable connection
    ///
    /// Connections named in `exclude` and connections not currently sendable
    /// are skipped silently; nothing is ever enqueued. Returns the number of
    /// connections the envelope was delivered to.
    pub async fn broadcast(&self, envelope: Envelope, exclude: &[&str]) -> usize {
        let targets: Vec<Connection> = {
            let connections = self.connections.read();
            connections
                .iter()
                .filter(|(identity, _)| !exclude.contains(&identity.as_str()))
                .map(|(_, connection)| connection.clone())
                .collect()
        };

        let mut count = 0;
        for connection in targets {
            if connection.send_if_sendable(envelope.clone()).await {
                count += 1;
            }
        }
        count
    }

    /// Number of managed connections
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Identities of all managed connections
    pub fn identities(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Check if an identity is registered
    pub fn has_connection(&self, identity: &str) -> bool {
        self.connections.read().contains_key(identity)
    }

    /// Snapshot of every managed connection
    pub async fn metrics(&self) -> ManagerMetrics {
        let connections: Vec<Connection> = {
            let map = self.connections.read();
            map.values().cloned().collect()
        };

        let mut per_connection = Vec::with_capacity(connections.len());
        for connection in connections {
            if let Ok(snapshot) = connection.metrics().await {
                per_connection.push(snapshot);
            }
        }
        // Stable output regardless of map iteration order
        per_connection.sort_by(|a, b| a.identity.cmp(&b.identity));

        ManagerMetrics {
            total_connections: per_connection.len(),
            per_connection,
        }
    }

    /// Close every owned connection exactly once and drop them
    pub fn shutdown(self) {
        info!("shutting down connection manager");
        let connections = {
            let mut map = self.connections.write();
            std::mem::take(&mut *map)
        };
        for (identity, connection) in connections {
            debug!(%identity, "closing connection");
            let _ = connection.close();
        }
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use yurpc_common::protocol::error::{Result, YurpcError};
use yurpc_common::ClientConfig;

use crate::connection::Connection;
use crate::pending::PendingRequests;

/// Per-address connect coordination.
///
/// `finished` counts completed connect attempts. A caller snapshots it before
/// queueing on `lock`; if it moved by the time the lock is granted, another
/// caller already attempted the connect on its behalf and its outcome is
/// reused instead of dialing again.
#[derive(Default)]
struct ConnectSlot {
    finished: AtomicU64,
    lock: tokio::sync::Mutex<Option<String>>,
}

/// Cache of open connections, one per `host:port`.
///
/// Connections are created lazily on first use and shared by every caller
/// targeting the same address. Concurrent first uses of an address result in
/// a single connect attempt (double-checked under a per-address lock), so the
/// map never holds two connections for one address.
///
/// A cached connection found dead is evicted and reported as a failure to the
/// current caller; the next acquire reconnects.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use yurpc_client::{ConnectionManager, PendingRequests};
/// use yurpc_common::ClientConfig;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ConnectionManager::new(ClientConfig::default(), Arc::new(PendingRequests::new()));
///
/// let first = manager.acquire("127.0.0.1", 7777).await?;
/// let again = manager.acquire("127.0.0.1", 7777).await?;
/// assert!(Arc::ptr_eq(&first, &again));
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    config: ClientConfig,
    pending: Arc<PendingRequests>,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    slots: Mutex<HashMap<String, Arc<ConnectSlot>>>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig, pending: Arc<PendingRequests>) -> Self {
        Self {
            config,
            pending,
            connections: Mutex::new(HashMap::new()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, addr: &str) -> Arc<ConnectSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(addr.to_string()).or_default())
    }

    /// Drops the slot for `addr` once no other caller holds it.
    ///
    /// Clones are only handed out under the `slots` lock, so a count of two
    /// (the map's and ours) means nobody is queued on it.
    fn release_slot(&self, addr: &str, slot: Arc<ConnectSlot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = Arc::strong_count(&slot) == 2;
        // Released under the lock so a concurrent releaser sees the new count
        drop(slot);
        if idle {
            slots.remove(addr);
        }
    }

    /// Returns the open connection to `host:port`, connecting if none exists.
    ///
    /// # Errors
    ///
    /// - [`YurpcError::Connection`] when the cached connection turned out to
    ///   be dead (it is evicted first) or the connect was refused
    /// - [`YurpcError::Timeout`] when the connect exceeded the configured
    ///   connect timeout
    pub async fn acquire(&self, host: &str, port: u16) -> Result<Arc<Connection>> {
        let addr = format!("{}:{}", host, port);

        if let Some(conn) = self.cached(&addr)? {
            return Ok(conn);
        }

        let slot = self.slot(&addr);
        let outcome = self.connect_once(&addr, &slot).await;
        self.release_slot(&addr, slot);
        outcome
    }

    /// Connects to `addr` unless a caller queued ahead on `slot` already did.
    async fn connect_once(&self, addr: &str, slot: &ConnectSlot) -> Result<Arc<Connection>> {
        let seen = slot.finished.load(Ordering::Acquire);
        let mut last_error = slot.lock.lock().await;

        // Re-check: whoever held the lock may have connected already
        if let Some(conn) = self.cached(addr)? {
            return Ok(conn);
        }
        if slot.finished.load(Ordering::Acquire) != seen {
            if let Some(cause) = last_error.as_ref() {
                return Err(YurpcError::Connection(cause.clone()));
            }
        }

        tracing::debug!(addr = %addr, "Opening connection");
        let outcome = Connection::open(addr, &self.config, Arc::clone(&self.pending)).await;
        slot.finished.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(conn) => {
                *last_error = None;
                self.connections().insert(addr.to_string(), Arc::clone(&conn));
                Ok(conn)
            }
            Err(e) => {
                tracing::warn!(addr = %addr, error = %e, "Failed to connect");
                *last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Looks `addr` up in the cache. A dead entry is evicted and reported.
    fn cached(&self, addr: &str) -> Result<Option<Arc<Connection>>> {
        let mut connections = self.connections();
        match connections.get(addr) {
            Some(conn) if conn.is_alive() => Ok(Some(Arc::clone(conn))),
            Some(_) => {
                connections.remove(addr);
                tracing::info!(addr = %addr, "Evicted closed connection");
                Err(YurpcError::Connection(format!("Connection to {} is closed", addr)))
            }
            None => Ok(None),
        }
    }

    /// Number of cached connections, dead or alive.
    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    /// Closes and forgets every cached connection.
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.connections().drain().collect();
        for (addr, conn) in drained {
            match conn.close().await {
                Ok(()) => tracing::info!(addr = %addr, "Connection closed"),
                Err(e) => tracing::warn!(addr = %addr, error = %e, "Failed to close connection"),
            }
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connections", &self.connection_count())
            .finish()
    }
}

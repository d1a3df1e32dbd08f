// src/core/connection_cache.rs

//! Per-worker connection multiplexing. Each async worker gets its own table
//! of live connections, keyed by server identity, so that concurrent
//! requests never fight over a single socket. The whole cache is rebuilt
//! whenever the cluster view's `view_number` advances, since a stale
//! connection to a server that's no longer in any replica set is better
//! dropped than kept warm.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::core::connection::{BackendConnection, Connector, ServerIdentity};
use crate::core::errors::Result;

/// Identifies one worker (tokio task / thread) for the purpose of keying the
/// connection table. Workers don't need global identity, just stability for
/// the lifetime of the cache.
pub type WorkerId = u64;

struct WorkerConnections {
    connections: std::collections::HashMap<ServerIdentity, Box<dyn BackendConnection>>,
    ever_connected: std::collections::HashSet<ServerIdentity>,
}

impl WorkerConnections {
    fn new() -> Self {
        Self {
            connections: std::collections::HashMap::new(),
            ever_connected: std::collections::HashSet::new(),
        }
    }
}

/// Caches one connection per `(worker, server)` pair and rebuilds itself
/// whenever the cluster view it was built against goes stale.
pub struct ConnectionCache<C: Connector> {
    connector: Arc<C>,
    workers: DashMap<WorkerId, Mutex<WorkerConnections>>,
    view_number: AtomicU64,
}

impl<C: Connector> ConnectionCache<C> {
    pub fn new(connector: Arc<C>) -> Self {
        Self {
            connector,
            workers: DashMap::new(),
            view_number: AtomicU64::new(0),
        }
    }

    /// Drops all cached connections if `view_number` has advanced past what
    /// this cache was last built against.
    pub fn reconfigure(&self, view_number: u64) {
        let previous = self.view_number.swap(view_number, Ordering::SeqCst);
        if previous != view_number {
            self.workers.clear();
        }
    }

    /// Runs `f` with a live connection to `server` for `worker`, creating one
    /// if none is cached yet. On any error, the cached connection is dropped
    /// so the next call reconnects from scratch.
    pub async fn with_connection<F, Fut, T>(
        &self,
        worker: WorkerId,
        server: &ServerIdentity,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut dyn BackendConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let entry = self
            .workers
            .entry(worker)
            .or_insert_with(|| Mutex::new(WorkerConnections::new()));

        let had_connection = {
            let guard = entry.lock();
            guard.connections.contains_key(server)
        };

        if !had_connection {
            let has_connected_before = {
                let guard = entry.lock();
                guard.ever_connected.contains(server)
            };
            let conn = self.connector.connect(server, has_connected_before).await?;
            let mut guard = entry.lock();
            guard.connections.insert(server.clone(), conn);
            guard.ever_connected.insert(server.clone());
        }

        // The connection is taken out of the map for the duration of the
        // call so that `f` can hold a plain `&mut dyn BackendConnection`
        // without fighting the cache's own lock.
        let mut conn = {
            let mut guard = entry.lock();
            guard.connections.remove(server)
        };

        let Some(mut backend) = conn.take() else {
            unreachable!("connection was just inserted");
        };

        let result = f(backend.as_mut()).await;

        match &result {
            Ok(_) => {
                let mut guard = entry.lock();
                guard.connections.insert(server.clone(), backend);
            }
            Err(_) => {
                // drop the connection; next call reconnects.
            }
        }

        result
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

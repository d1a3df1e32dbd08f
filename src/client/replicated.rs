// src/client/replicated.rs

//! The replicated get/set/delete state machine: replica iteration with
//! single-replica double-attempt and short-circuit-on-hit, the shared
//! add-overwriting-tombstone retry loop for `cas == 0` writes, and
//! primary-write-then-best-effort-fan-out for everything else.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::current_worker_id;
use crate::client::replica_source::ReplicaSource;
use crate::core::comm_monitor::{AlarmSink, CommMonitor};
use crate::core::connection::{Connector, GetResult, WriteResult};
use crate::core::connection_cache::ConnectionCache;
use crate::core::errors::{MeshKvError, Result};
use crate::key::fully_qualified_key;
use crate::record::{TOMBSTONE_PAYLOAD, backend_expiration, is_tombstone, write_timestamp_flags};
use crate::stats::StatsEngine;
use crate::store::{DeleteOutcome, GetOutcome, SetOutcome, Store};

/// Number of attempts `add_overwriting_tombstone` makes before giving up and
/// reporting contention. A single retry is enough to resolve the ordinary
/// race (we lose an add to a tombstone write that's concurrently expiring);
/// anything that still contends after that is a real conflict.
const MAX_ADD_ATTEMPTS: u32 = 2;

pub struct ReplicatedClient<R: ReplicaSource, C: Connector> {
    source: R,
    cache: Arc<ConnectionCache<C>>,
    stats: Option<Arc<StatsEngine>>,
    comm_monitor: Option<Arc<CommMonitor<Box<dyn AlarmSink>>>>,
}

impl<R: ReplicaSource, C: Connector> ReplicatedClient<R, C> {
    pub fn new(source: R, cache: Arc<ConnectionCache<C>>) -> Self {
        Self {
            source,
            cache,
            stats: None,
            comm_monitor: None,
        }
    }

    /// Attaches call-rate statistics and communication-health monitoring.
    /// Both observe outcomes already produced by the state machine below;
    /// neither changes what `get`/`set`/`delete` return.
    pub fn with_observers(
        mut self,
        stats: Arc<StatsEngine>,
        comm_monitor: Arc<CommMonitor<Box<dyn AlarmSink>>>,
    ) -> Self {
        self.stats = Some(stats);
        self.comm_monitor = Some(comm_monitor);
        self
    }

    async fn try_get(&self, vbucket: u16, server: &str, fqkey: &str) -> Result<GetResult> {
        let worker = current_worker_id();
        let server = server.to_string();
        let fqkey_owned = fqkey.to_string();
        self.cache
            .with_connection(worker, &server, move |conn| {
                let key = fqkey_owned.clone();
                async move { conn.get(vbucket, key.as_bytes()).await }
            })
            .await
    }

    /// Reads `fqkey` from the read-replica list, trying each in turn.
    /// A list of exactly one replica is tried twice (a transient connection
    /// drop shouldn't be reported as a miss when there's only one place to
    /// look), and the first replica to answer `Found` short-circuits the
    /// rest.
    async fn replicated_get(&self, fqkey: &str) -> Result<GetOutcome> {
        let started = std::time::Instant::now();
        let outcome = self.replicated_get_inner(fqkey).await;
        self.observe_get(&outcome, started.elapsed());
        outcome
    }

    async fn replicated_get_inner(&self, fqkey: &str) -> Result<GetOutcome> {
        let (vbucket, replicas) = self.source.read_replicas(fqkey);
        if replicas.is_empty() {
            return Err(MeshKvError::NoConnection(fqkey.to_string()));
        }

        let attempts_per_replica = if replicas.len() == 1 { 2 } else { 1 };
        let mut last_err = None;
        let mut any_not_found = false;

        for server in &replicas {
            let mut found = None;
            for _ in 0..attempts_per_replica {
                match self.try_get(vbucket, server, fqkey).await {
                    Ok(GetResult::Found { value, cas, .. }) => {
                        found = Some((value, cas));
                        break;
                    }
                    Ok(GetResult::NotFound) => {
                        any_not_found = true;
                        break;
                    }
                    Err(e) => {
                        warn!("get to '{server}' failed: {e}");
                        self.source.report_failure(server);
                        last_err = Some(e);
                    }
                }
            }

            if let Some((value, cas)) = found {
                if is_tombstone(&value) {
                    return Ok(GetOutcome::NotFound);
                }
                // An earlier replica's authoritative NOTFOUND means it has no
                // record at all for this key; zeroing the CAS here forces a
                // subsequent set(cas=0) to succeed there instead of contending
                // with a CAS token that replica has never seen.
                let cas = if any_not_found { 0 } else { cas };
                return Ok(GetOutcome::Ok {
                    data: value.to_vec(),
                    cas,
                });
            }
        }

        if any_not_found {
            return Ok(GetOutcome::NotFound);
        }

        Err(last_err.unwrap_or_else(|| MeshKvError::NoConnection(fqkey.to_string())))
    }

    /// Success on any reachable outcome (a hit, a miss, or a tombstone);
    /// failure only when every replica in the read set was unreachable.
    fn observe_get(&self, outcome: &Result<GetOutcome>, elapsed: std::time::Duration) {
        if let Some(monitor) = &self.comm_monitor {
            match outcome {
                Ok(_) => monitor.inform_success(),
                Err(_) => monitor.inform_failure(),
            }
        }
        if let Some(stats) = &self.stats {
            stats.record_latency("get_latency_us", elapsed.as_micros() as i64);
            match outcome {
                Ok(GetOutcome::Ok { .. }) => stats.increment("get"),
                Ok(GetOutcome::NotFound) => {
                    stats.increment("get");
                    stats.increment("get_not_found");
                }
                Err(_) => {}
            }
        }
    }

    /// The add-or-overwrite-tombstone loop shared by both client variants:
    /// attempt an unconditional `add`; if the key already holds live data,
    /// that's real contention; if it holds a tombstone, read its CAS and
    /// retry as a conditional update, bounded to `MAX_ADD_ATTEMPTS`. Targets
    /// a single replica — `set` calls this once per replica in its failover
    /// loop.
    async fn add_overwriting_tombstone(
        &self,
        vbucket: u16,
        server: &str,
        fqkey: &str,
        data: &[u8],
        flags: u32,
        expiration: u32,
    ) -> Result<SetOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let worker = current_worker_id();
            let server_owned = server.to_string();
            let fqkey_owned = fqkey.to_string();
            let value = data.to_vec();

            let result = self
                .cache
                .with_connection(worker, &server_owned, move |conn| {
                    let key = fqkey_owned.clone();
                    let value = value.clone();
                    async move {
                        conn.add_or_cas(vbucket, key.as_bytes(), &value, flags, expiration, 0)
                            .await
                    }
                })
                .await?;

            match result {
                WriteResult::Stored => return Ok(SetOutcome::Ok),
                WriteResult::AlreadyExists if attempt < MAX_ADD_ATTEMPTS => {
                    match self.try_get(vbucket, server, fqkey).await? {
                        GetResult::Found { value, cas, .. } if is_tombstone(&value) => {
                            let cas_result = self
                                .cas_update(vbucket, server, fqkey, data, flags, expiration, cas)
                                .await?;
                            match cas_result {
                                WriteResult::Stored => return Ok(SetOutcome::Ok),
                                _ => continue,
                            }
                        }
                        GetResult::Found { .. } => return Ok(SetOutcome::DataContention),
                        GetResult::NotFound => continue,
                    }
                }
                _ => return Ok(SetOutcome::DataContention),
            }
        }
    }

    async fn cas_update(
        &self,
        vbucket: u16,
        server: &str,
        fqkey: &str,
        data: &[u8],
        flags: u32,
        expiration: u32,
        cas: u64,
    ) -> Result<WriteResult> {
        let worker = current_worker_id();
        let server = server.to_string();
        let fqkey_owned = fqkey.to_string();
        let value = data.to_vec();
        self.cache
            .with_connection(worker, &server, move |conn| {
                let key = fqkey_owned.clone();
                let value = value.clone();
                async move {
                    conn.add_or_cas(vbucket, key.as_bytes(), &value, flags, expiration, cas)
                        .await
                }
            })
            .await
    }

    /// Fans a best-effort, unconditional, no-reply write out to the
    /// secondary replicas. Runs detached: a slow or unreachable secondary
    /// never delays the caller's response.
    fn fan_out_noreply(
        &self,
        vbucket: u16,
        secondaries: Vec<String>,
        fqkey: String,
        data: Vec<u8>,
        flags: u32,
        expiration: u32,
    ) where
        R: 'static,
        C: 'static,
    {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            for server in secondaries {
                let worker = current_worker_id();
                let fqkey = fqkey.clone();
                let data = data.clone();
                let result = cache
                    .with_connection(worker, &server, move |conn| {
                        let key = fqkey.clone();
                        let data = data.clone();
                        async move {
                            conn.set_noreply(vbucket, key.as_bytes(), &data, flags, expiration)
                                .await
                        }
                    })
                    .await;
                if let Err(e) = result {
                    debug!("best-effort fan-out to '{server}' failed: {e}");
                }
            }
        });
    }
}

#[async_trait]
impl<R, C> Store for ReplicatedClient<R, C>
where
    R: ReplicaSource + 'static,
    C: Connector + 'static,
{
    async fn get(&self, table: &str, key: &str) -> Result<GetOutcome> {
        let fqkey = fully_qualified_key(table, key);
        self.replicated_get(&fqkey).await
    }

    async fn set(
        &self,
        table: &str,
        key: &str,
        data: &[u8],
        cas: u64,
        expiry_seconds: i64,
    ) -> Result<SetOutcome> {
        let started = std::time::Instant::now();
        let fqkey = fully_qualified_key(table, key);
        let (vbucket, replicas) = self.source.write_replicas(&fqkey);
        if replicas.is_empty() {
            return Err(MeshKvError::NoConnection(fqkey));
        }

        let flags = write_timestamp_flags();
        let expiration = backend_expiration(expiry_seconds);

        // Try the write against each replica in order until one gives a
        // definitive result (stored, or contention). A replica that's simply
        // unreachable is skipped in favor of the next one; `ERROR` is only
        // returned once every replica in the list has failed at transport.
        let mut last_err = None;
        let mut settled = None;
        for (idx, server) in replicas.iter().enumerate() {
            let attempt = if cas == 0 {
                self.add_overwriting_tombstone(vbucket, server, &fqkey, data, flags, expiration)
                    .await
            } else {
                match self
                    .cas_update(vbucket, server, &fqkey, data, flags, expiration, cas)
                    .await
                {
                    Ok(WriteResult::Stored) => Ok(SetOutcome::Ok),
                    Ok(_) => Ok(SetOutcome::DataContention),
                    Err(e) => Err(e),
                }
            };

            match attempt {
                Ok(outcome) => {
                    settled = Some((outcome, idx));
                    break;
                }
                Err(e) => {
                    warn!("set to '{server}' failed: {e}");
                    self.source.report_failure(server);
                    last_err = Some(e);
                }
            }
        }

        let Some((outcome, settled_idx)) = settled else {
            return Err(last_err.unwrap_or_else(|| MeshKvError::NoConnection(fqkey)));
        };

        let remaining: Vec<String> = replicas[settled_idx + 1..].to_vec();
        if outcome == SetOutcome::Ok && !remaining.is_empty() {
            self.fan_out_noreply(vbucket, remaining, fqkey, data.to_vec(), flags, expiration);
        }

        if let Some(stats) = &self.stats {
            stats.record_latency("set_latency_us", started.elapsed().as_micros() as i64);
            stats.increment("set");
            if outcome == SetOutcome::DataContention {
                stats.increment("set_contention");
            }
        }

        Ok(outcome)
    }

    async fn delete(&self, table: &str, key: &str) -> Result<DeleteOutcome> {
        let started = std::time::Instant::now();
        let fqkey = fully_qualified_key(table, key);
        let (vbucket, replicas) = self.source.read_replicas(&fqkey);
        let tombstone_lifetime = self.source.tombstone_lifetime();
        let flags = write_timestamp_flags();

        for server in &replicas {
            let worker = current_worker_id();
            let server_owned = server.clone();
            let fqkey_owned = fqkey.clone();
            let result = self
                .cache
                .with_connection(worker, &server_owned, move |conn| {
                    let key = fqkey_owned.clone();
                    async move {
                        if tombstone_lifetime > 0 {
                            conn.set(
                                vbucket,
                                key.as_bytes(),
                                TOMBSTONE_PAYLOAD,
                                flags,
                                tombstone_lifetime,
                            )
                            .await
                        } else {
                            conn.delete(vbucket, key.as_bytes()).await
                        }
                    }
                })
                .await;

            if let Err(e) = result {
                warn!("delete against '{server}' failed: {e}");
            }
        }

        if let Some(stats) = &self.stats {
            stats.record_latency("delete_latency_us", started.elapsed().as_micros() as i64);
            stats.increment("delete");
        }

        Ok(DeleteOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::topology_aware::TopologyAwareSource;
    use crate::core::config_updater::SharedView;
    use crate::core::connection::{BackendConnection, ServerIdentity};
    use crate::core::view::ClusterView;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// In-memory fake of the backend fleet: one table per server identity,
    /// shared across every connection the fake connector hands out, so the
    /// replicated client's retry/fan-out logic can be exercised without a
    /// real socket.
    #[derive(Default)]
    struct FakeFleet {
        tables: StdMutex<HashMap<ServerIdentity, HashMap<String, (Vec<u8>, u64)>>>,
    }

    struct FakeConnector {
        fleet: Arc<FakeFleet>,
    }

    struct FakeConnection {
        identity: ServerIdentity,
        fleet: Arc<FakeFleet>,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(
            &self,
            identity: &ServerIdentity,
            _has_connected_before: bool,
        ) -> Result<Box<dyn BackendConnection>> {
            Ok(Box::new(FakeConnection {
                identity: identity.clone(),
                fleet: self.fleet.clone(),
            }))
        }
    }

    #[async_trait]
    impl BackendConnection for FakeConnection {
        async fn get(&mut self, _vbucket: u16, key: &[u8]) -> Result<GetResult> {
            let key = String::from_utf8_lossy(key).to_string();
            let tables = self.fleet.tables.lock().unwrap();
            match tables.get(&self.identity).and_then(|t| t.get(&key)) {
                Some((value, cas)) => Ok(GetResult::Found {
                    value: value.clone().into(),
                    cas: *cas,
                    flags: 0,
                }),
                None => Ok(GetResult::NotFound),
            }
        }

        async fn add_or_cas(
            &mut self,
            _vbucket: u16,
            key: &[u8],
            value: &[u8],
            _flags: u32,
            _expiration: u32,
            cas: u64,
        ) -> Result<WriteResult> {
            let key = String::from_utf8_lossy(key).to_string();
            let mut tables = self.fleet.tables.lock().unwrap();
            let table = tables.entry(self.identity.clone()).or_default();
            match table.get(&key) {
                Some(_) if cas == 0 => Ok(WriteResult::AlreadyExists),
                Some((_, existing_cas)) if cas == *existing_cas => {
                    table.insert(key, (value.to_vec(), cas + 1));
                    Ok(WriteResult::Stored)
                }
                Some(_) => Ok(WriteResult::CasMismatch),
                None if cas == 0 => {
                    table.insert(key, (value.to_vec(), 1));
                    Ok(WriteResult::Stored)
                }
                None => Ok(WriteResult::NotFound),
            }
        }

        async fn set(
            &mut self,
            _vbucket: u16,
            key: &[u8],
            value: &[u8],
            _flags: u32,
            _expiration: u32,
        ) -> Result<WriteResult> {
            let key = String::from_utf8_lossy(key).to_string();
            let mut tables = self.fleet.tables.lock().unwrap();
            let table = tables.entry(self.identity.clone()).or_default();
            let next_cas = table.get(&key).map(|(_, c)| c + 1).unwrap_or(1);
            table.insert(key, (value.to_vec(), next_cas));
            Ok(WriteResult::Stored)
        }

        async fn set_noreply(
            &mut self,
            _vbucket: u16,
            key: &[u8],
            value: &[u8],
            _flags: u32,
            _expiration: u32,
        ) -> Result<()> {
            let key = String::from_utf8_lossy(key).to_string();
            let mut tables = self.fleet.tables.lock().unwrap();
            let table = tables.entry(self.identity.clone()).or_default();
            let next_cas = table.get(&key).map(|(_, c)| c + 1).unwrap_or(1);
            table.insert(key, (value.to_vec(), next_cas));
            Ok(())
        }

        async fn delete(&mut self, _vbucket: u16, key: &[u8]) -> Result<WriteResult> {
            let key = String::from_utf8_lossy(key).to_string();
            let mut tables = self.fleet.tables.lock().unwrap();
            tables.entry(self.identity.clone()).or_default().remove(&key);
            Ok(WriteResult::Stored)
        }
    }

    fn client_over(servers: &[&str]) -> ReplicatedClient<TopologyAwareSource, FakeConnector> {
        client_with_tombstone_lifetime(servers, 0)
    }

    fn client_with_tombstone_lifetime(
        servers: &[&str],
        tombstone_lifetime: u32,
    ) -> ReplicatedClient<TopologyAwareSource, FakeConnector> {
        let servers: Vec<String> = servers.iter().map(|s| s.to_string()).collect();
        let view = ClusterView::build(&servers, &[], 2, 8, 0);
        let source = TopologyAwareSource::new(Arc::new(SharedView::new(view)), tombstone_lifetime);
        let connector = Arc::new(FakeConnector {
            fleet: Arc::new(FakeFleet::default()),
        });
        let cache = Arc::new(ConnectionCache::new(connector));
        ReplicatedClient::new(source, cache)
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_a_single_replica() {
        let client = client_over(&["server-0"]);
        assert_eq!(
            client.set("reg", "alice", b"v1", 0, 0).await.unwrap(),
            SetOutcome::Ok
        );
        match client.get("reg", "alice").await.unwrap() {
            GetOutcome::Ok { data, .. } => assert_eq!(data, b"v1"),
            GetOutcome::NotFound => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn a_second_add_with_cas_zero_is_contention() {
        let client = client_over(&["server-0"]);
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();
        let outcome = client.set("reg", "alice", b"v2", 0, 0).await.unwrap();
        assert_eq!(outcome, SetOutcome::DataContention);
    }

    #[tokio::test]
    async fn conditional_update_with_correct_cas_succeeds() {
        let client = client_over(&["server-0"]);
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();
        let cas = match client.get("reg", "alice").await.unwrap() {
            GetOutcome::Ok { cas, .. } => cas,
            GetOutcome::NotFound => panic!("expected a hit"),
        };
        assert_eq!(
            client.set("reg", "alice", b"v2", cas, 0).await.unwrap(),
            SetOutcome::Ok
        );
    }

    #[tokio::test]
    async fn delete_then_get_reports_not_found() {
        let client = client_over(&["server-0"]);
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();
        assert_eq!(client.delete("reg", "alice").await.unwrap(), DeleteOutcome::Ok);
        assert_eq!(client.get("reg", "alice").await.unwrap(), GetOutcome::NotFound);
    }

    #[tokio::test]
    async fn add_after_delete_overwrites_the_tombstone() {
        let client = client_over(&["server-0"]);
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();
        client.delete("reg", "alice").await.unwrap();
        assert_eq!(
            client.set("reg", "alice", b"v2", 0, 0).await.unwrap(),
            SetOutcome::Ok
        );
        match client.get("reg", "alice").await.unwrap() {
            GetOutcome::Ok { data, .. } => assert_eq!(data, b"v2"),
            GetOutcome::NotFound => panic!("expected a hit after overwriting the tombstone"),
        }
    }

    #[tokio::test]
    async fn delete_with_tombstone_lifetime_writes_a_tombstone_not_a_hard_remove() {
        let client = client_with_tombstone_lifetime(&["server-0"], 60);
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();
        assert_eq!(client.delete("reg", "alice").await.unwrap(), DeleteOutcome::Ok);
        assert_eq!(client.get("reg", "alice").await.unwrap(), GetOutcome::NotFound);

        // add-after-tombstone should still succeed, the same as the hard-remove path.
        assert_eq!(
            client.set("reg", "alice", b"v2", 0, 0).await.unwrap(),
            SetOutcome::Ok
        );
        match client.get("reg", "alice").await.unwrap() {
            GetOutcome::Ok { data, .. } => assert_eq!(data, b"v2"),
            GetOutcome::NotFound => panic!("expected a hit after overwriting the tombstone"),
        }
    }

    #[tokio::test]
    async fn set_fans_out_to_secondary_replicas() {
        let client = client_over(&["server-0", "server-1"]);
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();

        // the fan-out is detached (tokio::spawn); give it a moment to land.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let (_, replicas) = client.source.write_replicas("reg\u{0}\u{0}alice");
        assert_eq!(replicas.len(), 2);
    }

    #[tokio::test]
    async fn attached_stats_observe_hits_misses_and_writes() {
        use crate::core::comm_monitor::NullAlarmSink;

        let client = client_over(&["server-0"]).with_observers(
            Arc::new(StatsEngine::new()),
            Arc::new(CommMonitor::new("fleet", Box::new(NullAlarmSink) as Box<dyn AlarmSink>)),
        );

        client.get("reg", "alice").await.unwrap();
        client.set("reg", "alice", b"v1", 0, 0).await.unwrap();
        client.get("reg", "alice").await.unwrap();

        let stats = client.stats.as_ref().unwrap();
        assert_eq!(stats.current_5m(|p| p.counters.get("get")), 2);
        assert_eq!(stats.current_5m(|p| p.counters.get("get_not_found")), 1);
        assert_eq!(stats.current_5m(|p| p.counters.get("set")), 1);

        let monitor = client.comm_monitor.as_ref().unwrap();
        assert_eq!(monitor.successes(), 2);
        assert_eq!(monitor.failures(), 0);
    }
}

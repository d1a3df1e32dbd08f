// src/core/config_updater.rs

//! Background task that (re)builds the [`ClusterView`] from the config file:
//! once at startup, and again every time the process receives `SIGHUP`.
//! A single dispatcher owns the signal stream — unlike the per-signal
//! singleton template this is grounded on, there is one task per process,
//! not one per signal type, since this client only ever reacts to `SIGHUP`.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use crate::core::config_reader::ConfigFileReader;
use crate::core::connection::Connector;
use crate::core::connection_cache::ConnectionCache;
use crate::core::view::ClusterView;

/// Default number of read replicas per vbucket when none is configured.
const DEFAULT_REPLICAS: usize = 2;

/// Shared, swappable handle to the current cluster view.
pub struct SharedView {
    inner: RwLock<Arc<ClusterView>>,
}

impl SharedView {
    pub fn new(initial: ClusterView) -> Self {
        Self {
            inner: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<ClusterView> {
        self.inner.read().clone()
    }

    fn store(&self, view: ClusterView) {
        *self.inner.write() = Arc::new(view);
    }
}

/// Builds a `ClusterView` from the config file and applies it to `shared`.
/// A read or parse failure leaves the previous view in place. On success,
/// `cache` is reconfigured to the new `view_number` so that on next use every
/// worker tears down its connections and rebuilds them against the new view.
fn refresh<C: Connector>(
    reader: &ConfigFileReader,
    shared: &SharedView,
    vbuckets: usize,
    view_number: &std::sync::atomic::AtomicU64,
    cache: &ConnectionCache<C>,
) {
    let Some(config) = reader.read_config() else {
        warn!("config reload failed; keeping the previous cluster view");
        return;
    };

    let next_view_number = view_number.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
    let view = ClusterView::build(
        &config.servers,
        &config.new_servers,
        DEFAULT_REPLICAS,
        vbuckets,
        next_view_number,
    );
    info!(
        view_number = next_view_number,
        servers = config.servers.len(),
        new_servers = config.new_servers.len(),
        "installed new cluster view"
    );
    shared.store(view);
    cache.reconfigure(next_view_number);
}

/// Spawns the config-updater task: builds the initial view synchronously
/// (so the caller never races the first `SIGHUP`), then spawns a background
/// task that rebuilds on every subsequent `SIGHUP`. `cache` is reconfigured
/// to match the initial view before it's returned, and again on every
/// subsequent reload.
pub fn spawn<C: Connector + 'static>(
    reader: ConfigFileReader,
    vbuckets: usize,
    cache: Arc<ConnectionCache<C>>,
) -> Arc<SharedView> {
    let view_number = std::sync::atomic::AtomicU64::new(0);
    let initial = reader
        .read_config()
        .map(|config| ClusterView::build(&config.servers, &config.new_servers, DEFAULT_REPLICAS, vbuckets, 0))
        .unwrap_or_else(|| ClusterView::build(&[], &[], DEFAULT_REPLICAS, vbuckets, 0));

    cache.reconfigure(0);
    let shared = Arc::new(SharedView::new(initial));
    let shared_task = shared.clone();
    let cache_task = cache.clone();

    tokio::spawn(async move {
        let mut stream = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                error!("failed to install SIGHUP handler: {e}");
                return;
            }
        };

        while stream.recv().await.is_some() {
            refresh(&reader, &shared_task, vbuckets, &view_number, &cache_task);
        }
    });

    shared
}

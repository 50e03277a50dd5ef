//! Shared application state.
//!
//! Everything a connection or HTTP handler needs, built once at startup and
//! cloned cheaply (one `Arc`).

use std::sync::Arc;

use tokio::sync::mpsc;

use pairpad_core::error::Result;

use crate::broadcast::Hub;
use crate::config::GatewayConfig;
use crate::exec::ExecutorRegistry;
use crate::obs::GatewayMetrics;
use crate::presence::{PresenceTracker, RoomLifecycleManager};
use crate::problems::{ProblemCatalog, QuestionDeps};
use crate::store::{self, FallbackCache, MokaCache, RoomStore};
use crate::sync::{Clock, SyncDeps, SystemClock};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    hub: Hub,
    store: Arc<dyn RoomStore>,
    cache: Arc<dyn FallbackCache>,
    clock: Arc<dyn Clock>,
    metrics: Arc<GatewayMetrics>,
    tracker: Arc<PresenceTracker>,
    lifecycle: Arc<RoomLifecycleManager>,
    catalog: Arc<ProblemCatalog>,
    executors: ExecutorRegistry,
}

impl AppState {
    /// Open the configured store and build state around it.
    pub async fn from_config(cfg: GatewayConfig) -> Result<Self> {
        let store = store::open(&cfg.store).await?;
        Self::new(cfg, store, Arc::new(SystemClock))
    }

    /// Executors come from config. Must run inside a tokio runtime.
    pub fn new(cfg: GatewayConfig, store: Arc<dyn RoomStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let executors = ExecutorRegistry::from_config(&cfg.executors);
        Self::with_executors(cfg, store, clock, executors)
    }

    pub fn with_executors(
        cfg: GatewayConfig,
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        executors: ExecutorRegistry,
    ) -> Result<Self> {
        let catalog = Arc::new(ProblemCatalog::load(cfg.problems.path.as_deref())?);
        let hub = Hub::new(cfg.sync.subscriber_queue);
        let metrics = Arc::new(GatewayMetrics::default());
        let cache: Arc<dyn FallbackCache> = Arc::new(MokaCache::new(&cfg.cache));

        let (empty_tx, empty_rx) = mpsc::unbounded_channel();
        let tracker = Arc::new(PresenceTracker::with_empty_listener(hub.clone(), empty_tx));
        let lifecycle = Arc::new(RoomLifecycleManager::new(
            Arc::clone(&store),
            Arc::clone(&tracker),
            Arc::clone(&metrics),
        ));
        tokio::spawn(Arc::clone(&lifecycle).run(empty_rx));

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                hub,
                store,
                cache,
                clock,
                metrics,
                tracker,
                lifecycle,
                catalog,
                executors,
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn hub(&self) -> &Hub {
        &self.inner.hub
    }

    pub fn store(&self) -> Arc<dyn RoomStore> {
        Arc::clone(&self.inner.store)
    }

    pub fn cache(&self) -> Arc<dyn FallbackCache> {
        Arc::clone(&self.inner.cache)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn tracker(&self) -> Arc<PresenceTracker> {
        Arc::clone(&self.inner.tracker)
    }

    pub fn lifecycle(&self) -> Arc<RoomLifecycleManager> {
        Arc::clone(&self.inner.lifecycle)
    }

    pub fn catalog(&self) -> Arc<ProblemCatalog> {
        Arc::clone(&self.inner.catalog)
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.inner.executors
    }

    pub fn sync_deps(&self) -> SyncDeps {
        let sync = &self.inner.cfg.sync;
        SyncDeps {
            hub: self.inner.hub.clone(),
            store: self.store(),
            cache: self.cache(),
            clock: Arc::clone(&self.inner.clock),
            metrics: self.metrics(),
            debounce: std::time::Duration::from_millis(sync.debounce_ms),
            sync_lock: std::time::Duration::from_millis(sync.sync_lock_ms),
        }
    }

    pub fn question_deps(&self) -> QuestionDeps {
        QuestionDeps {
            hub: self.inner.hub.clone(),
            store: self.store(),
            catalog: self.catalog(),
            metrics: self.metrics(),
        }
    }

    /// Hub counters appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let (published, dropped) = self.inner.hub.delivery_stats();
        vec![
            ("pairpad_broadcasts_published_total", published),
            ("pairpad_broadcasts_dropped_total", dropped),
        ]
    }
}

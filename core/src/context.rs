use std::sync::Arc;

use crate::bulk::{BulkOperationCoordinator, DeferredBatchProcessor};
use crate::config::AppConfig;
use crate::persistence::PersistenceAdapter;
use crate::state::{EventBus, StateFacade, StateStore};
use crate::sync::SyncQueueProcessor;
use crate::traits::{ActiveListRenderer, KeyValueStorage, LabelMaterializer, Scheduler, SyncHandlers};

/// 外部协作者集合：调度器与渲染面。存储介质在建 store 时单独传入。
#[derive(Clone)]
pub struct Services {
    pub scheduler: Arc<dyn Scheduler>,
    pub materializer: Arc<dyn LabelMaterializer>,
    pub renderer: Arc<dyn ActiveListRenderer>,
    pub handlers: Arc<dyn SyncHandlers>,
}

#[async_trait::async_trait]
pub trait ServicesFactory: Send + Sync {
    /// The store is passed in so surfaces that mirror their state into the
    /// tree can hold a handle to it.
    async fn build_services(&self, cfg: &AppConfig, store: &StateStore) -> anyhow::Result<Services>;
}

/// Wires one store, one bulk coordinator and one sync processor onto a shared
/// event bus.
#[derive(Clone)]
pub struct AppContext {
    cfg: AppConfig,
    events: EventBus,
    store: StateStore,
    bulk: BulkOperationCoordinator,
    sync: SyncQueueProcessor,
}

impl AppContext {
    /// Build the runtime around an already-constructed store.
    pub fn new(cfg: AppConfig, store: StateStore, services: Services) -> Self {
        let events = store.events();
        let processor = DeferredBatchProcessor::new(cfg.bulk.clone(), services.scheduler.clone());
        let bulk = BulkOperationCoordinator::new(
            processor,
            services.materializer.clone(),
            services.renderer.clone(),
            events.clone(),
        );
        let sync = SyncQueueProcessor::new(cfg.sync.clone(), services.handlers.clone(), events.clone());
        Self {
            cfg,
            events,
            store,
            bulk,
            sync,
        }
    }

    /// Create a fresh store over `storage` and let `factory` build the
    /// remaining collaborators against it.
    pub async fn from_factory(
        cfg: AppConfig,
        storage: Arc<dyn KeyValueStorage>,
        factory: &dyn ServicesFactory,
    ) -> anyhow::Result<Self> {
        let store = new_store(&cfg, storage);
        let services = factory.build_services(&cfg, &store).await?;
        Ok(Self::new(cfg, store, services))
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn facade(&self) -> StateFacade {
        StateFacade::new(self.store.clone())
    }

    pub fn bulk(&self) -> &BulkOperationCoordinator {
        &self.bulk
    }

    pub fn sync(&self) -> &SyncQueueProcessor {
        &self.sync
    }
}

/// Store wired to an event bus sized from config and a persistence adapter
/// over `storage`.
pub fn new_store(cfg: &AppConfig, storage: Arc<dyn KeyValueStorage>) -> StateStore {
    let events = EventBus::new(cfg.store.event_channel_capacity);
    let persistence = PersistenceAdapter::new(storage, cfg.store.key_prefix.clone());
    StateStore::with_parts(events, persistence)
}

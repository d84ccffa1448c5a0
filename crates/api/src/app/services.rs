use std::sync::Arc;

use switchyard_infra::broker::{InMemoryBroker, MessageBroker};
use switchyard_infra::jobs::{InMemoryJobStore, JobStore};
use switchyard_infra::receipts::{InMemoryReceiptStore, ReceiptStore};
use switchyard_infra::registry::{InMemoryWorkerServiceRegistry, WorkerServiceRegistry};
use switchyard_infra::{
    CompletionConsumer, MessageBusService, SchedulerConfig, SchedulerService, SchedulerWorkers,
    WatchdogService, WatchdogSettings, WorkersHandle,
};

#[cfg(feature = "redis")]
use anyhow::Context;
#[cfg(feature = "redis")]
use switchyard_infra::{
    broker::RedisStreamsBroker, jobs::RedisJobStore, receipts::PostgresReceiptStore,
    registry::PostgresWorkerServiceRegistry,
};

/// Everything the HTTP layer and the background loops need, wired once at start-up.
pub struct AppServices {
    pub config: SchedulerConfig,
    pub scheduler: SchedulerService,
    pub watchdog: Arc<WatchdogService>,
    pub store: Arc<dyn JobStore>,
    pub broker: Arc<dyn MessageBroker>,
}

impl AppServices {
    fn assemble(
        config: &SchedulerConfig,
        store: Arc<dyn JobStore>,
        broker: Arc<dyn MessageBroker>,
        receipts: Arc<dyn ReceiptStore>,
        registry: Arc<dyn WorkerServiceRegistry>,
    ) -> Self {
        let bus = Arc::new(MessageBusService::new(store.clone(), broker.clone()));
        let watchdog = Arc::new(WatchdogService::new(
            bus.clone(),
            receipts.clone(),
            WatchdogSettings::from(config),
        ));
        let scheduler = SchedulerService::new(bus, receipts, registry);

        Self {
            config: config.clone(),
            scheduler,
            watchdog,
            store,
            broker,
        }
    }

    /// A completion consumer reading with this process's consumer name.
    pub fn completion_consumer(&self) -> CompletionConsumer {
        CompletionConsumer::new(
            self.store.clone(),
            self.broker.clone(),
            self.config.consumer_name.clone(),
            self.config.worker_unacked_message_count,
            self.config.consumer_retry_delay(),
        )
    }

    /// Start the completion consumer and the watchdog.
    pub fn spawn_workers(&self) -> WorkersHandle {
        SchedulerWorkers::spawn(self.completion_consumer(), self.watchdog.clone())
    }
}

pub async fn build_services(config: &SchedulerConfig) -> anyhow::Result<AppServices> {
    if config.use_persistent_stores {
        #[cfg(feature = "redis")]
        {
            return build_persistent_services(config).await;
        }
        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!(
                "USE_PERSISTENT_STORES=true but redis feature not enabled, falling back to in-memory"
            );
        }
    }

    let services = build_in_memory_services(config);
    services.scheduler.bus().declare_queues().await?;
    Ok(services)
}

/// In-memory wiring (dev/test): nothing survives a restart.
pub fn build_in_memory_services(config: &SchedulerConfig) -> AppServices {
    AppServices::assemble(
        config,
        Arc::new(InMemoryJobStore::new()),
        Arc::new(InMemoryBroker::new()),
        Arc::new(InMemoryReceiptStore::new()),
        Arc::new(InMemoryWorkerServiceRegistry::new()),
    )
}

#[cfg(feature = "redis")]
async fn build_persistent_services(config: &SchedulerConfig) -> anyhow::Result<AppServices> {
    let store = RedisJobStore::connect(&config.cache_url)
        .await
        .context("failed to connect to the job store")?;
    let broker = RedisStreamsBroker::connect(&config.message_bus_url)
        .await
        .context("failed to connect to the message bus")?;

    let pool = sqlx::PgPool::connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let receipts = PostgresReceiptStore::new(pool.clone());
    receipts
        .ensure_schema()
        .await
        .context("failed to create receipt schema")?;
    let registry = PostgresWorkerServiceRegistry::new(pool);
    registry
        .ensure_schema()
        .await
        .context("failed to create worker registry schema")?;

    let services = AppServices::assemble(
        config,
        Arc::new(store),
        Arc::new(broker),
        Arc::new(receipts),
        Arc::new(registry),
    );
    services
        .scheduler
        .bus()
        .declare_queues()
        .await
        .context("failed to declare queues")?;

    tracing::info!("persistent stores wired (redis + postgres)");
    Ok(services)
}

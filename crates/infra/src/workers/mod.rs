//! Background loops of the scheduler process.
//!
//! Both loops share one `CancellationToken`; [`WorkersHandle::shutdown`] cancels it and
//! waits for both tasks to return.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::message_bus::CompletionConsumer;
use crate::watchdog::WatchdogService;

/// Handle to stop and join the background loops.
#[derive(Debug)]
pub struct WorkersHandle {
    cancel: CancellationToken,
    consumer: JoinHandle<()>,
    watchdog: JoinHandle<()>,
}

impl WorkersHandle {
    /// Request shutdown and wait for both loops to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, task) in [("consumer", self.consumer), ("watchdog", self.watchdog)] {
            if let Err(e) = task.await {
                error!(worker = name, error = %e, "worker task ended abnormally");
            }
        }
        info!("scheduler workers stopped");
    }
}

pub struct SchedulerWorkers;

impl SchedulerWorkers {
    /// Spawn the completion consumer and the watchdog on the current runtime.
    pub fn spawn(consumer: CompletionConsumer, watchdog: Arc<WatchdogService>) -> WorkersHandle {
        let cancel = CancellationToken::new();

        let consumer = tokio::spawn(consumer.run(cancel.clone()));
        let watchdog = tokio::spawn(watchdog.run(cancel.clone()));

        WorkersHandle {
            cancel,
            consumer,
            watchdog,
        }
    }
}

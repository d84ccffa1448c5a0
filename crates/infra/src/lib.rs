//! Infrastructure layer: job store, message broker, receipts, config and the
//! scheduler's background loops.

pub mod broker;
pub mod config;
pub mod error;
pub mod jobs;
pub mod message_bus;
pub mod receipts;
pub mod registry;
pub mod scheduler;
pub mod watchdog;
pub mod workers;


pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use message_bus::{CompletionConsumer, MessageBusService};
pub use scheduler::SchedulerService;
pub use watchdog::{ScanReport, WatchdogService, WatchdogSettings};
pub use workers::{SchedulerWorkers, WorkersHandle};

//! `switchyard-core`: domain types for the job scheduler.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! job records, wire messages exchanged with workers, failure receipts and the
//! statistics derived from them.

pub mod error;
pub mod id;
pub mod job;
pub mod message;
pub mod receipt;
pub mod request;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{JobContext, JobRecord, JobStatus, unix_now};
pub use message::{FinishJobMessage, FinishStatus, JobMessage};
pub use receipt::{DailyFailureCount, JobReceipt, JobStatistics, MAX_RETRIES_MESSAGE};
pub use request::{RegisterWorkerServiceRequest, ScheduleJobRequest};

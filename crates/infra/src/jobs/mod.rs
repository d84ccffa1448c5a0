//! Transient job state: one record per job plus the pending index.
//!
//! ## Layout
//!
//! - `jobs:<id>`: hash with `status, created_at, updated_at, retry_count, message,
//!   job_name, job_context`
//! - `jobs:pending`: sorted set, member = job id, score = last enqueue/retry time
//!
//! ## Invariant
//!
//! A job id is in the pending index iff its last known status is `pending`. The
//! producer inserts it; only the watchdog removes it (deferred cleanup after a
//! completion, or escalation).

#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;

#[cfg(feature = "redis")]
pub use redis_store::RedisJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};

/// Key prefix of the per-job hash.
pub const JOB_KEY_PREFIX: &str = "jobs:";

/// Key of the pending index sorted set.
pub const PENDING_INDEX_KEY: &str = "jobs:pending";

/// Key of the hash holding a job's record.
pub fn job_key(id: &switchyard_core::JobId) -> String {
    format!("{JOB_KEY_PREFIX}{id}")
}

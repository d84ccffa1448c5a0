//! Redis-backed job store (hash per job + `jobs:pending` sorted set).

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{instrument, warn};

use switchyard_core::{JobContext, JobId, JobRecord, JobStatus};

use super::store::{JobStore, JobStoreError};
use super::{PENDING_INDEX_KEY, job_key};

/// Update status/message only if the record exists, so a stray completion for an
/// unknown id cannot create a partial hash. A repeated outcome leaves `updated_at` alone.
const RESOLVE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
local current = redis.call('HMGET', KEYS[1], 'status', 'message')
if current[1] == ARGV[1] and current[2] == ARGV[2] then
  return 1
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], 'message', ARGV[2], 'updated_at', ARGV[3])
return 1
"#;

const RECORD_RETRY_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return -1
end
local count = redis.call('HINCRBY', KEYS[1], 'retry_count', 1)
redis.call('HSET', KEYS[1], 'updated_at', ARGV[1])
return count
"#;

/// Redis job store.
///
/// Uses a `ConnectionManager` (multiplexed, reconnecting), cloned per call.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    resolve_script: redis::Script,
    record_retry_script: redis::Script,
}

impl RedisJobStore {
    /// Connect to Redis (e.g. "redis://localhost:6379").
    pub async fn connect(redis_url: &str) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| JobStoreError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| JobStoreError::Connection(e.to_string()))?;
        Ok(Self::from_manager(conn))
    }

    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self {
            conn,
            resolve_script: redis::Script::new(RESOLVE_SCRIPT),
            record_retry_script: redis::Script::new(RECORD_RETRY_SCRIPT),
        }
    }
}

fn command_err(op: &str, e: redis::RedisError) -> JobStoreError {
    JobStoreError::Command(format!("{op} failed: {e}"))
}

#[async_trait]
impl JobStore for RedisJobStore {
    #[instrument(skip(self, record), fields(job_id = %record.id), err)]
    async fn create(&self, record: &JobRecord) -> Result<(), JobStoreError> {
        let context = serde_json::to_string(&record.context)
            .map_err(|e| JobStoreError::Serialization(e.to_string()))?;

        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(job_key(&record.id))
            .arg("status")
            .arg(record.status.as_str())
            .arg("created_at")
            .arg(record.created_at)
            .arg("updated_at")
            .arg(record.updated_at)
            .arg("retry_count")
            .arg(record.retry_count)
            .arg("message")
            .arg(&record.message)
            .arg("job_name")
            .arg(&record.name)
            .arg("job_context")
            .arg(context)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| command_err("HSET", e))
    }

    async fn get(&self, id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn
            .hgetall(job_key(&id))
            .await
            .map_err(|e| command_err("HGETALL", e))?;

        if fields.is_empty() {
            return Ok(None);
        }
        record_from_fields(id, &fields).map(Some)
    }

    async fn status(&self, id: JobId) -> Result<Option<JobStatus>, JobStoreError> {
        let mut conn = self.conn.clone();
        let status: Option<String> = conn
            .hget(job_key(&id), "status")
            .await
            .map_err(|e| command_err("HGET", e))?;

        status
            .map(|s| {
                JobStatus::from_str(&s).map_err(|e| JobStoreError::Corrupt {
                    id: id.to_string(),
                    detail: e.to_string(),
                })
            })
            .transpose()
    }

    #[instrument(skip(self, message), fields(job_id = %id, status = %status), err)]
    async fn resolve(
        &self,
        id: JobId,
        status: JobStatus,
        message: &str,
        now: i64,
    ) -> Result<bool, JobStoreError> {
        let mut conn = self.conn.clone();
        let applied: i64 = self
            .resolve_script
            .key(job_key(&id))
            .arg(status.as_str())
            .arg(message)
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_err("resolve script", e))?;
        Ok(applied == 1)
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn record_retry(&self, id: JobId, now: i64) -> Result<u32, JobStoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .record_retry_script
            .key(job_key(&id))
            .arg(now)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| command_err("retry script", e))?;

        if count < 0 {
            return Err(JobStoreError::NotFound(id));
        }
        u32::try_from(count).map_err(|_| JobStoreError::Corrupt {
            id: id.to_string(),
            detail: format!("retry_count out of range: {count}"),
        })
    }

    async fn index_pending(&self, id: JobId, score: i64) -> Result<(), JobStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(PENDING_INDEX_KEY, id.to_string(), score)
            .await
            .map_err(|e| command_err("ZADD", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn pending_before(&self, cutoff: i64) -> Result<Vec<JobId>, JobStoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrangebyscore(PENDING_INDEX_KEY, "-inf", cutoff)
            .await
            .map_err(|e| command_err("ZRANGEBYSCORE", e))?;

        let mut ids = Vec::with_capacity(members.len());
        for member in members {
            match JobId::from_str(&member) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(member = %member, error = %e, "skipping unparsable pending index entry"),
            }
        }
        Ok(ids)
    }

    async fn remove_pending(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zrem(PENDING_INDEX_KEY, id.to_string())
            .await
            .map_err(|e| command_err("ZREM", e))?;
        Ok(())
    }
}

/// Rebuild a record from the hash fields written by `create`.
fn record_from_fields(id: JobId, fields: &HashMap<String, String>) -> Result<JobRecord, JobStoreError> {
    let corrupt = |detail: String| JobStoreError::Corrupt {
        id: id.to_string(),
        detail,
    };
    let field = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| corrupt(format!("missing field {name}")))
    };
    let number = |name: &str| -> Result<i64, JobStoreError> {
        field(name)?
            .parse::<i64>()
            .map_err(|e| corrupt(format!("{name}: {e}")))
    };

    let status = JobStatus::from_str(field("status")?).map_err(|e| corrupt(e.to_string()))?;
    let context: JobContext = match fields.get("job_context") {
        Some(raw) if !raw.is_empty() => {
            serde_json::from_str(raw).map_err(|e| corrupt(format!("job_context: {e}")))?
        }
        _ => JobContext::new(),
    };
    let retry_count = u32::try_from(number("retry_count")?)
        .map_err(|_| corrupt("retry_count out of range".to_string()))?;

    Ok(JobRecord {
        id,
        name: field("job_name")?.clone(),
        context,
        status,
        created_at: number("created_at")?,
        updated_at: number("updated_at")?,
        retry_count,
        message: fields.get("message").cloned().unwrap_or_default(),
    })
}

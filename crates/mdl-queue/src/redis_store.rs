use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use mdl_types::JobId;

use crate::error::{QueueError, QueueResult};
use crate::job::{JobEntry, JobOutcome, JobRecord, JobStatus};
use crate::store::JobStore;

const RECORD_FIELD: &str = "record";
const STATUS_FIELD: &str = "status";

/// Finish a job only while it is still pending.
/// Returns -1 for an unknown job, 0 if it already finished, 1 on success.
const FINISH_SCRIPT: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 0 then
  return -1
end
local status = redis.call('HGET', KEYS[1], ARGV[2])
if status and status ~= ARGV[3] then
  return 0
end
redis.call('HSET', KEYS[1], ARGV[2], ARGV[4])
redis.call('LREM', KEYS[2], 1, ARGV[5])
return 1
"#;

/// Job store on a Redis server.
///
/// Each job is a hash at `<prefix>:job:<id>` holding the JSON record and
/// status; unfinished job ids sit in the list `<prefix>:pending` in
/// admission order. Admission runs as one MULTI/EXEC transaction and
/// completion as one server-side script that checks the status first, so a
/// job is never half recorded and never finished twice. The server must run with
/// `maxmemory-policy noeviction`, which the backpressure guard checks.
pub struct RedisJobStore {
    conn: MultiplexedConnection,
    prefix: String,
    finish_script: redis::Script,
}

impl RedisJobStore {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
            finish_script: redis::Script::new(FINISH_SCRIPT),
        })
    }

    fn job_key(&self, job_id: &JobId) -> String {
        format!("{}:job:{job_id}", self.prefix)
    }

    fn pending_key(&self) -> String {
        format!("{}:pending", self.prefix)
    }

    async fn load(&self, job_id: &JobId) -> QueueResult<Option<JobEntry>> {
        let mut conn = self.conn.clone();
        let (record, status): (Option<String>, Option<String>) = redis::cmd("HMGET")
            .arg(self.job_key(job_id))
            .arg(RECORD_FIELD)
            .arg(STATUS_FIELD)
            .query_async(&mut conn)
            .await?;
        let Some(record) = record else {
            return Ok(None);
        };
        let status = match status {
            Some(status) => from_json(&status)?,
            None => JobStatus::Pending,
        };
        Ok(Some(JobEntry {
            record: from_json(&record)?,
            status,
        }))
    }
}

fn finish_result(code: i64, job_id: &JobId) -> QueueResult<()> {
    match code {
        1 => Ok(()),
        0 => Err(QueueError::AlreadyFinished(*job_id)),
        _ => Err(QueueError::UnknownJob(*job_id)),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> QueueResult<String> {
    serde_json::to_string(value).map_err(|e| QueueError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> QueueResult<T> {
    serde_json::from_str(raw).map_err(|e| QueueError::Serialization(e.to_string()))
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn append(&self, record: &JobRecord) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(self.job_key(&record.job_id), RECORD_FIELD, to_json(record)?)
            .ignore()
            .hset(
                self.job_key(&record.job_id),
                STATUS_FIELD,
                to_json(&JobStatus::Pending)?,
            )
            .ignore()
            .rpush(self.pending_key(), record.job_id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobEntry>> {
        self.load(job_id).await
    }

    async fn pending(&self) -> QueueResult<Vec<JobRecord>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.lrange(self.pending_key(), 0, -1).await?;
        let mut records = Vec::with_capacity(ids.len());
        for raw in ids {
            let job_id = JobId::parse(&raw)
                .map_err(|e| QueueError::Serialization(e.to_string()))?;
            match self.load(&job_id).await? {
                Some(entry) => records.push(entry.record),
                None => tracing::warn!(%job_id, "pending job has no record"),
            }
        }
        Ok(records)
    }

    async fn finish(&self, job_id: &JobId, outcome: &JobOutcome) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let status = JobStatus::from(outcome.clone());
        let code: i64 = self
            .finish_script
            .key(self.job_key(job_id))
            .key(self.pending_key())
            .arg(RECORD_FIELD)
            .arg(STATUS_FIELD)
            .arg(to_json(&JobStatus::Pending)?)
            .arg(to_json(&status)?)
            .arg(job_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        finish_result(code, job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_codes_map_to_queue_errors() {
        let job_id = JobId::new();
        assert!(finish_result(1, &job_id).is_ok());
        assert_eq!(
            finish_result(0, &job_id).unwrap_err().to_string(),
            QueueError::AlreadyFinished(job_id).to_string()
        );
        assert!(matches!(
            finish_result(-1, &job_id),
            Err(QueueError::UnknownJob(id)) if id == job_id
        ));
    }
}

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::jobs::{Job, JobEnvelope};

const READY_KEY: &str = "trackly:jobs:ready";
const DELAYED_KEY: &str = "trackly:jobs:delayed";
/// Upper bound on delayed entries moved to the ready list per dequeue.
const PROMOTE_BATCH: usize = 100;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Transport for job envelopes. Delivery is at-least-once: a worker that crashes mid-job
/// loses that delivery, and retries are re-enqueued by the worker itself.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Makes `envelope` available for dequeue after `delay`.
    async fn enqueue(&self, envelope: JobEnvelope, delay: Duration) -> Result<(), QueueError>;

    /// Next ready envelope, or `None` when nothing is due.
    async fn dequeue(&self) -> Result<Option<JobEnvelope>, QueueError>;

    /// Wraps `job` in a fresh envelope and enqueues it. Returns the job id.
    async fn submit(&self, job: Job, delay: Duration) -> Result<Uuid, QueueError> {
        let envelope = JobEnvelope::new(job);
        let id = envelope.id;
        self.enqueue(envelope, delay).await?;
        Ok(id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

/// Ready jobs live in a list (LPUSH / RPOP). Delayed jobs live in a sorted set scored by
/// their ready-at time in epoch milliseconds and are promoted on each dequeue.
#[derive(Clone)]
pub struct RedisJobQueue {
    conn: MultiplexedConnection,
}

impl RedisJobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Redis job queue connected");
        Ok(Self { conn })
    }

    async fn promote_due(&self, conn: &mut MultiplexedConnection) -> Result<(), QueueError> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(DELAYED_KEY)
            .arg("-inf")
            .arg(now_ms)
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(conn)
            .await?;

        for payload in due {
            // Only the worker whose ZREM wins moves the entry.
            let removed: i64 = redis::cmd("ZREM")
                .arg(DELAYED_KEY)
                .arg(&payload)
                .query_async(conn)
                .await?;
            if removed == 1 {
                let _: i64 = redis::cmd("LPUSH")
                    .arg(READY_KEY)
                    .arg(&payload)
                    .query_async(conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, envelope: JobEnvelope, delay: Duration) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();

        if delay.is_zero() {
            let _: i64 = redis::cmd("LPUSH")
                .arg(READY_KEY)
                .arg(payload)
                .query_async(&mut conn)
                .await?;
        } else {
            let ready_at = Utc::now().timestamp_millis()
                + i64::try_from(delay.as_millis()).unwrap_or(i64::MAX / 2);
            let _: i64 = redis::cmd("ZADD")
                .arg(DELAYED_KEY)
                .arg(ready_at)
                .arg(payload)
                .query_async(&mut conn)
                .await?;
        }

        debug!(
            "Enqueued job {} ({}) attempt {} with delay {}ms",
            envelope.id,
            envelope.job.kind(),
            envelope.attempt,
            delay.as_millis()
        );
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<JobEnvelope>, QueueError> {
        let mut conn = self.conn.clone();
        self.promote_due(&mut conn).await?;

        let payload: Option<String> = redis::cmd("RPOP")
            .arg(READY_KEY)
            .query_async(&mut conn)
            .await?;

        Ok(payload
            .map(|p| serde_json::from_str::<JobEnvelope>(&p))
            .transpose()?)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub use memory::InMemoryJobQueue;


#[cfg(test)]
mod tests {
    use super::*;

    fn job(n: u128) -> Job {
        Job::GenerateResponse {
            question_id: Uuid::from_u128(n),
        }
    }

    #[tokio::test]
    async fn test_ready_jobs_dequeue_in_fifo_order() {
        let queue = InMemoryJobQueue::new();
        queue.submit(job(1), Duration::ZERO).await.unwrap();
        queue.submit(job(2), Duration::ZERO).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().unwrap().job, job(1));
        assert_eq!(queue.dequeue().await.unwrap().unwrap().job, job(2));
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_jobs_wait_until_due() {
        let queue = InMemoryJobQueue::new();
        queue.submit(job(1), Duration::from_secs(2)).await.unwrap();
        assert!(queue.dequeue().await.unwrap().is_none());
        assert_eq!(queue.pending()[0].1, Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        let envelope = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(envelope.job, job(1));
        assert_eq!(envelope.attempt, 0);
    }

    #[tokio::test]
    async fn test_submit_returns_envelope_id() {
        let queue = InMemoryJobQueue::new();
        let id = queue.submit(job(7), Duration::ZERO).await.unwrap();
        assert_eq!(queue.dequeue().await.unwrap().unwrap().id, id);
    }

    #[test]
    fn test_envelope_survives_redis_payload_encoding() {
        let envelope = JobEnvelope::new(Job::ExtractInformation {
            document_id: Uuid::from_u128(3),
            text: Some("Jane Doe\nRust".to_string()),
        });
        let payload = serde_json::to_string(&envelope).unwrap();
        let decoded: JobEnvelope = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, envelope);
    }
}

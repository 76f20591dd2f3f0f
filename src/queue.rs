// ============================================================================
// Delivery Queue - Redis Hash Storage
// ============================================================================
//
// Outbound messages move through five Redis hashes keyed by message id:
//
//   pending     → accepted, waiting for a worker
//   in_progress → claimed by a worker, submission underway
//   delivered   → carrier accepted the message
//   failed      → submission failed, eligible for retry after backoff
//   dead_letter → retries exhausted, kept for inspection
//
// Every transition is a single MULTI/EXEC pipeline so a message is never
// visible in two queues at once and never lost between them. Terminal queues
// (delivered, dead_letter) are swept on a retention schedule.
//
// ============================================================================

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::config::QueueConfig;
use crate::error::{GatewayError, Result};

const SECONDS_PER_DAY: i64 = 86400;

/// Retry delays are capped regardless of retry count
pub const MAX_RETRY_DELAY_SECS: u64 = 300;

// Claim succeeds only if the message was still sitting in pending or
// failed; a second worker racing for the same id sees removed == 0.
const CLAIM_SCRIPT: &str = r#"
local removed = redis.call('HDEL', KEYS[1], ARGV[1]) + redis.call('HDEL', KEYS[2], ARGV[1])
if removed == 0 then
    return 0
end
redis.call('HSET', KEYS[3], ARGV[1], ARGV[2])
return 1
"#;

const PENDING_KEY: &str = "ogx:messages:pending";
const IN_PROGRESS_KEY: &str = "ogx:messages:in_progress";
const DELIVERED_KEY: &str = "ogx:messages:delivered";
const FAILED_KEY: &str = "ogx:messages:failed";
const DEAD_LETTER_KEY: &str = "ogx:messages:dead_letter";

/// Which delivery queue a message currently sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    Pending,
    InProgress,
    Delivered,
    Failed,
    DeadLetter,
}

/// Envelope stored in the delivery queues. `payload` is the wire-encoded
/// message document, already validated on the way in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub payload: String,
    pub state: QueueState,
    pub retry_count: u32,
    pub last_attempt: Option<i64>,
    pub error: Option<String>,
    pub created_at: i64,
}

impl QueuedMessage {
    pub fn new(id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: payload.into(),
            state: QueueState::Pending,
            retry_count: 0,
            last_attempt: None,
            error: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Backoff before retry attempt `retry_count`: the rate window doubled per
/// prior attempt, capped at [`MAX_RETRY_DELAY_SECS`].
pub fn retry_delay_secs(retry_count: u32, window_seconds: u64) -> u64 {
    if retry_count == 0 {
        return 0;
    }
    let exp = retry_count.saturating_sub(1).min(32);
    window_seconds
        .saturating_mul(1u64 << exp)
        .min(MAX_RETRY_DELAY_SECS)
}

/// Per-queue message counts, for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_progress: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dead_letter: u64,
}

#[derive(Clone)]
pub struct DeliveryQueue {
    conn: ConnectionManager,
    config: QueueConfig,
    /// Rate window used as the backoff base
    window_seconds: u64,
}

impl DeliveryQueue {
    pub fn new(conn: ConnectionManager, config: QueueConfig, window_seconds: u64) -> Self {
        Self {
            conn,
            config,
            window_seconds,
        }
    }

    /// Accept a message into the pending queue.
    ///
    /// Rejected when the pending queue already holds a full submission batch,
    /// so the gateway never buffers more than the carrier accepts per call.
    pub async fn enqueue(&mut self, message: &QueuedMessage) -> Result<()> {
        let pending: u64 = self.conn.hlen(PENDING_KEY).await?;
        if pending as usize >= self.config.max_submit_messages {
            return Err(GatewayError::protocol(format!(
                "pending queue at capacity ({} messages)",
                self.config.max_submit_messages
            )));
        }

        let json = serde_json::to_string(message)?;
        let _: () = self.conn.hset(PENDING_KEY, &message.id, json).await?;
        tracing::info!(message_id = %message.id, "Enqueued message");
        Ok(())
    }

    /// Read up to `batch` retry-eligible messages without removing them.
    ///
    /// A message is eligible when it has never been attempted, or when its
    /// backoff delay has elapsed since the last attempt. Oldest first.
    pub async fn dequeue(&mut self, batch: usize) -> Result<Vec<QueuedMessage>> {
        let now = chrono::Utc::now().timestamp();
        let mut eligible = Vec::new();

        for key in [PENDING_KEY, FAILED_KEY] {
            let entries: Vec<(String, String)> = self.conn.hgetall(key).await?;
            for (id, json) in entries {
                let message: QueuedMessage = match serde_json::from_str(&json) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::error!(message_id = %id, error = %e, "Dropping unparseable queue entry");
                        continue;
                    }
                };
                if self.is_retry_eligible(&message, now) {
                    eligible.push(message);
                }
            }
        }

        eligible.sort_by_key(|m| m.created_at);
        eligible.truncate(batch);
        Ok(eligible)
    }

    fn is_retry_eligible(&self, message: &QueuedMessage, now: i64) -> bool {
        match message.last_attempt {
            None => true,
            Some(last) => {
                let delay = retry_delay_secs(message.retry_count, self.window_seconds);
                now >= last + delay as i64
            }
        }
    }

    /// Claim a message: remove it from pending/failed and record it as
    /// in progress, in one atomic step.
    ///
    /// Returns `false` when the message is no longer in either source queue,
    /// meaning another worker claimed it first.
    pub async fn mark_in_progress(&mut self, message: &QueuedMessage) -> Result<bool> {
        let mut updated = message.clone();
        updated.state = QueueState::InProgress;
        let json = serde_json::to_string(&updated)?;

        let claimed: i64 = redis::Script::new(CLAIM_SCRIPT)
            .key(PENDING_KEY)
            .key(FAILED_KEY)
            .key(IN_PROGRESS_KEY)
            .arg(&message.id)
            .arg(json)
            .invoke_async(&mut self.conn)
            .await?;

        if claimed == 0 {
            tracing::debug!(message_id = %message.id, "Message already claimed elsewhere");
        }
        Ok(claimed == 1)
    }

    /// Record a successful carrier submission.
    pub async fn mark_delivered(&mut self, message: &QueuedMessage) -> Result<()> {
        let mut updated = message.clone();
        updated.state = QueueState::Delivered;
        updated.last_attempt = Some(chrono::Utc::now().timestamp());
        updated.error = None;
        let json = serde_json::to_string(&updated)?;

        let _: () = redis::pipe()
            .atomic()
            .hdel(IN_PROGRESS_KEY, &message.id)
            .hset(DELIVERED_KEY, &message.id, json)
            .query_async(&mut self.conn)
            .await?;
        tracing::info!(message_id = %message.id, "Message delivered");
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Increments the retry count and either returns the message to the
    /// failed queue or, once the count exceeds `max_retries`, dead-letters it.
    pub async fn mark_failed(&mut self, message: &QueuedMessage, error: &str) -> Result<QueueState> {
        let mut updated = message.clone();
        updated.retry_count += 1;
        updated.last_attempt = Some(chrono::Utc::now().timestamp());
        updated.error = Some(error.to_string());

        let destination = if updated.retry_count > self.config.max_retries {
            updated.state = QueueState::DeadLetter;
            DEAD_LETTER_KEY
        } else {
            updated.state = QueueState::Failed;
            FAILED_KEY
        };
        let json = serde_json::to_string(&updated)?;

        let _: () = redis::pipe()
            .atomic()
            .hdel(IN_PROGRESS_KEY, &message.id)
            .hdel(PENDING_KEY, &message.id)
            .hset(destination, &message.id, json)
            .query_async(&mut self.conn)
            .await?;

        if updated.state == QueueState::DeadLetter {
            tracing::warn!(
                message_id = %message.id,
                retry_count = updated.retry_count,
                error = %error,
                "Message dead-lettered"
            );
        } else {
            tracing::warn!(
                message_id = %message.id,
                retry_count = updated.retry_count,
                error = %error,
                "Message failed, will retry"
            );
        }
        Ok(updated.state)
    }

    /// Fetch a message envelope from any queue, for status lookups.
    pub async fn get(&mut self, message_id: &str) -> Result<Option<QueuedMessage>> {
        for key in [
            PENDING_KEY,
            IN_PROGRESS_KEY,
            DELIVERED_KEY,
            FAILED_KEY,
            DEAD_LETTER_KEY,
        ] {
            let json: Option<String> = self.conn.hget(key, message_id).await?;
            if let Some(json) = json {
                return Ok(Some(serde_json::from_str(&json)?));
            }
        }
        Ok(None)
    }

    /// Remove terminal-queue entries older than the retention window.
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&mut self) -> Result<u64> {
        let cutoff =
            chrono::Utc::now().timestamp() - self.config.retention_days * SECONDS_PER_DAY;
        let mut removed = 0u64;

        for key in [DELIVERED_KEY, DEAD_LETTER_KEY] {
            let entries: Vec<(String, String)> = self.conn.hgetall(key).await?;
            for (id, json) in entries {
                let expired = serde_json::from_str::<QueuedMessage>(&json)
                    .map(|m| m.last_attempt.unwrap_or(m.created_at) < cutoff)
                    .unwrap_or(true);
                if expired {
                    let _: () = self.conn.hdel(key, &id).await?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Cleaned up expired messages");
        }
        Ok(removed)
    }

    /// Per-queue counts for health reporting.
    pub async fn stats(&mut self) -> Result<QueueStats> {
        Ok(QueueStats {
            pending: self.conn.hlen(PENDING_KEY).await?,
            in_progress: self.conn.hlen(IN_PROGRESS_KEY).await?,
            delivered: self.conn.hlen(DELIVERED_KEY).await?,
            failed: self.conn.hlen(FAILED_KEY).await?,
            dead_letter: self.conn.hlen(DEAD_LETTER_KEY).await?,
        })
    }
}

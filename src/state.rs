//! Message lifecycle state tracking.
//!
//! Queue position (pending/in-progress/...) says where a message is inside
//! the gateway; lifecycle state says what the carrier and terminal have done
//! with it. The two advance independently: a delivered queue entry may still
//! be `SendingInProgress` until a status poll confirms receipt.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::cmf::types::{MessageDirection, MessageState};
use crate::error::{GatewayError, Result};

const STATE_KEY: &str = "ogx:message_states";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub message_id: String,
    pub state: MessageState,
    pub direction: MessageDirection,
    pub updated_at: i64,
}

/// Whether a lifecycle transition is allowed.
///
/// Terminal states never move again, and `Waiting` (delayed send) can only
/// follow the initial `Accepted`.
pub fn can_transition(from: MessageState, to: MessageState) -> bool {
    if from.is_terminal() {
        return false;
    }
    if to == MessageState::Waiting {
        return from == MessageState::Accepted;
    }
    true
}

#[derive(Clone)]
pub struct MessageStateStore {
    conn: ConnectionManager,
}

impl MessageStateStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Record a newly accepted forward message.
    pub async fn accept(&mut self, message_id: &str) -> Result<StateRecord> {
        let record = StateRecord {
            message_id: message_id.to_string(),
            state: MessageState::Accepted,
            direction: MessageDirection::Forward,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store(&record).await?;
        Ok(record)
    }

    /// Record a mobile-originated message. Return messages have no delivery
    /// pipeline on our side: they arrive already received.
    pub async fn accept_return(&mut self, message_id: &str) -> Result<StateRecord> {
        let record = StateRecord {
            message_id: message_id.to_string(),
            state: MessageState::Received,
            direction: MessageDirection::Return,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store(&record).await?;
        Ok(record)
    }

    /// Advance a message to a new lifecycle state, enforcing transition rules.
    pub async fn transition(&mut self, message_id: &str, to: MessageState) -> Result<StateRecord> {
        let mut record = self
            .get(message_id)
            .await?
            .ok_or_else(|| GatewayError::protocol(format!("unknown message '{message_id}'")))?;

        if !can_transition(record.state, to) {
            return Err(GatewayError::protocol(format!(
                "invalid state transition {:?} -> {:?} for message '{}'",
                record.state, to, message_id
            )));
        }

        record.state = to;
        record.updated_at = chrono::Utc::now().timestamp();
        self.store(&record).await?;
        tracing::debug!(message_id = %message_id, state = ?to, "Message state updated");
        Ok(record)
    }

    /// Forward messages whose carrier-side outcome is still unknown, for
    /// status polling.
    pub async fn in_flight_forward(&mut self) -> Result<Vec<StateRecord>> {
        let entries: Vec<(String, String)> = self.conn.hgetall(STATE_KEY).await?;
        let mut records = Vec::new();
        for (id, json) in entries {
            match serde_json::from_str::<StateRecord>(&json) {
                Ok(record) => {
                    if record.direction == MessageDirection::Forward
                        && matches!(
                            record.state,
                            MessageState::SendingInProgress | MessageState::Waiting
                        )
                    {
                        records.push(record);
                    }
                }
                Err(e) => {
                    tracing::error!(message_id = %id, error = %e, "Skipping unparseable state record")
                }
            }
        }
        Ok(records)
    }

    pub async fn get(&mut self, message_id: &str) -> Result<Option<StateRecord>> {
        let json: Option<String> = self.conn.hget(STATE_KEY, message_id).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store(&mut self, record: &StateRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let _: () = self.conn.hset(STATE_KEY, &record.message_id, json).await?;
        Ok(())
    }
}

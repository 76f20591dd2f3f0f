//! OGx gateway library.
//!
//! Speaks the Common Message Format to a satellite/cellular carrier:
//! validates and encodes messages, queues them in Redis, delivers them with
//! retry/backoff, tracks lifecycle state and picks transports from live
//! health metrics.

use redis::aio::ConnectionManager;
use uuid::Uuid;

pub mod carrier;
pub mod cmf;
pub mod config;
pub mod error;
pub mod queue;
pub mod session;
pub mod state;
pub mod transport;
pub mod worker;

pub use config::Config;
pub use error::{GatewayError, Result};

use std::collections::HashMap;

use carrier::CarrierApi;
use cmf::types::{MessageState, MAX_STATUS_IDS_PER_REQUEST};
use cmf::validator::ValidationContext;
use cmf::{JsonCodec, Message};
use queue::{DeliveryQueue, QueuedMessage};
use state::MessageStateStore;

/// Open a managed Redis connection.
pub async fn connect_redis(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// Accept a forward message: validate, encode, queue and record it as
/// `Accepted`. Returns the queue envelope carrying the assigned id.
pub async fn submit_forward_message(
    queue: &mut DeliveryQueue,
    states: &mut MessageStateStore,
    message: &Message,
) -> Result<QueuedMessage> {
    let payload = JsonCodec::encode(message)?;
    let payload = String::from_utf8(payload)
        .map_err(|e| GatewayError::internal(format!("encoded payload not UTF-8: {e}")))?;

    let queued = QueuedMessage::new(Uuid::new_v4().to_string(), payload);
    queue.enqueue(&queued).await?;
    states.accept(&queued.id).await?;

    tracing::info!(
        message_id = %queued.id,
        message_name = %message.name,
        sin = message.sin,
        min = message.min,
        "Accepted forward message"
    );
    Ok(queued)
}

/// Poll the carrier for the status of every in-flight forward message and
/// advance the lifecycle records that moved. Returns the number of records
/// updated.
///
/// The carrier, not the gateway, decides when a submitted message reaches
/// the terminal so `SendingInProgress` only resolves through this poll.
pub async fn poll_forward_statuses(
    carrier: &dyn CarrierApi,
    states: &mut MessageStateStore,
) -> Result<u64> {
    let in_flight = states.in_flight_forward().await?;
    if in_flight.is_empty() {
        return Ok(0);
    }

    let current: HashMap<String, MessageState> = in_flight
        .iter()
        .map(|r| (r.message_id.clone(), r.state))
        .collect();
    let ids: Vec<String> = in_flight.into_iter().map(|r| r.message_id).collect();

    let mut updated = 0u64;
    for chunk in ids.chunks(MAX_STATUS_IDS_PER_REQUEST) {
        for status in carrier.message_statuses(chunk).await? {
            let next = match status.state() {
                Some(state) => state,
                None => {
                    tracing::warn!(
                        message_id = %status.message_id,
                        state_code = status.state_code,
                        "Carrier reported unknown state code"
                    );
                    continue;
                }
            };
            if current.get(&status.message_id) == Some(&next) {
                continue;
            }
            match states.transition(&status.message_id, next).await {
                Ok(_) => updated += 1,
                Err(e) => {
                    tracing::warn!(
                        message_id = %status.message_id,
                        error = %e,
                        "Status update skipped"
                    );
                }
            }
        }
    }

    if updated > 0 {
        tracing::info!(updated, "Advanced message states from carrier statuses");
    }
    Ok(updated)
}

/// Ingest one mobile-originated message document: decode it and record its
/// (terminal) `Received` state under the carrier-assigned id.
pub async fn ingest_return_message(
    states: &mut MessageStateStore,
    message_id: &str,
    bytes: &[u8],
) -> Result<Message> {
    let message = JsonCodec::decode(bytes, &ValidationContext::returned())?;
    states.accept_return(message_id).await?;
    tracing::info!(
        message_id = %message_id,
        message_name = %message.name,
        "Ingested return message"
    );
    Ok(message)
}

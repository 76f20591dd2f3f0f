// Delivery worker integration tests with a stub carrier.
//
// These need a running Redis instance:
//   docker run -d -p 6379:6379 redis:7
// Run with: cargo test -- --ignored

use async_trait::async_trait;
use ogx_gateway::carrier::{
    CarrierApi, MessageStatus, ReturnMessagesPage, SubmitRequest, SubmitResponse,
};
use ogx_gateway::config::QueueConfig;
use ogx_gateway::error::{GatewayError, Result};
use ogx_gateway::queue::{DeliveryQueue, QueueState, QueuedMessage};
use ogx_gateway::state::MessageStateStore;
use ogx_gateway::transport::InMemoryNetworkMonitor;
use ogx_gateway::worker::MessageWorker;
use redis::AsyncCommands;
use serial_test::serial;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

enum CarrierMode {
    AlwaysSucceed,
    AlwaysFail,
    NeverRespond,
}

struct StubCarrier(CarrierMode);

#[async_trait]
impl CarrierApi for StubCarrier {
    async fn submit_message(&self, _request: &SubmitRequest) -> Result<SubmitResponse> {
        match self.0 {
            CarrierMode::AlwaysSucceed => Ok(SubmitResponse {
                error_id: 0,
                description: None,
                retry_after_secs: None,
            }),
            CarrierMode::AlwaysFail => Err(GatewayError::protocol("carrier unreachable")),
            CarrierMode::NeverRespond => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("stub carrier never responds")
            }
        }
    }

    async fn message_statuses(&self, _ids: &[String]) -> Result<Vec<MessageStatus>> {
        Ok(Vec::new())
    }

    async fn return_messages(&self, _from_utc: &str) -> Result<ReturnMessagesPage> {
        Ok(ReturnMessagesPage {
            messages: Vec::new(),
            next_start_utc: None,
            more: false,
        })
    }
}

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn setup(
    mode: CarrierMode,
    config: QueueConfig,
) -> (MessageWorker, DeliveryQueue, MessageStateStore) {
    let conn = ogx_gateway::connect_redis(&redis_url())
        .await
        .expect("Failed to connect to Redis");

    let mut raw = conn.clone();
    for key in [
        "ogx:messages:pending",
        "ogx:messages:in_progress",
        "ogx:messages:delivered",
        "ogx:messages:failed",
        "ogx:messages:dead_letter",
        "ogx:message_states",
    ] {
        let _: () = raw.del(key).await.expect("Redis DEL failed");
    }

    // Zero backoff window keeps retries immediate for tests
    let queue = DeliveryQueue::new(conn.clone(), config.clone(), 0);
    let states = MessageStateStore::new(conn.clone());
    let worker = MessageWorker::new(
        queue.clone(),
        states.clone(),
        Arc::new(StubCarrier(mode)),
        Arc::new(InMemoryNetworkMonitor::new()),
        config,
    );
    (worker, queue, states)
}

async fn wait_for_state(
    queue: &mut DeliveryQueue,
    id: &str,
    expected: QueueState,
) -> QueuedMessage {
    for _ in 0..100 {
        if let Some(msg) = queue.get(id).await.expect("get failed") {
            if msg.state == expected {
                return msg;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("message {id} never reached {expected:?}");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn successful_submission_is_marked_delivered() {
    let (worker, mut queue, mut states) =
        setup(CarrierMode::AlwaysSucceed, QueueConfig::default()).await;

    let msg = QueuedMessage::new(Uuid::new_v4().to_string(), r#"{"Name":"t"}"#);
    queue.enqueue(&msg).await.expect("enqueue failed");
    states.accept(&msg.id).await.expect("accept failed");

    let handle = worker.start();
    let delivered = wait_for_state(&mut queue, &msg.id, QueueState::Delivered).await;
    assert_eq!(delivered.retry_count, 0);

    let metrics = handle.metrics();
    assert!(metrics.processed_count >= 1);
    assert!(metrics.last_successful_process > 0);

    handle.stop().await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn persistent_failure_dead_letters_after_max_retries() {
    let config = QueueConfig {
        max_retries: 2,
        worker_idle_sleep_secs: 1,
        ..QueueConfig::default()
    };
    let (worker, mut queue, mut states) = setup(CarrierMode::AlwaysFail, config).await;

    let msg = QueuedMessage::new(Uuid::new_v4().to_string(), r#"{"Name":"t"}"#);
    queue.enqueue(&msg).await.expect("enqueue failed");
    states.accept(&msg.id).await.expect("accept failed");

    let handle = worker.start();
    let dead = wait_for_state(&mut queue, &msg.id, QueueState::DeadLetter).await;
    assert_eq!(dead.retry_count, 3); // max_retries + 1 attempts
    assert_eq!(dead.error.as_deref(), Some("Protocol error: carrier unreachable"));

    let metrics = handle.metrics();
    assert!(metrics.error_count >= 3);
    assert_eq!(metrics.processed_count, 0);

    handle.stop().await;

    // Dead-lettered message is recorded as delivery-failed
    let record = states.get(&msg.id).await.unwrap().unwrap();
    assert_eq!(
        record.state,
        ogx_gateway::cmf::MessageState::DeliveryFailed
    );
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn shutdown_cancels_in_flight_message() {
    let (worker, mut queue, mut states) =
        setup(CarrierMode::NeverRespond, QueueConfig::default()).await;

    let msg = QueuedMessage::new(Uuid::new_v4().to_string(), r#"{"Name":"t"}"#);
    queue.enqueue(&msg).await.expect("enqueue failed");
    states.accept(&msg.id).await.expect("accept failed");

    let handle = worker.start();

    // Give the worker time to claim the message
    wait_for_state(&mut queue, &msg.id, QueueState::InProgress).await;
    handle.stop().await;

    let cancelled = queue.get(&msg.id).await.unwrap().unwrap();
    assert_eq!(cancelled.state, QueueState::Failed);
    assert_eq!(cancelled.error.as_deref(), Some("processing cancelled"));
}

// End-to-end submission path: validate -> encode -> queue -> state.
//
// These need a running Redis instance:
//   docker run -d -p 6379:6379 redis:7
// Run with: cargo test -- --ignored

use ogx_gateway::cmf::types::FieldType;
use ogx_gateway::cmf::{Field, FieldValue, Message, MessageDirection, MessageState};
use ogx_gateway::config::QueueConfig;
use ogx_gateway::queue::{DeliveryQueue, QueueState};
use ogx_gateway::state::MessageStateStore;
use ogx_gateway::GatewayError;
use redis::AsyncCommands;
use serial_test::serial;
use std::env;
use uuid::Uuid;

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn setup() -> (DeliveryQueue, MessageStateStore) {
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
    (
        DeliveryQueue::new(conn.clone(), QueueConfig::default(), 60),
        MessageStateStore::new(conn),
    )
}

fn position_report() -> Message {
    Message::new(
        "position_report",
        16,
        1,
        MessageDirection::Forward,
        vec![
            Field::scalar("latitude", FieldType::SignedInt, FieldValue::Signed(451234)),
            Field::scalar("moving", FieldType::Boolean, FieldValue::Bool(false)),
        ],
    )
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn valid_message_is_queued_and_accepted() {
    let (mut queue, mut states) = setup().await;

    let queued = ogx_gateway::submit_forward_message(&mut queue, &mut states, &position_report())
        .await
        .expect("submit failed");

    assert_eq!(queued.state, QueueState::Pending);
    let record = states.get(&queued.id).await.unwrap().unwrap();
    assert_eq!(record.state, MessageState::Accepted);
    assert_eq!(record.direction, MessageDirection::Forward);

    // The stored payload is the wire document with string scalars
    let wire: serde_json::Value = serde_json::from_str(&queued.payload).unwrap();
    assert_eq!(wire["SIN"], 16);
    assert_eq!(wire["Fields"][0]["Value"], "451234");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn invalid_message_is_rejected_before_queueing() {
    let (mut queue, mut states) = setup().await;

    let mut bad = position_report();
    bad.min = 0; // out of range

    let err = ogx_gateway::submit_forward_message(&mut queue, &mut states, &bad)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, 0, "rejected message must not be queued");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn return_message_is_ingested_as_received() {
    let (_, mut states) = setup().await;

    let wire = serde_json::json!({
        "Name": "sensor_reading",
        "SIN": 32,
        "MIN": 4,
        "Fields": [
            {"Name": "temperature", "Type": "signedint", "Value": "-12"}
        ]
    });
    let id = Uuid::new_v4().to_string();
    let message =
        ogx_gateway::ingest_return_message(&mut states, &id, &serde_json::to_vec(&wire).unwrap())
            .await
            .expect("ingest failed");

    assert_eq!(message.direction, MessageDirection::Return);
    assert_eq!(message.name, "sensor_reading");

    let record = states.get(&id).await.unwrap().unwrap();
    assert_eq!(record.state, MessageState::Received);
}

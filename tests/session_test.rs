// Session handler integration tests.
//
// These need a running Redis instance:
//   docker run -d -p 6379:6379 redis:7
// Run with: cargo test -- --ignored

use async_trait::async_trait;
use ogx_gateway::carrier::Authenticator;
use ogx_gateway::config::SessionConfig;
use ogx_gateway::error::{GatewayError, Result};
use ogx_gateway::session::SessionHandler;
use redis::AsyncCommands;
use serial_test::serial;
use std::env;
use uuid::Uuid;

struct StubAuthenticator;

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn authenticate(&self, client_id: &str, client_secret: &str) -> Result<String> {
        if client_secret == "wrong" {
            return Err(GatewayError::auth("bad credentials"));
        }
        Ok(format!("token-for-{client_id}"))
    }
}

fn redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn setup(config: SessionConfig) -> (SessionHandler<StubAuthenticator>, String) {
    let conn = ogx_gateway::connect_redis(&redis_url())
        .await
        .expect("Failed to connect to Redis");
    // Unique client per test run keeps tests independent
    let client_id = format!("client-{}", Uuid::new_v4());
    (SessionHandler::new(conn, StubAuthenticator, config), client_id)
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn create_and_validate_session() {
    let (mut handler, client_id) = setup(SessionConfig::default()).await;

    let session = handler
        .create_session(&client_id, "secret")
        .await
        .expect("create_session failed");
    assert_eq!(session.client_id, client_id);
    assert_eq!(session.auth_token, format!("token-for-{client_id}"));
    assert_eq!(session.access_count, 0);

    let validated = handler
        .validate_session(&session.id)
        .await
        .expect("validate_session failed")
        .expect("session should be live");
    assert_eq!(validated.access_count, 1);

    handler.end_session(&session.id).await.expect("end failed");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn concurrent_session_cap_enforced() {
    let config = SessionConfig {
        max_concurrent_sessions: 2,
        ..SessionConfig::default()
    };
    let (mut handler, client_id) = setup(config).await;

    let s1 = handler.create_session(&client_id, "secret").await.unwrap();
    let s2 = handler.create_session(&client_id, "secret").await.unwrap();

    let err = handler.create_session(&client_id, "secret").await.unwrap_err();
    assert!(err
        .to_string()
        .contains("Maximum concurrent sessions exceeded"));

    // Ending one frees a slot
    handler.end_session(&s1.id).await.unwrap();
    let s3 = handler.create_session(&client_id, "secret").await.unwrap();

    for id in [s2.id, s3.id] {
        handler.end_session(&id).await.unwrap();
    }
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn bad_credentials_create_nothing() {
    let (mut handler, client_id) = setup(SessionConfig::default()).await;

    let err = handler.create_session(&client_id, "wrong").await.unwrap_err();
    assert!(matches!(err, GatewayError::Auth(_)));

    let mut conn = ogx_gateway::connect_redis(&redis_url()).await.unwrap();
    let count: usize = conn
        .scard(format!("ogx:client_sessions:{client_id}"))
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn expired_session_ends_on_validation() {
    let config = SessionConfig {
        session_timeout_secs: 0, // expires immediately
        ..SessionConfig::default()
    };
    let (mut handler, client_id) = setup(config).await;

    let session = handler.create_session(&client_id, "secret").await.unwrap();
    let validated = handler.validate_session(&session.id).await.unwrap();
    assert!(validated.is_none(), "expired session should not validate");

    // The expiry tore the session down
    let mut conn = ogx_gateway::connect_redis(&redis_url()).await.unwrap();
    let exists: bool = conn
        .exists(format!("ogx:session:{}", session.id))
        .await
        .unwrap();
    assert!(!exists);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn refresh_extends_expiry() {
    let (mut handler, client_id) = setup(SessionConfig::default()).await;

    let session = handler.create_session(&client_id, "secret").await.unwrap();
    let refreshed = handler
        .refresh_session(&session.id, Some(7200))
        .await
        .expect("refresh failed");
    assert!(refreshed.expires_at >= session.expires_at + 3000);

    handler.end_session(&session.id).await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn end_session_is_idempotent() {
    let (mut handler, client_id) = setup(SessionConfig::default()).await;

    let session = handler.create_session(&client_id, "secret").await.unwrap();
    handler.end_session(&session.id).await.expect("first end failed");
    handler
        .end_session(&session.id)
        .await
        .expect("second end should also succeed");
    handler
        .end_session("never-existed")
        .await
        .expect("ending unknown session should succeed");
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn sweep_removes_expired_sessions() {
    let config = SessionConfig {
        session_timeout_secs: 0,
        ..SessionConfig::default()
    };
    let (mut handler, client_id) = setup(config).await;

    handler.create_session(&client_id, "secret").await.unwrap();
    let removed = handler.sweep_client(&client_id).await.expect("sweep failed");
    assert_eq!(removed, 1);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Redis
async fn global_sweep_covers_every_client() {
    let config = SessionConfig {
        session_timeout_secs: 0,
        ..SessionConfig::default()
    };
    let (mut handler, client_a) = setup(config).await;
    let client_b = format!("client-{}", Uuid::new_v4());

    handler.create_session(&client_a, "secret").await.unwrap();
    handler.create_session(&client_b, "secret").await.unwrap();

    let removed = handler.sweep_expired().await.expect("sweep failed");
    assert!(removed >= 2, "expected both clients swept, removed {removed}");

    let mut conn = ogx_gateway::connect_redis(&redis_url()).await.unwrap();
    for client in [&client_a, &client_b] {
        let count: usize = conn
            .scard(format!("ogx:client_sessions:{client}"))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}

// ============================================================================
// OGx Gateway Service
// ============================================================================
//
// Wires the delivery pipeline together:
// - delivery worker draining the Redis queues into the carrier API
// - status poller resolving in-flight forward messages
// - return-message poller pulling mobile-originated messages
// - periodic cleanup of expired messages and sessions
//
// ============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ogx_gateway::carrier::{CarrierApi, OgxHttpClient};
use ogx_gateway::config::Config;
use ogx_gateway::queue::DeliveryQueue;
use ogx_gateway::session::SessionHandler;
use ogx_gateway::state::MessageStateStore;
use ogx_gateway::transport::InMemoryNetworkMonitor;
use ogx_gateway::worker::MessageWorker;

/// Interval between return-message polls
const RETURN_POLL_INTERVAL_SECS: u64 = 60;

/// Interval between forward-message status polls
const STATUS_POLL_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Connecting to Redis at: {}", mask_credentials(&config.redis_url));
    let conn = ogx_gateway::connect_redis(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis");

    let carrier = Arc::new(OgxHttpClient::new(config.carrier.clone()));
    let monitor = Arc::new(InMemoryNetworkMonitor::new());
    let queue = DeliveryQueue::new(
        conn.clone(),
        config.queue.clone(),
        config.carrier.window_seconds,
    );
    let states = MessageStateStore::new(conn.clone());

    let worker = MessageWorker::new(
        queue.clone(),
        states.clone(),
        carrier.clone(),
        monitor.clone(),
        config.queue.clone(),
    );
    let worker_handle = worker.start();
    info!("Delivery worker running");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleanup_task = tokio::spawn(run_cleanup(
        queue.clone(),
        SessionHandler::new(conn.clone(), carrier.clone(), config.session.clone()),
        config.session.cleanup_interval_secs,
        shutdown_rx.clone(),
    ));

    let status_task = tokio::spawn(run_status_poller(
        carrier.clone(),
        states.clone(),
        shutdown_rx.clone(),
    ));

    let poller_task = tokio::spawn(run_return_poller(
        carrier.clone(),
        states.clone(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    worker_handle.stop().await;
    let _ = cleanup_task.await;
    let _ = status_task.await;
    let _ = poller_task.await;

    info!("Gateway stopped");
    Ok(())
}

/// Periodic sweep of expired queue entries and sessions.
async fn run_cleanup(
    mut queue: DeliveryQueue,
    mut sessions: SessionHandler<Arc<OgxHttpClient>>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = queue.cleanup_expired().await {
                    error!(error = %e, "Message cleanup failed");
                }
                if let Err(e) = sessions.sweep_expired().await {
                    error!(error = %e, "Session sweep failed");
                }
            }
        }
    }
}

/// Poll submitted-message statuses so forward messages settle into their
/// carrier-reported terminal state.
async fn run_status_poller(
    carrier: Arc<OgxHttpClient>,
    mut states: MessageStateStore,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(STATUS_POLL_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) =
                    ogx_gateway::poll_forward_statuses(carrier.as_ref(), &mut states).await
                {
                    error!(error = %e, "Status poll failed");
                }
            }
        }
    }
}

/// Poll the carrier for mobile-originated messages and ingest them, paging
/// with the carrier's high-watermark.
async fn run_return_poller(
    carrier: Arc<OgxHttpClient>,
    mut states: MessageStateStore,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut from_utc = chrono::Utc::now().to_rfc3339();
    let mut ticker = tokio::time::interval(Duration::from_secs(RETURN_POLL_INTERVAL_SECS));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                loop {
                    let page = match carrier.return_messages(&from_utc).await {
                        Ok(page) => page,
                        Err(e) => {
                            error!(error = %e, "Return message poll failed");
                            break;
                        }
                    };

                    for wire in &page.messages {
                        let message_id = wire
                            .get("MessageID")
                            .and_then(|v| v.as_str())
                            .map(str::to_string)
                            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                        let bytes = match serde_json::to_vec(wire) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                error!(error = %e, "Unserialisable return message");
                                continue;
                            }
                        };
                        if let Err(e) =
                            ogx_gateway::ingest_return_message(&mut states, &message_id, &bytes).await
                        {
                            error!(message_id = %message_id, error = %e, "Failed to ingest return message");
                        }
                    }

                    if let Some(next) = page.next_start_utc {
                        from_utc = next;
                    }
                    if !page.more {
                        break;
                    }
                }
            }
        }
    }
}

/// Mask credentials in a Redis URL for logging
fn mask_credentials(url: &str) -> String {
    match (url.find("://"), url.find('@')) {
        (Some(proto), Some(at)) if at > proto => {
            format!("{}***{}", &url[..proto + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

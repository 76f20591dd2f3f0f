//! Delivery worker: drains the pending queue and submits messages to the
//! carrier, with retry, backoff and health reporting.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::carrier::{CarrierApi, SubmitRequest};
use crate::cmf::types::MessageState;
use crate::config::QueueConfig;
use crate::error::{GatewayError, Result};
use crate::queue::{DeliveryQueue, QueueState, QueuedMessage};
use crate::state::MessageStateStore;
use crate::transport::{NetworkMonitor, TransportOptimizer};

// ============================================================================
// Worker Metrics
// ============================================================================

/// Read-only health counters, shared with whatever reports liveness.
#[derive(Default)]
pub struct WorkerMetrics {
    processed_count: AtomicU64,
    error_count: AtomicU64,
    retry_count: AtomicU64,
    last_successful_process: AtomicI64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub processed_count: u64,
    pub error_count: u64,
    pub retry_count: u64,
    /// Unix timestamp of the last successful submission, 0 if none yet
    pub last_successful_process: i64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            processed_count: self.processed_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            retry_count: self.retry_count.load(Ordering::Relaxed),
            last_successful_process: self.last_successful_process.load(Ordering::Relaxed),
        }
    }

    fn record_success(&self) {
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        self.last_successful_process
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Worker
// ============================================================================

enum BatchOutcome {
    Idle,
    Worked,
    /// Carrier asked us to back off for this many seconds
    Throttled(u64),
    Cancelled,
}

pub struct MessageWorker {
    queue: DeliveryQueue,
    states: MessageStateStore,
    carrier: Arc<dyn CarrierApi>,
    monitor: Arc<dyn NetworkMonitor>,
    config: QueueConfig,
    metrics: Arc<WorkerMetrics>,
}

/// Running worker task plus its shutdown signal.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    metrics: Arc<WorkerMetrics>,
}

impl WorkerHandle {
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Signal shutdown and wait for the worker to finish its current message.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}

impl MessageWorker {
    pub fn new(
        queue: DeliveryQueue,
        states: MessageStateStore,
        carrier: Arc<dyn CarrierApi>,
        monitor: Arc<dyn NetworkMonitor>,
        config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            states,
            carrier,
            monitor,
            config,
            metrics: Arc::new(WorkerMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawn the worker loop. The returned handle stops it.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::clone(&self.metrics);
        let task = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        WorkerHandle {
            shutdown: shutdown_tx,
            task,
            metrics,
        }
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.worker_batch_size,
            max_retries = self.config.max_retries,
            "Delivery worker started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = match self.process_batch(&mut shutdown).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Batch processing failed");
                    BatchOutcome::Idle
                }
            };

            let sleep_secs = match outcome {
                BatchOutcome::Worked => continue,
                BatchOutcome::Cancelled => break,
                BatchOutcome::Idle => self.config.worker_idle_sleep_secs,
                BatchOutcome::Throttled(secs) => secs,
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {}
            }
        }

        tracing::info!("Delivery worker stopped");
    }

    async fn process_batch(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<BatchOutcome> {
        let batch = self.queue.dequeue(self.config.worker_batch_size).await?;
        if batch.is_empty() {
            return Ok(BatchOutcome::Idle);
        }

        for message in batch {
            // Lost the claim race to another worker: not ours to submit
            if !self.queue.mark_in_progress(&message).await? {
                continue;
            }
            self.update_state(&message.id, MessageState::SendingInProgress)
                .await;

            let submitted = tokio::select! {
                biased;
                _ = shutdown.changed() => None,
                result = self.submit(&message) => Some(result),
            };

            match submitted {
                None => {
                    // The claimed message must not be stranded in progress
                    self.queue
                        .mark_failed(&message, "processing cancelled")
                        .await?;
                    tracing::info!(message_id = %message.id, "Cancelled in-flight message");
                    return Ok(BatchOutcome::Cancelled);
                }
                Some(result) => {
                    if let Some(retry_after) = self.settle(&message, result).await? {
                        return Ok(BatchOutcome::Throttled(retry_after));
                    }
                }
            }
        }
        Ok(BatchOutcome::Worked)
    }

    /// Submit one message, reporting the observed latency to the monitor.
    async fn submit(&self, message: &QueuedMessage) -> Result<()> {
        let payload: serde_json::Value = serde_json::from_str(&message.payload)?;

        // Cold start has no metrics yet; in that case let the carrier pick
        let optimizer = TransportOptimizer::new(self.monitor.as_ref());
        let transport = match optimizer
            .select_transport(message.payload.len(), None)
            .await
        {
            Ok(transport) => Some(transport),
            Err(GatewayError::Protocol(msg)) if msg.contains("no healthy transports") => {
                tracing::debug!(message_id = %message.id, "No transport metrics, deferring to carrier");
                None
            }
            Err(e) => return Err(e),
        };

        let request = SubmitRequest {
            message_id: message.id.clone(),
            payload,
            transport,
        };

        let started = std::time::Instant::now();
        let result = self.carrier.submit_message(&request).await;
        let latency_ms = started.elapsed().as_millis() as f64;

        if let Some(transport) = transport {
            let success = matches!(&result, Ok(resp) if resp.is_success());
            if let Err(e) = self
                .monitor
                .record_outcome(transport, latency_ms, success)
                .await
            {
                tracing::warn!(error = %e, "Failed to record transport outcome");
            }
        }

        match result? {
            resp if resp.is_success() => Ok(()),
            resp => Err(GatewayError::protocol(
                resp.description
                    .unwrap_or_else(|| format!("carrier error {}", resp.error_id)),
            )),
        }
    }

    /// Apply a submission result to the queues. Returns a backoff duration
    /// when the carrier throttled us.
    async fn settle(
        &mut self,
        message: &QueuedMessage,
        result: Result<()>,
    ) -> Result<Option<u64>> {
        match result {
            Ok(()) => {
                self.queue.mark_delivered(message).await?;
                self.metrics.record_success();
                Ok(None)
            }
            Err(GatewayError::RateLimit {
                message: reason,
                retry_after_secs,
            }) => {
                self.queue.mark_failed(message, &reason).await?;
                self.metrics.record_failure();
                tracing::warn!(
                    message_id = %message.id,
                    retry_after_secs,
                    "Carrier rate limit hit, backing off"
                );
                Ok(Some(retry_after_secs))
            }
            Err(e) => {
                let destination = self.queue.mark_failed(message, &e.to_string()).await?;
                self.metrics.record_failure();
                if destination == QueueState::DeadLetter {
                    self.update_state(&message.id, MessageState::DeliveryFailed)
                        .await;
                }
                Ok(None)
            }
        }
    }

    /// Lifecycle updates never block delivery; failures are logged and the
    /// queue transition stands.
    async fn update_state(&mut self, message_id: &str, state: MessageState) {
        if let Err(e) = self.states.transition(message_id, state).await {
            tracing::warn!(message_id = %message_id, error = %e, "State update skipped");
        }
    }
}

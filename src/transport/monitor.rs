//! Transport health metrics and their collection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cmf::types::TransportType;
use crate::error::Result;

/// Metrics older than this are treated as unknown health
pub const METRICS_STALE_SECS: i64 = 300;

/// Outcomes kept per transport for rolling metric computation
const ROLLING_WINDOW: usize = 100;

/// Point-in-time health reading for one transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub transport: TransportType,
    pub latency_ms: f64,
    /// Percentage of failed submissions, 0-100
    pub error_rate: f64,
    /// Percentage of time the transport answered at all, 0-100
    pub availability: f64,
    pub timestamp: i64,
}

impl NetworkMetrics {
    pub fn is_stale(&self, now: i64) -> bool {
        now - self.timestamp > METRICS_STALE_SECS
    }
}

/// Source of transport health data.
///
/// The worker reports every submission outcome back through this trait, so
/// transport selection reflects what delivery actually observed.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn metrics(&self) -> Result<Vec<NetworkMetrics>>;

    async fn record_outcome(
        &self,
        transport: TransportType,
        latency_ms: f64,
        success: bool,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    latency_ms: f64,
    success: bool,
    timestamp: i64,
}

/// In-memory monitor deriving rolling metrics from submission outcomes.
#[derive(Clone, Default)]
pub struct InMemoryNetworkMonitor {
    outcomes: Arc<RwLock<HashMap<TransportType, VecDeque<Outcome>>>>,
}

impl InMemoryNetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NetworkMonitor for InMemoryNetworkMonitor {
    async fn metrics(&self) -> Result<Vec<NetworkMetrics>> {
        let outcomes = self.outcomes.read().await;
        let mut result = Vec::with_capacity(outcomes.len());
        for (transport, window) in outcomes.iter() {
            if window.is_empty() {
                continue;
            }
            let total = window.len() as f64;
            let failures = window.iter().filter(|o| !o.success).count() as f64;
            let latency_sum: f64 = window.iter().map(|o| o.latency_ms).sum();
            let latest = window
                .iter()
                .map(|o| o.timestamp)
                .max()
                .unwrap_or_default();
            result.push(NetworkMetrics {
                transport: *transport,
                latency_ms: latency_sum / total,
                error_rate: failures / total * 100.0,
                // Every recorded outcome means the transport answered; an
                // unreachable transport simply stops producing fresh metrics
                // and ages out via staleness
                availability: 100.0,
                timestamp: latest,
            });
        }
        Ok(result)
    }

    async fn record_outcome(
        &self,
        transport: TransportType,
        latency_ms: f64,
        success: bool,
    ) -> Result<()> {
        let mut outcomes = self.outcomes.write().await;
        let window = outcomes.entry(transport).or_default();
        if window.len() >= ROLLING_WINDOW {
            window.pop_front();
        }
        window.push_back(Outcome {
            latency_ms,
            success,
            timestamp: chrono::Utc::now().timestamp(),
        });
        Ok(())
    }
}

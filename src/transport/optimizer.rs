//! Transport selection from live health metrics.

use crate::cmf::types::{NetworkType, TransportType};
use crate::error::{GatewayError, Result};
use crate::transport::monitor::{NetworkMetrics, NetworkMonitor};

// Health thresholds: a transport failing any of these is excluded outright
const MAX_ERROR_RATE: f64 = 20.0;
const MAX_LATENCY_MS: f64 = 5000.0;
const MIN_AVAILABILITY: f64 = 80.0;

const CELLULAR_BONUS: f64 = 10.0;

pub struct TransportOptimizer<'a> {
    monitor: &'a dyn NetworkMonitor,
    network: NetworkType,
}

impl<'a> TransportOptimizer<'a> {
    pub fn new(monitor: &'a dyn NetworkMonitor) -> Self {
        Self {
            monitor,
            network: NetworkType::Ogx,
        }
    }

    /// Choose a transport for a payload of the given raw size.
    ///
    /// Oversized payloads fail before any health data is consulted. A caller
    /// preference short-circuits health checks entirely: the caller is taken
    /// to know something the metrics do not (e.g. a terminal out of cellular
    /// coverage), and gets its transport even if it currently looks unhealthy.
    pub async fn select_transport(
        &self,
        payload_size: usize,
        preferred: Option<TransportType>,
    ) -> Result<TransportType> {
        let limit = self.network.max_payload_bytes();
        if payload_size > limit {
            return Err(GatewayError::protocol(format!(
                "message size {payload_size} exceeds network limit of {limit} bytes"
            )));
        }

        if let Some(transport) = preferred {
            tracing::debug!(transport = %transport, "Using caller-preferred transport");
            return Ok(transport);
        }

        let metrics = self.monitor.metrics().await?;
        let now = chrono::Utc::now().timestamp();
        select_from_metrics(&metrics, now)
    }
}

/// Score a healthy transport; higher is better.
fn score(metrics: &NetworkMetrics) -> f64 {
    let mut score = 100.0 - metrics.error_rate - (metrics.latency_ms / MAX_LATENCY_MS) * 20.0
        + (metrics.availability / 100.0) * 20.0;
    if metrics.transport == TransportType::Cellular {
        score += CELLULAR_BONUS;
    }
    score
}

fn is_healthy(metrics: &NetworkMetrics, now: i64) -> bool {
    !metrics.is_stale(now)
        && metrics.error_rate <= MAX_ERROR_RATE
        && metrics.latency_ms <= MAX_LATENCY_MS
        && metrics.availability >= MIN_AVAILABILITY
}

fn select_from_metrics(metrics: &[NetworkMetrics], now: i64) -> Result<TransportType> {
    let best = metrics
        .iter()
        .filter(|m| is_healthy(m, now))
        .max_by(|a, b| {
            score(a)
                .partial_cmp(&score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    match best {
        Some(m) => {
            tracing::debug!(transport = %m.transport, score = score(m), "Selected transport");
            Ok(m.transport)
        }
        None => Err(GatewayError::protocol("no healthy transports available")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmf::types::MAX_OGX_PAYLOAD_BYTES;
    use crate::transport::monitor::METRICS_STALE_SECS;
    use async_trait::async_trait;

    struct FixedMonitor(Vec<NetworkMetrics>);

    #[async_trait]
    impl NetworkMonitor for FixedMonitor {
        async fn metrics(&self) -> crate::error::Result<Vec<NetworkMetrics>> {
            Ok(self.0.clone())
        }

        async fn record_outcome(
            &self,
            _transport: TransportType,
            _latency_ms: f64,
            _success: bool,
        ) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn healthy(transport: TransportType) -> NetworkMetrics {
        NetworkMetrics {
            transport,
            latency_ms: 1000.0,
            error_rate: 5.0,
            availability: 99.0,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn oversized_payload_fails_before_health_checks() {
        // Monitor with no data at all: the size check must fire first
        let monitor = FixedMonitor(vec![]);
        let optimizer = TransportOptimizer::new(&monitor);
        let err = optimizer
            .select_transport(MAX_OGX_PAYLOAD_BYTES + 1, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds network limit"));
    }

    #[tokio::test]
    async fn preferred_transport_bypasses_health() {
        let unhealthy = NetworkMetrics {
            error_rate: 90.0,
            ..healthy(TransportType::Satellite)
        };
        let monitor = FixedMonitor(vec![unhealthy]);
        let optimizer = TransportOptimizer::new(&monitor);
        let chosen = optimizer
            .select_transport(100, Some(TransportType::Satellite))
            .await
            .unwrap();
        assert_eq!(chosen, TransportType::Satellite);
    }

    #[tokio::test]
    async fn cellular_bonus_wins_ties() {
        let monitor = FixedMonitor(vec![
            healthy(TransportType::Satellite),
            healthy(TransportType::Cellular),
        ]);
        let optimizer = TransportOptimizer::new(&monitor);
        let chosen = optimizer.select_transport(100, None).await.unwrap();
        assert_eq!(chosen, TransportType::Cellular);
    }

    #[tokio::test]
    async fn unhealthy_transports_are_excluded() {
        let bad_cellular = NetworkMetrics {
            availability: 50.0,
            ..healthy(TransportType::Cellular)
        };
        let monitor = FixedMonitor(vec![healthy(TransportType::Satellite), bad_cellular]);
        let optimizer = TransportOptimizer::new(&monitor);
        let chosen = optimizer.select_transport(100, None).await.unwrap();
        assert_eq!(chosen, TransportType::Satellite);
    }

    #[tokio::test]
    async fn no_healthy_transports_is_an_error() {
        let monitor = FixedMonitor(vec![NetworkMetrics {
            latency_ms: 9000.0,
            ..healthy(TransportType::Satellite)
        }]);
        let optimizer = TransportOptimizer::new(&monitor);
        let err = optimizer.select_transport(100, None).await.unwrap_err();
        assert!(err.to_string().contains("no healthy transports"));
    }

    #[test]
    fn stale_metrics_are_discarded() {
        let now = chrono::Utc::now().timestamp();
        let stale = NetworkMetrics {
            timestamp: now - METRICS_STALE_SECS - 1,
            ..healthy(TransportType::Cellular)
        };
        assert!(select_from_metrics(&[stale], now).is_err());
    }

    #[test]
    fn score_formula() {
        let m = healthy(TransportType::Satellite);
        // 100 - 5 - (1000/5000)*20 + (99/100)*20 = 110.8
        assert!((score(&m) - 110.8).abs() < 1e-9);
        let c = healthy(TransportType::Cellular);
        assert!((score(&c) - 120.8).abs() < 1e-9);
    }
}

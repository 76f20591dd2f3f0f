use anyhow::Result;

use crate::cmf::types;

// ============================================================================
// Configuration Constants
// ============================================================================

// Session limits
const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 5;
const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 3600;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

// Protocol-level defaults come from the format's published limits
const DEFAULT_MAX_SUBMIT_MESSAGES: usize = types::MAX_SUBMIT_MESSAGES;
const DEFAULT_MESSAGE_RETENTION_DAYS: i64 = types::MESSAGE_RETENTION_DAYS;

// Retry policy
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_WORKER_BATCH_SIZE: usize = types::MAX_MESSAGES_PER_RESPONSE;
const DEFAULT_WORKER_IDLE_SLEEP_SECS: u64 = 5;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Session handling configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Maximum concurrent sessions per client
    pub max_concurrent_sessions: usize,
    /// Session idle timeout (seconds)
    pub session_timeout_secs: i64,
    /// Interval between expired-session sweeps (seconds)
    pub cleanup_interval_secs: u64,
}

/// Carrier API configuration
#[derive(Clone, Debug)]
pub struct CarrierConfig {
    /// Carrier API base URL (e.g., "https://ogx.example.com/api/v1")
    pub base_url: String,
    /// Client credentials for bearer-token auth
    pub client_id: String,
    pub client_secret: String,
    /// Client-side call budget per rate window
    pub calls_per_minute: u32,
    /// Sliding rate window size (seconds)
    pub window_seconds: u64,
}

/// Delivery queue and worker configuration
#[derive(Clone, Debug)]
pub struct QueueConfig {
    /// Maximum messages accepted in one submission batch
    pub max_submit_messages: usize,
    /// Days a delivered or dead-lettered message is kept before cleanup
    pub retention_days: i64,
    /// Attempts before a failed message is dead-lettered
    pub max_retries: u32,
    /// Messages pulled per worker iteration
    pub worker_batch_size: usize,
    /// Sleep when the pending queue is empty (seconds)
    pub worker_idle_sleep_secs: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub redis_url: String,
    pub session: SessionConfig,
    pub carrier: CarrierConfig,
    pub queue: QueueConfig,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            redis_url: std::env::var("REDIS_URL")?,
            session: SessionConfig {
                max_concurrent_sessions: std::env::var("MAX_CONCURRENT_SESSIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_CONCURRENT_SESSIONS),
                session_timeout_secs: std::env::var("SESSION_TIMEOUT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS),
                cleanup_interval_secs: std::env::var("CLEANUP_INTERVAL")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_CLEANUP_INTERVAL_SECS),
            },
            carrier: CarrierConfig {
                base_url: std::env::var("CARRIER_BASE_URL")?,
                client_id: std::env::var("CARRIER_CLIENT_ID")?,
                client_secret: std::env::var("CARRIER_CLIENT_SECRET")?,
                calls_per_minute: std::env::var("DEFAULT_CALLS_PER_MINUTE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(types::DEFAULT_CALLS_PER_MINUTE),
                window_seconds: std::env::var("DEFAULT_WINDOW_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(types::DEFAULT_WINDOW_SECONDS),
            },
            queue: QueueConfig {
                max_submit_messages: std::env::var("MAX_SUBMIT_MESSAGES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_SUBMIT_MESSAGES),
                retention_days: std::env::var("MESSAGE_RETENTION_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MESSAGE_RETENTION_DAYS),
                max_retries: std::env::var("MAX_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_RETRIES),
                worker_batch_size: std::env::var("WORKER_BATCH_SIZE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WORKER_BATCH_SIZE),
                worker_idle_sleep_secs: std::env::var("WORKER_IDLE_SLEEP_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_WORKER_IDLE_SLEEP_SECS),
            },
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_submit_messages: DEFAULT_MAX_SUBMIT_MESSAGES,
            retention_days: DEFAULT_MESSAGE_RETENTION_DAYS,
            max_retries: DEFAULT_MAX_RETRIES,
            worker_batch_size: DEFAULT_WORKER_BATCH_SIZE,
            worker_idle_sleep_secs: DEFAULT_WORKER_IDLE_SLEEP_SECS,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: DEFAULT_MAX_CONCURRENT_SESSIONS,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
        }
    }
}

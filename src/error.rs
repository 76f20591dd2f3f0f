use thiserror::Error;

use crate::cmf::validator::ValidationResult;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Validation outcome attached to a rejection, keeping the full issue list
/// alongside the one-line summary.
#[derive(Debug)]
pub struct ValidationFailure {
    pub summary: String,
    pub result: ValidationResult,
}

impl From<ValidationResult> for ValidationFailure {
    fn from(result: ValidationResult) -> Self {
        Self {
            summary: result.summary(),
            result,
        }
    }
}

/// Gateway error type covering every failure class the library surfaces,
/// with structured information for logging and user-facing responses.
#[derive(Error, Debug)]
pub enum GatewayError {
    // ===== Message Format Errors =====
    #[error("Validation error: {}", .0.summary)]
    Validation(ValidationFailure),

    #[error("Encoding error: {0}")]
    Encoding(String),

    // ===== Carrier API Errors =====
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_secs: u64,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    // ===== Storage & Serialization Errors =====
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ===== Configuration Errors =====
    #[error("Configuration error: {0}")]
    Config(String),

    // ===== Internal Errors =====
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Get error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) => "VALIDATION_ERROR",
            GatewayError::Encoding(_) => "ENCODING_ERROR",
            GatewayError::Auth(_) => "AUTH_ERROR",
            GatewayError::RateLimit { .. } => "RATE_LIMIT_EXCEEDED",
            GatewayError::Protocol(_) => "PROTOCOL_ERROR",
            GatewayError::Http(_) => "CARRIER_HTTP_ERROR",
            GatewayError::Redis(_) => "REDIS_ERROR",
            GatewayError::Json(_) => "JSON_ERROR",
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get a user-friendly error message (without sensitive details)
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Validation(failure) => {
                format!("Validation error: {}", failure.summary)
            }
            GatewayError::Encoding(msg) => format!("Encoding error: {}", msg),
            GatewayError::Auth(_) => "Authentication failed".to_string(),
            GatewayError::RateLimit {
                retry_after_secs, ..
            } => format!(
                "Rate limit exceeded, try again after {} seconds",
                retry_after_secs
            ),
            GatewayError::Protocol(msg) => format!("Protocol error: {}", msg),
            GatewayError::Http(_) => "Carrier service error".to_string(),
            GatewayError::Redis(_) => "Storage error".to_string(),
            GatewayError::Json(_) | GatewayError::Internal(_) => "Internal error".to_string(),
            GatewayError::Config(msg) => format!("Configuration error: {}", msg),
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self) {
        let code = self.error_code();
        match self {
            GatewayError::Validation(_) | GatewayError::Encoding(_) => {
                tracing::debug!(error = %self, error_code = %code, "Client error occurred");
            }
            GatewayError::Auth(_) | GatewayError::RateLimit { .. } => {
                tracing::warn!(error = %self, error_code = %code, "Request rejected");
            }
            _ => {
                tracing::error!(error = %self, error_code = %code, "Server error occurred");
            }
        }
    }
}

// ============================================================================
// Helper functions for creating common errors
// ============================================================================

impl GatewayError {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        GatewayError::Auth(msg.into())
    }

    /// Create an encoding error
    pub fn encoding(msg: impl Into<String>) -> Self {
        GatewayError::Encoding(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        GatewayError::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// Create a validation error from a validator result
    pub fn validation(result: ValidationResult) -> Self {
        GatewayError::Validation(result.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_user_message_names_the_wait() {
        let err = GatewayError::RateLimit {
            message: "submit_message rate exceeded".into(),
            retry_after_secs: 30,
        };
        assert_eq!(err.error_code(), "RATE_LIMIT_EXCEEDED");
        assert!(err.user_message().contains("after 30 seconds"));
    }

    #[test]
    fn internal_errors_do_not_leak() {
        let err = GatewayError::internal("redis pool exhausted at 10.0.0.3");
        assert_eq!(err.user_message(), "Internal error");
    }
}

//! Protocol enums and limits for the Common Message Format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Protocol Limits
// ============================================================================

/// OGx network payload limit in bytes (raw size, before Base64 encoding)
pub const MAX_OGX_PAYLOAD_BYTES: usize = 1023;

/// Maximum messages allowed in one submit call
pub const MAX_SUBMIT_MESSAGES: usize = 100;

/// Maximum messages returned in a single retrieval response
pub const MAX_MESSAGES_PER_RESPONSE: usize = 500;

/// Maximum message IDs allowed in one status request
pub const MAX_STATUS_IDS_PER_REQUEST: usize = 100;

/// Messages are retained for this many days after reaching a terminal queue
pub const MESSAGE_RETENTION_DAYS: i64 = 5;

/// Default web service call rate per minute
pub const DEFAULT_CALLS_PER_MINUTE: u32 = 5;

/// Default sliding window size for rate limiting, in seconds
pub const DEFAULT_WINDOW_SECONDS: u64 = 60;

/// Structured messages use service identifiers in this range
pub const MIN_SERVICE_ID: u32 = 16;
pub const MAX_SERVICE_ID: u32 = 255;

/// Structured messages use message identifiers in this range
pub const MIN_MESSAGE_ID: u32 = 1;
pub const MAX_MESSAGE_ID: u32 = 255;

// ============================================================================
// Carrier Error Codes
// ============================================================================

/// Gateway error codes returned in the carrier's `ErrorID` response field.
///
/// An `ErrorID` of 0 means success; the rate-exceeded codes arrive with an
/// HTTP 429/503 and a retry-after value.
pub mod gateway_error_code {
    pub const SUCCESS: u32 = 0;
    pub const SUBMIT_MESSAGE_RATE_EXCEEDED: u32 = 24579;
    pub const RETRIEVE_STATUS_RATE_EXCEEDED: u32 = 24581;
    pub const INVALID_MESSAGE_FORMAT: u32 = 24582;
    pub const TOKEN_EXPIRED: u32 = 24583;
    pub const TOKEN_INVALID: u32 = 24584;
    pub const TOKEN_REVOKED: u32 = 24585;
}

// ============================================================================
// Field Types
// ============================================================================

/// Field types from the Common Message Format type table.
///
/// `Dynamic` and `Property` are not value types themselves: they carry a
/// `TypeAttribute` naming one of the basic types, and their value is
/// validated against that resolved type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Enum,
    Boolean,
    #[serde(rename = "unsignedint")]
    UnsignedInt,
    #[serde(rename = "signedint")]
    SignedInt,
    String,
    Data,
    /// Can only use Elements, not Value
    Array,
    /// Can only use a nested Message, not Value
    Message,
    Dynamic,
    Property,
}

impl FieldType {
    /// True for types whose payload is a scalar `Value`
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            FieldType::Array | FieldType::Message | FieldType::Dynamic | FieldType::Property
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Enum => "enum",
            FieldType::Boolean => "boolean",
            FieldType::UnsignedInt => "unsignedint",
            FieldType::SignedInt => "signedint",
            FieldType::String => "string",
            FieldType::Data => "data",
            FieldType::Array => "array",
            FieldType::Message => "message",
            FieldType::Dynamic => "dynamic",
            FieldType::Property => "property",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enum" => Ok(FieldType::Enum),
            "boolean" => Ok(FieldType::Boolean),
            "unsignedint" => Ok(FieldType::UnsignedInt),
            "signedint" => Ok(FieldType::SignedInt),
            "string" => Ok(FieldType::String),
            "data" => Ok(FieldType::Data),
            "array" => Ok(FieldType::Array),
            "message" => Ok(FieldType::Message),
            "dynamic" => Ok(FieldType::Dynamic),
            "property" => Ok(FieldType::Property),
            _ => Err(()),
        }
    }
}

// ============================================================================
// Message Direction / Network
// ============================================================================

/// Message flow direction between gateway and terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageDirection {
    /// Sent from gateway to terminal (to-mobile)
    Forward,
    /// Received from terminal (from-mobile)
    Return,
}

/// Network type. Only the OGx network is in scope; the enum exists so size
/// validation stays keyed on the network rather than a bare constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NetworkType {
    Ogx,
}

impl NetworkType {
    /// Fixed raw-payload ceiling for the network
    pub fn max_payload_bytes(&self) -> usize {
        match self {
            NetworkType::Ogx => MAX_OGX_PAYLOAD_BYTES,
        }
    }
}

// ============================================================================
// Transport Types
// ============================================================================

/// Physical delivery path chosen per message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportType {
    Satellite,
    Cellular,
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Satellite => f.write_str("SATELLITE"),
            TransportType::Cellular => f.write_str("CELLULAR"),
        }
    }
}

// ============================================================================
// Message Lifecycle States
// ============================================================================

/// Message lifecycle states surfaced to callers, with the carrier's numeric
/// state codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    /// Accepted by the gateway
    Accepted = 0,
    /// Acknowledged by the destination terminal
    Received = 1,
    /// Submission error (check error code)
    Error = 2,
    /// Failed to be delivered
    DeliveryFailed = 3,
    /// Timed out by the gateway
    TimedOut = 4,
    /// Cancelled by the caller
    Cancelled = 5,
    /// Queued for delayed send (IDP only)
    Waiting = 6,
    /// Broadcast message transmitted
    BroadcastSubmitted = 7,
    /// Transmission in progress (OGx only)
    SendingInProgress = 8,
}

impl MessageState {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MessageState::Accepted),
            1 => Some(MessageState::Received),
            2 => Some(MessageState::Error),
            3 => Some(MessageState::DeliveryFailed),
            4 => Some(MessageState::TimedOut),
            5 => Some(MessageState::Cancelled),
            6 => Some(MessageState::Waiting),
            7 => Some(MessageState::BroadcastSubmitted),
            8 => Some(MessageState::SendingInProgress),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MessageState::Received
                | MessageState::Error
                | MessageState::DeliveryFailed
                | MessageState::TimedOut
                | MessageState::Cancelled
                | MessageState::BroadcastSubmitted
        )
    }
}

//! Common Message Format: typed model, structural validation and the JSON
//! wire codec.

pub mod codec;
pub mod message;
pub mod types;
pub mod validator;

pub use codec::JsonCodec;
pub use message::{Element, Field, FieldPayload, FieldValue, Message};
pub use types::{FieldType, MessageDirection, MessageState, NetworkType, TransportType};
pub use validator::{MessageValidator, ValidationContext, ValidationResult};

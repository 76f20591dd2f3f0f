//! Typed Common Message Format model.
//!
//! The wire format keeps every scalar value as a string; this model keeps
//! values typed and leaves stringification to the codec.

use serde::{Deserialize, Serialize};

use crate::cmf::types::{FieldType, MessageDirection};

/// A scalar field value after decoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    /// string, enum and data (base64 text) values
    Text(String),
}

impl FieldValue {
    /// String form used on the wire
    pub fn to_wire_string(&self) -> String {
        match self {
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Unsigned(n) => n.to_string(),
            FieldValue::Signed(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// Exactly one payload shape per field. The validator enforces which shape
/// each field type may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldPayload {
    Value(FieldValue),
    Elements(Vec<Element>),
    Message(Box<Message>),
}

/// One entry of an array field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub index: usize,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Resolved basic type for dynamic/property fields
    pub type_attribute: Option<FieldType>,
    pub payload: FieldPayload,
}

impl Field {
    pub fn scalar(name: impl Into<String>, field_type: FieldType, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            field_type,
            type_attribute: None,
            payload: FieldPayload::Value(value),
        }
    }

    pub fn array(name: impl Into<String>, elements: Vec<Element>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Array,
            type_attribute: None,
            payload: FieldPayload::Elements(elements),
        }
    }

    pub fn nested(name: impl Into<String>, message: Message) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Message,
            type_attribute: None,
            payload: FieldPayload::Message(Box::new(message)),
        }
    }

    /// The type the value is checked against: the declared type for basic
    /// fields, the `TypeAttribute` for dynamic/property fields.
    pub fn effective_type(&self) -> Option<FieldType> {
        match self.field_type {
            FieldType::Dynamic | FieldType::Property => self.type_attribute,
            other => Some(other),
        }
    }
}

/// A structured message: service identifier (SIN), message identifier (MIN)
/// and an ordered field list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub sin: u32,
    pub min: u32,
    pub direction: MessageDirection,
    pub fields: Vec<Field>,
}

impl Message {
    pub fn new(
        name: impl Into<String>,
        sin: u32,
        min: u32,
        direction: MessageDirection,
        fields: Vec<Field>,
    ) -> Self {
        Self {
            name: name.into(),
            sin,
            min,
            direction,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_type_resolves_type_attribute() {
        let mut field = Field::scalar("speed", FieldType::Dynamic, FieldValue::Unsigned(88));
        field.type_attribute = Some(FieldType::UnsignedInt);
        assert_eq!(field.effective_type(), Some(FieldType::UnsignedInt));

        let plain = Field::scalar("label", FieldType::String, FieldValue::Text("hi".into()));
        assert_eq!(plain.effective_type(), Some(FieldType::String));
    }

    #[test]
    fn wire_strings() {
        assert_eq!(FieldValue::Bool(true).to_wire_string(), "true");
        assert_eq!(FieldValue::Signed(-42).to_wire_string(), "-42");
        assert_eq!(FieldValue::Unsigned(7).to_wire_string(), "7");
        assert_eq!(FieldValue::Text("abc".into()).to_wire_string(), "abc");
    }
}

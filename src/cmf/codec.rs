//! Canonical JSON encode/decode for the Common Message Format.
//!
//! The wire dialect uses capitalised keys and carries every scalar value as a
//! string; the numeric/boolean typing lives in the `Type` (or resolved
//! `TypeAttribute`) key. Decoding therefore validates first and only then
//! coerces values back to their typed form — a decode never yields a
//! partially-populated message.

use serde_json::{json, Map, Value};

use crate::cmf::message::{Element, Field, FieldPayload, FieldValue, Message};
use crate::cmf::types::FieldType;
use crate::cmf::validator::{MessageValidator, ValidationContext};
use crate::error::{GatewayError, Result};

pub struct JsonCodec;

impl JsonCodec {
    /// Encode a message to wire bytes, validating the produced document.
    pub fn encode(message: &Message) -> Result<Vec<u8>> {
        let wire = Self::message_to_wire(message);
        let ctx = ValidationContext {
            direction: message.direction,
            network: crate::cmf::types::NetworkType::Ogx,
        };
        let result = MessageValidator::validate(&wire, &ctx);
        if !result.is_valid {
            return Err(GatewayError::validation(result));
        }
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Encode without validation. For re-serialising documents that already
    /// passed validation on the way in.
    pub fn encode_unchecked(message: &Message) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&Self::message_to_wire(message))?)
    }

    /// Decode wire bytes into a typed message, validating first.
    pub fn decode(bytes: &[u8], ctx: &ValidationContext) -> Result<Message> {
        let wire: Value = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::encoding(format!("invalid JSON: {e}")))?;

        let result = MessageValidator::validate(&wire, ctx);
        if !result.is_valid {
            return Err(GatewayError::encoding(format!(
                "message failed validation: {}",
                result.summary()
            )));
        }

        Self::wire_to_message(&wire, ctx)
    }

    // ------------------------------------------------------------------
    // Typed model -> wire
    // ------------------------------------------------------------------

    fn message_to_wire(message: &Message) -> Value {
        let fields: Vec<Value> = message.fields.iter().map(Self::field_to_wire).collect();
        json!({
            "Name": message.name,
            "SIN": message.sin,
            "MIN": message.min,
            "Fields": fields,
        })
    }

    fn field_to_wire(field: &Field) -> Value {
        let mut obj = Map::new();
        obj.insert("Name".into(), Value::String(field.name.clone()));
        obj.insert(
            "Type".into(),
            Value::String(field.field_type.as_str().to_string()),
        );
        if let Some(attr) = field.type_attribute {
            obj.insert(
                "TypeAttribute".into(),
                Value::String(attr.as_str().to_string()),
            );
        }
        match &field.payload {
            FieldPayload::Value(value) => {
                obj.insert("Value".into(), Value::String(value.to_wire_string()));
            }
            FieldPayload::Elements(elements) => {
                let wire: Vec<Value> = elements
                    .iter()
                    .map(|e| {
                        json!({
                            "Index": e.index,
                            "Fields": e.fields.iter().map(Self::field_to_wire).collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                obj.insert("Elements".into(), Value::Array(wire));
            }
            FieldPayload::Message(nested) => {
                obj.insert("Message".into(), Self::message_to_wire(nested));
            }
        }
        Value::Object(obj)
    }

    // ------------------------------------------------------------------
    // Wire -> typed model (input already validated)
    // ------------------------------------------------------------------

    fn wire_to_message(wire: &Value, ctx: &ValidationContext) -> Result<Message> {
        let obj = wire
            .as_object()
            .ok_or_else(|| GatewayError::encoding("message is not an object"))?;
        let name = obj
            .get("Name")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::encoding("message missing 'Name'"))?;
        let sin = wire_uint(obj.get("SIN"))
            .ok_or_else(|| GatewayError::encoding("message missing 'SIN'"))?;
        let min = wire_uint(obj.get("MIN"))
            .ok_or_else(|| GatewayError::encoding("message missing 'MIN'"))?;
        let fields = obj
            .get("Fields")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::encoding("message missing 'Fields'"))?
            .iter()
            .map(|f| Self::wire_to_field(f, ctx))
            .collect::<Result<Vec<_>>>()?;

        Ok(Message {
            name: name.to_string(),
            sin: sin as u32,
            min: min as u32,
            direction: ctx.direction,
            fields,
        })
    }

    fn wire_to_field(wire: &Value, ctx: &ValidationContext) -> Result<Field> {
        let obj = wire
            .as_object()
            .ok_or_else(|| GatewayError::encoding("field is not an object"))?;
        let name = obj
            .get("Name")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::encoding("field missing 'Name'"))?;
        let field_type = obj
            .get("Type")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<FieldType>().ok())
            .ok_or_else(|| GatewayError::encoding("field missing 'Type'"))?;
        let type_attribute = obj
            .get("TypeAttribute")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<FieldType>().ok());

        let effective = match field_type {
            FieldType::Dynamic | FieldType::Property => type_attribute
                .ok_or_else(|| GatewayError::encoding("dynamic field missing 'TypeAttribute'"))?,
            other => other,
        };

        let payload = match effective {
            FieldType::Array => {
                // Absent 'Elements' decodes as an empty array
                let elements = match obj.get("Elements").and_then(Value::as_array) {
                    Some(raw) => raw
                        .iter()
                        .map(|e| Self::wire_to_element(e, ctx))
                        .collect::<Result<Vec<_>>>()?,
                    None => Vec::new(),
                };
                FieldPayload::Elements(elements)
            }
            FieldType::Message => {
                let nested = obj
                    .get("Message")
                    .ok_or_else(|| GatewayError::encoding("message field missing 'Message'"))?;
                FieldPayload::Message(Box::new(Self::wire_to_message(nested, ctx)?))
            }
            basic => {
                let raw = obj
                    .get("Value")
                    .ok_or_else(|| GatewayError::encoding("field missing 'Value'"))?;
                FieldPayload::Value(Self::coerce_scalar(raw, basic)?)
            }
        };

        Ok(Field {
            name: name.to_string(),
            field_type,
            type_attribute,
            payload,
        })
    }

    fn wire_to_element(wire: &Value, ctx: &ValidationContext) -> Result<Element> {
        let obj = wire
            .as_object()
            .ok_or_else(|| GatewayError::encoding("element is not an object"))?;
        let index = wire_uint(obj.get("Index"))
            .ok_or_else(|| GatewayError::encoding("element missing 'Index'"))?;
        let fields = obj
            .get("Fields")
            .and_then(Value::as_array)
            .ok_or_else(|| GatewayError::encoding("element missing 'Fields'"))?
            .iter()
            .map(|f| Self::wire_to_field(f, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Element {
            index: index as usize,
            fields,
        })
    }

    fn coerce_scalar(raw: &Value, field_type: FieldType) -> Result<FieldValue> {
        match field_type {
            FieldType::Boolean => {
                let b = match raw {
                    Value::Bool(b) => *b,
                    Value::String(s) => {
                        matches!(s.to_ascii_lowercase().as_str(), "true" | "1")
                    }
                    _ => return Err(GatewayError::encoding("boolean value has wrong shape")),
                };
                Ok(FieldValue::Bool(b))
            }
            FieldType::UnsignedInt => wire_uint(Some(raw))
                .map(FieldValue::Unsigned)
                .ok_or_else(|| GatewayError::encoding("unsigned value has wrong shape")),
            FieldType::SignedInt => wire_int(Some(raw))
                .map(FieldValue::Signed)
                .ok_or_else(|| GatewayError::encoding("signed value has wrong shape")),
            FieldType::Enum | FieldType::String | FieldType::Data => raw
                .as_str()
                .map(|s| FieldValue::Text(s.to_string()))
                .ok_or_else(|| GatewayError::encoding("text value has wrong shape")),
            other => Err(GatewayError::encoding(format!(
                "{other} is not a scalar type"
            ))),
        }
    }
}

fn wire_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

fn wire_uint(value: Option<&Value>) -> Option<u64> {
    wire_int(value).and_then(|n| u64::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmf::message::{Element, Field, FieldValue, Message};
    use crate::cmf::types::MessageDirection;
    use serde_json::Value;

    fn sample_message() -> Message {
        Message::new(
            "position_report",
            16,
            1,
            MessageDirection::Forward,
            vec![
                Field::scalar("latitude", FieldType::SignedInt, FieldValue::Signed(-451234)),
                Field::scalar("moving", FieldType::Boolean, FieldValue::Bool(true)),
                Field::scalar(
                    "payload",
                    FieldType::Data,
                    FieldValue::Text("aGVsbG8=".into()),
                ),
            ],
        )
    }

    #[test]
    fn scalars_serialise_as_strings() {
        let bytes = JsonCodec::encode(&sample_message()).unwrap();
        let wire: Value = serde_json::from_slice(&bytes).unwrap();
        let fields = wire["Fields"].as_array().unwrap();
        for field in fields {
            assert!(
                field["Value"].is_string(),
                "expected string Value, got {field}"
            );
        }
        assert_eq!(fields[0]["Value"], "-451234");
        assert_eq!(fields[1]["Value"], "true");
    }

    #[test]
    fn encode_decode_round_trips() {
        let original = sample_message();
        let bytes = JsonCodec::encode(&original).unwrap();
        let decoded = JsonCodec::decode(&bytes, &ValidationContext::forward()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_rejects_invalid_documents() {
        let wire = serde_json::json!({
            "Name": "m", "SIN": 16, "MIN": 1,
            "Fields": [{"Name": "f", "Type": "boolean", "Value": "maybe"}]
        });
        let bytes = serde_json::to_vec(&wire).unwrap();
        let err = JsonCodec::decode(&bytes, &ValidationContext::forward()).unwrap_err();
        assert!(matches!(err, GatewayError::Encoding(_)));
    }

    #[test]
    fn decode_rejects_non_json() {
        let err = JsonCodec::decode(b"not json", &ValidationContext::forward()).unwrap_err();
        assert!(matches!(err, GatewayError::Encoding(_)));
    }

    #[test]
    fn dynamic_field_coerces_via_type_attribute() {
        let wire = serde_json::json!({
            "Name": "m", "SIN": 16, "MIN": 1,
            "Fields": [{
                "Name": "speed", "Type": "dynamic",
                "TypeAttribute": "unsignedint", "Value": "88"
            }]
        });
        let bytes = serde_json::to_vec(&wire).unwrap();
        let message = JsonCodec::decode(&bytes, &ValidationContext::forward()).unwrap();
        assert_eq!(
            message.fields[0].payload,
            FieldPayload::Value(FieldValue::Unsigned(88))
        );
        assert_eq!(message.fields[0].field_type, FieldType::Dynamic);
    }

    #[test]
    fn array_without_elements_decodes_empty() {
        let wire = serde_json::json!({
            "Name": "m", "SIN": 16, "MIN": 1,
            "Fields": [{"Name": "readings", "Type": "array"}]
        });
        let bytes = serde_json::to_vec(&wire).unwrap();
        let message = JsonCodec::decode(&bytes, &ValidationContext::forward()).unwrap();
        assert_eq!(message.fields[0].payload, FieldPayload::Elements(vec![]));
    }

    #[test]
    fn nested_structures_round_trip() {
        let inner = Message::new(
            "inner",
            20,
            2,
            MessageDirection::Forward,
            vec![Field::scalar(
                "code",
                FieldType::Enum,
                FieldValue::Text("OK".into()),
            )],
        );
        let original = Message::new(
            "outer",
            16,
            1,
            MessageDirection::Forward,
            vec![
                Field::nested("detail", inner),
                Field::array(
                    "readings",
                    vec![
                        Element {
                            index: 0,
                            fields: vec![Field::scalar(
                                "v",
                                FieldType::UnsignedInt,
                                FieldValue::Unsigned(1),
                            )],
                        },
                        Element {
                            index: 1,
                            fields: vec![Field::scalar(
                                "v",
                                FieldType::UnsignedInt,
                                FieldValue::Unsigned(2),
                            )],
                        },
                    ],
                ),
            ],
        );
        let bytes = JsonCodec::encode(&original).unwrap();
        let decoded = JsonCodec::decode(&bytes, &ValidationContext::forward()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn return_context_sets_direction() {
        let bytes = JsonCodec::encode_unchecked(&sample_message()).unwrap();
        let decoded = JsonCodec::decode(&bytes, &ValidationContext::returned()).unwrap();
        assert_eq!(decoded.direction, MessageDirection::Return);
    }
}

//! Structural validator for Common Message Format JSON.
//!
//! Validation runs over raw `serde_json::Value` trees so malformed input can
//! be reported in full instead of failing at the first deserialization error.
//! Errors are collected level-complete: every problem at the current nesting
//! level is recorded before any child node is visited.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::cmf::types::{
    FieldType, MessageDirection, NetworkType, MAX_MESSAGE_ID, MAX_SERVICE_ID, MIN_MESSAGE_ID,
    MIN_SERVICE_ID,
};

/// Context the validator needs beyond the JSON itself
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub direction: MessageDirection,
    pub network: NetworkType,
}

impl ValidationContext {
    pub fn forward() -> Self {
        Self {
            direction: MessageDirection::Forward,
            network: NetworkType::Ogx,
        }
    }

    pub fn returned() -> Self {
        Self {
            direction: MessageDirection::Return,
            network: NetworkType::Ogx,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingField,
    InvalidFieldType,
    InvalidFieldValue,
    InvalidFieldFormat,
    DuplicateFieldName,
    InvalidElementFormat,
    InvalidMessageFormat,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationErrorKind::MissingField => "missing_field",
            ValidationErrorKind::InvalidFieldType => "invalid_field_type",
            ValidationErrorKind::InvalidFieldValue => "invalid_field_value",
            ValidationErrorKind::InvalidFieldFormat => "invalid_field_format",
            ValidationErrorKind::DuplicateFieldName => "duplicate_field_name",
            ValidationErrorKind::InvalidElementFormat => "invalid_element_format",
            ValidationErrorKind::InvalidMessageFormat => "invalid_message_format",
        };
        f.write_str(s)
    }
}

/// One validation problem with enough context to locate it
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub kind: ValidationErrorKind,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationIssue>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Single-line summary for logs and error payloads
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct MessageValidator;

impl MessageValidator {
    /// Validate a full message document against the format rules.
    ///
    /// Never short-circuits within a nesting level, so one call reports every
    /// problem a caller can fix at once.
    pub fn validate(value: &Value, _ctx: &ValidationContext) -> ValidationResult {
        let mut errors = Vec::new();
        Self::validate_message(value, "message", &mut errors);
        ValidationResult::from_errors(errors)
    }

    fn validate_message(value: &Value, path: &str, errors: &mut Vec<ValidationIssue>) {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidMessageFormat,
                    message: format!("{path}: message must be a JSON object"),
                });
                return;
            }
        };

        // Level 1: presence of every required key
        for key in ["Name", "SIN", "MIN", "Fields"] {
            if !obj.contains_key(key) {
                errors.push(ValidationIssue {
                    kind: ValidationErrorKind::MissingField,
                    message: format!("{path}: missing required key '{key}'"),
                });
            }
        }

        // Level 2: shape of the keys that are present
        if let Some(name) = obj.get("Name") {
            match name.as_str() {
                Some(s) if !s.is_empty() => {}
                _ => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidMessageFormat,
                    message: format!("{path}: 'Name' must be a non-empty string"),
                }),
            }
        }
        if let Some(sin) = obj.get("SIN") {
            match parse_wire_uint(sin) {
                Some(n) if (u64::from(MIN_SERVICE_ID)..=u64::from(MAX_SERVICE_ID)).contains(&n) => {
                }
                _ => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidMessageFormat,
                    message: format!(
                        "{path}: 'SIN' must be an integer between {MIN_SERVICE_ID} and {MAX_SERVICE_ID}"
                    ),
                }),
            }
        }
        if let Some(min) = obj.get("MIN") {
            match parse_wire_uint(min) {
                Some(n) if (u64::from(MIN_MESSAGE_ID)..=u64::from(MAX_MESSAGE_ID)).contains(&n) => {
                }
                _ => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidMessageFormat,
                    message: format!(
                        "{path}: 'MIN' must be an integer between {MIN_MESSAGE_ID} and {MAX_MESSAGE_ID}"
                    ),
                }),
            }
        }

        let fields = match obj.get("Fields") {
            Some(Value::Array(fields)) => fields,
            Some(_) => {
                errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidMessageFormat,
                    message: format!("{path}: 'Fields' must be an array"),
                });
                return;
            }
            None => return,
        };

        // Duplicate names are a message-level error, reported before any
        // per-field recursion
        let mut seen = HashSet::new();
        for field in fields {
            if let Some(name) = field.get("Name").and_then(Value::as_str) {
                if !seen.insert(name.to_string()) {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::DuplicateFieldName,
                        message: format!("{path}: duplicate field name '{name}'"),
                    });
                }
            }
        }

        for (i, field) in fields.iter().enumerate() {
            let field_path = match field.get("Name").and_then(Value::as_str) {
                Some(name) => format!("{path}.{name}"),
                None => format!("{path}.Fields[{i}]"),
            };
            Self::validate_field(field, &field_path, errors);
        }
    }

    fn validate_field(value: &Value, path: &str, errors: &mut Vec<ValidationIssue>) {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidFieldFormat,
                    message: format!("{path}: field must be a JSON object"),
                });
                return;
            }
        };

        match obj.get("Name").and_then(Value::as_str) {
            Some(s) if !s.is_empty() => {}
            _ => errors.push(ValidationIssue {
                kind: ValidationErrorKind::MissingField,
                message: format!("{path}: field requires a non-empty 'Name'"),
            }),
        }

        let declared = match obj.get("Type") {
            Some(Value::String(s)) => match s.parse::<FieldType>() {
                Ok(ft) => ft,
                Err(()) => {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldType,
                        message: format!("{path}: unknown field type '{s}'"),
                    });
                    return;
                }
            },
            _ => {
                errors.push(ValidationIssue {
                    kind: ValidationErrorKind::MissingField,
                    message: format!("{path}: field requires a 'Type' string"),
                });
                return;
            }
        };

        // Dynamic/property fields are re-dispatched through their resolved
        // basic type; everything else validates against the declared type
        let effective = match declared {
            FieldType::Dynamic | FieldType::Property => {
                match obj.get("TypeAttribute").and_then(Value::as_str) {
                    Some(attr) => match attr.parse::<FieldType>() {
                        Ok(ft) if ft.is_basic() => ft,
                        _ => {
                            errors.push(ValidationIssue {
                                kind: ValidationErrorKind::InvalidFieldType,
                                message: format!(
                                    "{path}: 'TypeAttribute' must name a basic type, got '{attr}'"
                                ),
                            });
                            return;
                        }
                    },
                    None => {
                        errors.push(ValidationIssue {
                            kind: ValidationErrorKind::MissingField,
                            message: format!(
                                "{path}: {declared} field requires a 'TypeAttribute'"
                            ),
                        });
                        return;
                    }
                }
            }
            other => other,
        };

        match effective {
            FieldType::Array => {
                if obj.contains_key("Value") {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldFormat,
                        message: format!("{path}: array fields use 'Elements', not 'Value'"),
                    });
                }
                // Absent 'Elements' is an empty array
                match obj.get("Elements") {
                    Some(Value::Array(elements)) => {
                        Self::validate_elements(elements, path, errors);
                    }
                    Some(_) => errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidElementFormat,
                        message: format!("{path}: 'Elements' must be an array"),
                    }),
                    None => {}
                }
            }
            FieldType::Message => {
                if obj.contains_key("Value") {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldFormat,
                        message: format!("{path}: message fields use 'Message', not 'Value'"),
                    });
                }
                match obj.get("Message") {
                    Some(nested) => {
                        Self::validate_message(nested, &format!("{path}.Message"), errors)
                    }
                    None => errors.push(ValidationIssue {
                        kind: ValidationErrorKind::MissingField,
                        message: format!("{path}: message field requires 'Message'"),
                    }),
                }
            }
            basic => match obj.get("Value") {
                Some(value) => Self::validate_scalar(value, basic, path, errors),
                None => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::MissingField,
                    message: format!("{path}: {basic} field requires 'Value'"),
                }),
            },
        }
    }

    fn validate_elements(elements: &[Value], path: &str, errors: &mut Vec<ValidationIssue>) {
        // Indices must run 0, 1, 2, ... with no gaps or repeats; only the
        // first break in the sequence is reported
        let mut sequence_reported = false;
        for (pos, element) in elements.iter().enumerate() {
            let element_path = format!("{path}.Elements[{pos}]");
            let obj = match element.as_object() {
                Some(obj) => obj,
                None => {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidElementFormat,
                        message: format!("{element_path}: element must be a JSON object"),
                    });
                    continue;
                }
            };

            match obj.get("Index").and_then(parse_wire_uint) {
                Some(index) => {
                    if !sequence_reported && index != pos as u64 {
                        errors.push(ValidationIssue {
                            kind: ValidationErrorKind::InvalidElementFormat,
                            message: format!(
                                "{element_path}: expected index {pos}, got {index}"
                            ),
                        });
                        sequence_reported = true;
                    }
                }
                None => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::MissingField,
                    message: format!("{element_path}: element requires an integer 'Index'"),
                }),
            }

            match obj.get("Fields") {
                Some(Value::Array(fields)) => {
                    let mut seen = HashSet::new();
                    for field in fields {
                        if let Some(name) = field.get("Name").and_then(Value::as_str) {
                            if !seen.insert(name.to_string()) {
                                errors.push(ValidationIssue {
                                    kind: ValidationErrorKind::DuplicateFieldName,
                                    message: format!(
                                        "{element_path}: duplicate field name '{name}'"
                                    ),
                                });
                            }
                        }
                    }
                    for (i, field) in fields.iter().enumerate() {
                        let field_path = match field.get("Name").and_then(Value::as_str) {
                            Some(name) => format!("{element_path}.{name}"),
                            None => format!("{element_path}.Fields[{i}]"),
                        };
                        Self::validate_field(field, &field_path, errors);
                    }
                }
                _ => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::MissingField,
                    message: format!("{element_path}: element requires a 'Fields' array"),
                }),
            }
        }
    }

    fn validate_scalar(
        value: &Value,
        field_type: FieldType,
        path: &str,
        errors: &mut Vec<ValidationIssue>,
    ) {
        match field_type {
            FieldType::Boolean => {
                let ok = match value {
                    Value::Bool(_) => true,
                    Value::String(s) => {
                        matches!(s.to_ascii_lowercase().as_str(), "true" | "false" | "1" | "0")
                    }
                    _ => false,
                };
                if !ok {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldValue,
                        message: format!(
                            "{path}: boolean value must be true/false/1/0, got {value}"
                        ),
                    });
                }
            }
            FieldType::UnsignedInt => {
                match parse_wire_int(value) {
                    Some(n) if n >= 0 => {}
                    _ => errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldValue,
                        message: format!("{path}: value must be a non-negative integer"),
                    }),
                }
            }
            FieldType::SignedInt => {
                if parse_wire_int(value).is_none() {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldValue,
                        message: format!("{path}: value must be an integer"),
                    });
                }
            }
            FieldType::Enum => match value.as_str() {
                Some(s) if !s.is_empty() => {}
                _ => errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidFieldValue,
                    message: format!("{path}: enum value must be a non-empty string"),
                }),
            },
            FieldType::String => {
                if !value.is_string() {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldValue,
                        message: format!("{path}: string value must be a JSON string"),
                    });
                }
            }
            FieldType::Data => {
                // Base64 must round-trip exactly, rejecting malformed input
                // and non-canonical padding alike
                let ok = value
                    .as_str()
                    .and_then(|s| BASE64.decode(s).ok().map(|raw| BASE64.encode(raw) == s))
                    .unwrap_or(false);
                if !ok {
                    errors.push(ValidationIssue {
                        kind: ValidationErrorKind::InvalidFieldValue,
                        message: format!("{path}: data value must be canonical base64"),
                    });
                }
            }
            // Callers resolve dynamic/property before dispatching here and
            // containers never reach scalar validation
            FieldType::Array | FieldType::Message | FieldType::Dynamic | FieldType::Property => {
                errors.push(ValidationIssue {
                    kind: ValidationErrorKind::InvalidFieldType,
                    message: format!("{path}: {field_type} cannot carry a scalar value"),
                });
            }
        }
    }
}

/// Integer parsing matching the wire convention: numbers may arrive as JSON
/// numbers or as strings, and fractional strings truncate toward zero.
fn parse_wire_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        _ => None,
    }
}

fn parse_wire_uint(value: &Value) -> Option<u64> {
    parse_wire_int(value).and_then(|n| u64::try_from(n).ok())
}

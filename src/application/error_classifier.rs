//! Classifies raw sink errors into a structured reason
//!
//! The sink reports failures as loosely-shaped payloads (a JSON body for
//! validation errors, plain text otherwise). [`classify`] inspects them once
//! and produces a tagged result the orchestrator records uniformly. It never
//! fails itself.

use serde_json::Value;

use crate::domain::services::SinkError;

/// Error code the destination uses for writes against undefined fields
const MISSING_FIELD_CODE: &str = "PROPERTY_DOESNT_EXIST";
/// Substring marking a duplicate-key rejection
const DUPLICATE_KEY_MARKER: &str = "already has that value";
/// Substring marking a null-where-number-expected rejection
const INVALID_NUMBER_MARKER: &str = "null was not a valid number";

/// Broad category derived from a sink error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCategory {
    /// Destination fields referenced by the write do not exist
    MissingFields,
    /// The unique key (SKU) is already in use downstream
    DuplicateKey,
    /// A null value was sent where the destination expects a number
    InvalidNumber { field: Option<String> },
    /// Anything else (transient I/O, unrecognized validation shapes)
    Other,
}

/// Structured classification of one sink error
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    /// Composed human-readable message; supersets the raw message
    pub message: String,
    /// Offending destination field names, when the error names any
    pub missing_fields: Vec<String>,
    pub category: FailureCategory,
}

/// Derive a structured reason from a raw sink error.
pub fn classify(error: &SinkError) -> ClassifiedError {
    let (raw_message, body) = match error {
        SinkError::Validation { body } => (body.to_string(), Some(body)),
        SinkError::Api { message, .. } => (message.clone(), None),
        SinkError::Io(message) => (message.clone(), None),
    };

    let missing_fields = body.map(extract_missing_fields).unwrap_or_default();
    if !missing_fields.is_empty() {
        return ClassifiedError {
            message: format!("Missing fields: {}. {raw_message}", missing_fields.join(", ")),
            missing_fields,
            category: FailureCategory::MissingFields,
        };
    }

    if raw_message.contains(DUPLICATE_KEY_MARKER) {
        return ClassifiedError {
            message: format!("SKU already in use. {raw_message}"),
            missing_fields: Vec::new(),
            category: FailureCategory::DuplicateKey,
        };
    }

    if raw_message.contains(INVALID_NUMBER_MARKER) {
        let field = body.and_then(first_named_field);
        let message = match &field {
            Some(name) => format!("Invalid value: null was not a valid number for {name}."),
            None => "Invalid value: null was not a valid number.".to_string(),
        };
        return ClassifiedError {
            message,
            missing_fields: Vec::new(),
            category: FailureCategory::InvalidNumber { field },
        };
    }

    ClassifiedError {
        message: raw_message,
        missing_fields: Vec::new(),
        category: FailureCategory::Other,
    }
}

/// Collect field names from `errors[].context.propertyName` entries whose
/// code marks a nonexistent destination field.
fn extract_missing_fields(body: &Value) -> Vec<String> {
    let mut fields = Vec::new();
    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        for entry in errors {
            if entry.get("code").and_then(Value::as_str) != Some(MISSING_FIELD_CODE) {
                continue;
            }
            if let Some(names) = entry
                .get("context")
                .and_then(|c| c.get("propertyName"))
                .and_then(Value::as_array)
            {
                fields.extend(
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string),
                );
            }
        }
    }
    fields
}

/// First field named by `errors[0].context.propertyName[0]`, if any
fn first_named_field(body: &Value) -> Option<String> {
    body.get("errors")?
        .get(0)?
        .get("context")?
        .get("propertyName")?
        .get(0)?
        .as_str()
        .map(str::to_string)
}

//! Input validation for record bodies

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Maximum field key length
const MAX_KEY_LENGTH: usize = 256;

/// Maximum serialized size of a single field value (16KB)
const MAX_VALUE_SIZE: usize = 16 * 1024;

/// Maximum number of fields on one record
const MAX_FIELDS: usize = 64;

/// Keys owned by the server; ignored on input
pub const RESERVED_KEYS: &[&str] = &["id", "createdAt", "updatedAt"];

/// Input validator
pub struct InputValidator;

impl InputValidator {
    /// Validate a record body and return its client-owned fields.
    ///
    /// `required` names a field that must be a non-empty string.
    pub fn validate_record(body: &Value, required: &str) -> Result<Map<String, Value>, ValidationError> {
        let Some(object) = body.as_object() else {
            warn!("Validation failed: record body is not an object");
            return Err(ValidationError::NotAnObject);
        };

        let fields: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        if fields.len() > MAX_FIELDS {
            warn!("Validation failed: too many fields ({} > {})", fields.len(), MAX_FIELDS);
            return Err(ValidationError::TooManyFields {
                count: fields.len(),
                max: MAX_FIELDS,
            });
        }

        for (key, value) in &fields {
            Self::validate_field_key(key)?;
            Self::validate_field_value(value)?;
        }

        match fields.get(required) {
            Some(Value::String(s)) if !s.trim().is_empty() => {}
            _ => {
                warn!("Validation failed: missing required field {}", required);
                return Err(ValidationError::MissingField(required.to_string()));
            }
        }

        debug!("Record validation passed");
        Ok(fields)
    }

    /// Validate a partial update; the required field may be absent but not blank
    pub fn validate_patch(body: &Value, required: &str) -> Result<Map<String, Value>, ValidationError> {
        let Some(object) = body.as_object() else {
            return Err(ValidationError::NotAnObject);
        };

        if object.contains_key(required) {
            return Self::validate_record(body, required);
        }

        let mut with_placeholder = object.clone();
        with_placeholder.insert(required.to_string(), Value::String("-".to_string()));
        let mut fields = Self::validate_record(&Value::Object(with_placeholder), required)?;
        fields.remove(required);
        Ok(fields)
    }

    /// Validate field key
    pub fn validate_field_key(key: &str) -> Result<(), ValidationError> {
        if key.is_empty() {
            return Err(ValidationError::EmptyFieldKey);
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(ValidationError::FieldKeyTooLong {
                length: key.len(),
                max_length: MAX_KEY_LENGTH,
            });
        }

        if !key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(ValidationError::InvalidFieldKey(key.to_string()));
        }

        Ok(())
    }

    /// Validate field value
    pub fn validate_field_value(value: &Value) -> Result<(), ValidationError> {
        let serialized = serde_json::to_string(value)
            .map_err(|_| ValidationError::InvalidFieldValue)?;

        if serialized.len() > MAX_VALUE_SIZE {
            return Err(ValidationError::FieldValueTooLarge {
                size: serialized.len(),
                max_size: MAX_VALUE_SIZE,
            });
        }

        match value {
            Value::String(s) => Self::validate_text(s),
            Value::Array(items) => items.iter().try_for_each(Self::validate_nested),
            Value::Object(map) => map.values().try_for_each(Self::validate_nested),
            _ => Ok(()),
        }
    }

    fn validate_nested(value: &Value) -> Result<(), ValidationError> {
        match value {
            Value::String(s) => Self::validate_text(s),
            Value::Array(items) => items.iter().try_for_each(Self::validate_nested),
            Value::Object(map) => map.values().try_for_each(Self::validate_nested),
            _ => Ok(()),
        }
    }

    fn validate_text(s: &str) -> Result<(), ValidationError> {
        // newline, tab and carriage return are fine in long-form text
        if s.chars().any(|c| c.is_control() && c != '\n' && c != '\t' && c != '\r') {
            return Err(ValidationError::InvalidFieldValue);
        }
        Ok(())
    }
}

/// Validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Record body must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Too many fields: {count} (max: {max})")]
    TooManyFields { count: usize, max: usize },

    #[error("Field key is empty")]
    EmptyFieldKey,

    #[error("Field key too long: {length} (max: {max_length})")]
    FieldKeyTooLong { length: usize, max_length: usize },

    #[error("Invalid field key '{0}' (must contain only alphanumeric, underscore, or hyphen)")]
    InvalidFieldKey(String),

    #[error("Invalid field value")]
    InvalidFieldValue,

    #[error("Field value too large: {size} bytes (max: {max_size})")]
    FieldValueTooLarge { size: usize, max_size: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_record() {
        let body = json!({"title": "Shakshuka", "servings": 4, "tags": ["eggs", "brunch"]});
        let fields = InputValidator::validate_record(&body, "title").unwrap();
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_reserved_keys_dropped() {
        let body = json!({"id": "forged", "createdAt": "1999", "name": "Corner Deli"});
        let fields = InputValidator::validate_record(&body, "name").unwrap();

        assert!(!fields.contains_key("id"));
        assert!(!fields.contains_key("createdAt"));
        assert_eq!(fields["name"], "Corner Deli");
    }

    #[test]
    fn test_required_field() {
        assert_eq!(
            InputValidator::validate_record(&json!({"body": "x"}), "title"),
            Err(ValidationError::MissingField("title".to_string()))
        );
        assert!(InputValidator::validate_record(&json!({"title": "   "}), "title").is_err());
        assert!(InputValidator::validate_record(&json!({"title": 3}), "title").is_err());
    }

    #[test]
    fn test_not_an_object() {
        assert_eq!(
            InputValidator::validate_record(&json!(["title"]), "title"),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn test_validate_field_key() {
        assert!(InputValidator::validate_field_key("valid_key").is_ok());
        assert!(InputValidator::validate_field_key("valid-key").is_ok());
        assert!(InputValidator::validate_field_key("validKey123").is_ok());
        assert!(InputValidator::validate_field_key("").is_err());
        assert!(InputValidator::validate_field_key("invalid key").is_err());
        assert!(InputValidator::validate_field_key("invalid@key").is_err());
    }

    #[test]
    fn test_control_characters_rejected() {
        let body = json!({"title": "ok", "notes": "line one\nline two"});
        assert!(InputValidator::validate_record(&body, "title").is_ok());

        let body = json!({"title": "ok", "steps": [{"text": "bad\u{0007}"}]});
        assert_eq!(
            InputValidator::validate_record(&body, "title"),
            Err(ValidationError::InvalidFieldValue)
        );
    }

    #[test]
    fn test_value_too_large() {
        let body = json!({"title": "ok", "content": "a".repeat(MAX_VALUE_SIZE + 1)});
        assert!(matches!(
            InputValidator::validate_record(&body, "title"),
            Err(ValidationError::FieldValueTooLarge { .. })
        ));
    }

    #[test]
    fn test_patch_without_required_field() {
        let fields = InputValidator::validate_patch(&json!({"rating": 5}), "name").unwrap();
        assert_eq!(fields.len(), 1);
        assert!(!fields.contains_key("name"));

        assert!(InputValidator::validate_patch(&json!({"name": ""}), "name").is_err());
    }
}

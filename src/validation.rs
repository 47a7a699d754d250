//! JSON Schema validation for execution parameters.
//!
//! A workflow's `parameters` mapping, when present, is treated as a JSON
//! Schema and applied to request parameters before an execution record is
//! created.
//!
//! ## Example
//!
//! ```json
//! {
//!   "parameters": {
//!     "type": "object",
//!     "required": ["order_id"],
//!     "properties": {
//!       "order_id": {"type": "string", "pattern": "^ORD-[0-9]+$"},
//!       "amount": {"type": "number", "minimum": 0}
//!     }
//!   }
//! }
//! ```

use jsonschema::{validator_for, ValidationError, Validator};
use serde_json::Value;

use crate::error::{Error, Result};

/// Compiled JSON Schema validator.
pub struct SchemaValidator {
    validator: Validator,
}

impl SchemaValidator {
    /// Compile a JSON Schema for validation.
    pub fn new(schema: &Value) -> Result<Self> {
        let validator = validator_for(schema)
            .map_err(|e| Error::Validation(format!("Invalid parameter schema: {}", e)))?;
        Ok(Self { validator })
    }

    /// Validate a value against the schema.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if let Err(error) = self.validator.validate(value) {
            return Err(Error::Validation(format_validation_error(&error)));
        }
        Ok(())
    }
}

fn format_validation_error(error: &ValidationError) -> String {
    let path = error.instance_path.to_string();
    if path.is_empty() || path == "/" {
        error.to_string()
    } else {
        format!("at '{}': {}", path, error)
    }
}

/// Validate parameters against an optional schema.
pub fn validate_parameters(schema: Option<&Value>, parameters: &Value) -> Result<()> {
    match schema {
        // An empty mapping is shorthand for "no constraints".
        Some(schema) if !is_empty_schema(schema) => SchemaValidator::new(schema)?
            .validate(parameters)
            .map_err(|e| Error::Validation(format!("Parameter validation failed: {}", e))),
        _ => Ok(()),
    }
}

/// Validate an expanded node config against an executor's declared schema.
pub fn validate_executor_config(schema: Option<&Value>, config: &Value) -> Result<()> {
    match schema {
        Some(schema) if !is_empty_schema(schema) => SchemaValidator::new(schema)?
            .validate(config)
            .map_err(|e| Error::Executor(format!("invalid config: {}", e))),
        _ => Ok(()),
    }
}

fn is_empty_schema(schema: &Value) -> bool {
    matches!(schema, Value::Object(map) if map.is_empty()) || schema.is_null()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_parameters() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string"},
                "count": {"type": "integer", "minimum": 0}
            }
        });

        assert!(validate_parameters(Some(&schema), &json!({"name": "a", "count": 2})).is_ok());
    }

    #[test]
    fn test_missing_required_parameter() {
        let schema = json!({
            "type": "object",
            "required": ["name"]
        });

        let err = validate_parameters(Some(&schema), &json!({})).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let schema = json!({
            "type": "object",
            "properties": {"count": {"type": "integer"}}
        });

        assert!(validate_parameters(Some(&schema), &json!({"count": "three"})).is_err());
    }

    #[test]
    fn test_no_schema_accepts_anything() {
        assert!(validate_parameters(None, &json!({"anything": [1, 2]})).is_ok());
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        assert!(validate_parameters(Some(&json!({})), &json!(42)).is_ok());
    }

    #[test]
    fn test_pattern_constraint() {
        let schema = json!({
            "type": "object",
            "properties": {
                "order_id": {"type": "string", "pattern": "^ORD-[0-9]+$"}
            }
        });

        assert!(validate_parameters(Some(&schema), &json!({"order_id": "ORD-42"})).is_ok());
        assert!(validate_parameters(Some(&schema), &json!({"order_id": "nope"})).is_err());
    }
}

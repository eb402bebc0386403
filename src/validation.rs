//! JSON Schema adapter for the structural validator port.

use crate::app::ports::SchemaValidatorPort;
use crate::error::{PipelineError, Result};
use crate::types::ValidationOutcome;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Compiled JSON Schema. Compiled once at startup and shared by every unit
/// of every run.
pub struct JsonSchemaValidator {
    compiled: JSONSchema,
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

impl JsonSchemaValidator {
    pub fn from_value(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| PipelineError::Schema(format!("Failed to compile JSON Schema: {}", e)))?;
        Ok(Self { compiled })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            PipelineError::Schema(format!("Failed to read schema {}: {}", path.display(), e))
        })?;
        let schema: Value = serde_json::from_str(&data).map_err(|e| {
            PipelineError::Schema(format!("Failed to parse schema {}: {}", path.display(), e))
        })?;
        tracing::info!("Loaded JSON Schema from {}", path.display());
        Self::from_value(&schema)
    }
}

impl SchemaValidatorPort for JsonSchemaValidator {
    fn validate(&self, record: &Value) -> ValidationOutcome {
        // Single pass: the boolean is derived from the same error list
        match self.compiled.validate(record) {
            Ok(()) => ValidationOutcome::valid(),
            Err(errors) => {
                let messages: Vec<String> = errors
                    .map(|error| {
                        let path = error.instance_path.to_string();
                        if path.is_empty() {
                            error.to_string()
                        } else {
                            format!("{} at {}", error, path)
                        }
                    })
                    .collect();
                ValidationOutcome::invalid(messages)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customer_schema() -> Value {
        json!({
            "type": "object",
            "required": ["customerTechnicalHeader", "name"],
            "properties": {
                "customerTechnicalHeader": {
                    "type": "object",
                    "required": ["correlationId"],
                    "properties": { "correlationId": { "type": "string" } }
                },
                "name": { "type": "string" },
                "age": { "type": "integer" }
            }
        })
    }

    #[test]
    fn valid_record_has_no_errors() {
        let validator = JsonSchemaValidator::from_value(&customer_schema()).unwrap();
        let outcome = validator.validate(&json!({
            "customerTechnicalHeader": { "correlationId": "C1" },
            "name": "Ada"
        }));
        assert!(outcome.is_valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn invalid_record_reports_every_violation() {
        let validator = JsonSchemaValidator::from_value(&customer_schema()).unwrap();
        let outcome = validator.validate(&json!({
            "customerTechnicalHeader": { "correlationId": "C2" },
            "age": "forty"
        }));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors.iter().any(|e| e.contains("name")));
        assert!(outcome.errors.iter().any(|e| e.contains("/age")));
    }

    #[test]
    fn repeated_validation_is_stable() {
        let validator = JsonSchemaValidator::from_value(&customer_schema()).unwrap();
        let record = json!({ "age": 1.5 });
        assert_eq!(validator.validate(&record), validator.validate(&record));
    }

    #[test]
    fn broken_schema_is_rejected() {
        let err = JsonSchemaValidator::from_value(&json!({ "type": 12 })).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn bundled_schema_compiles() {
        let schema: Value =
            serde_json::from_str(include_str!("../schemas/customer_inbound.v1.json")).unwrap();
        assert!(JsonSchemaValidator::from_value(&schema).is_ok());
    }
}

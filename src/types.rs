use crate::constants;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Result of validating a record against the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    /// Violation messages in the order the validator reported them
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            errors,
        }
    }

    pub fn status(&self) -> ValidationStatus {
        if self.is_valid {
            ValidationStatus::Valid
        } else {
            ValidationStatus::Invalid
        }
    }

    /// `"NA"` for valid records, otherwise the comma-joined violations.
    pub fn error_message(&self) -> String {
        if self.is_valid {
            constants::NO_ERRORS.to_string()
        } else {
            self.errors.join(constants::ERROR_SEPARATOR)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationStatus {
    Valid,
    Invalid,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Valid => constants::STATUS_VALID,
            ValidationStatus::Invalid => constants::STATUS_INVALID,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            constants::STATUS_VALID => Some(ValidationStatus::Valid),
            constants::STATUS_INVALID => Some(ValidationStatus::Invalid),
            _ => None,
        }
    }

    pub fn sink(&self) -> SinkKind {
        match self {
            ValidationStatus::Valid => SinkKind::Valid,
            ValidationStatus::Invalid => SinkKind::Invalid,
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for routed records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Valid,
    Invalid,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Valid => f.write_str("valid"),
            SinkKind::Invalid => f.write_str("invalid"),
        }
    }
}

/// One row of the audit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// `<inputBaseName>_<correlationId>`
    pub partition_key: String,
    /// The record's correlation id
    pub row_key: String,
    pub status: ValidationStatus,
    pub error_message: String,
}

impl AuditEntry {
    pub fn for_record(input_name: &str, correlation_id: &str, outcome: &ValidationOutcome) -> Self {
        Self {
            partition_key: derived_key(input_name, correlation_id),
            row_key: correlation_id.to_string(),
            status: outcome.status(),
            error_message: outcome.error_message(),
        }
    }
}

/// File name of `input_name` without directories and without its last extension.
pub fn input_base_name(input_name: &str) -> String {
    Path::new(input_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input_name.to_string())
}

/// Key shared by the audit row and the routed output: `<base>_<correlationId>`.
pub fn derived_key(input_name: &str, correlation_id: &str) -> String {
    format!("{}_{}", input_base_name(input_name), correlation_id)
}

/// Name of the routed output object: `<base>_<correlationId>.json`.
pub fn derived_output_name(input_name: &str, correlation_id: &str) -> String {
    format!(
        "{}.{}",
        derived_key(input_name, correlation_id),
        constants::OUTPUT_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_directories_and_extension() {
        assert_eq!(input_base_name("batch1.json"), "batch1");
        assert_eq!(input_base_name("2024/05/batch1.json"), "batch1");
        assert_eq!(input_base_name("batch1"), "batch1");
        assert_eq!(input_base_name("batch1.tar.gz"), "batch1.tar");
    }

    #[test]
    fn derived_names_follow_convention() {
        assert_eq!(derived_key("batch1.json", "C1"), "batch1_C1");
        assert_eq!(derived_output_name("batch1.json", "C1"), "batch1_C1.json");
        assert_eq!(derived_output_name("batch7", ""), "batch7_.json");
    }

    #[test]
    fn outcome_message_preserves_validator_order() {
        let outcome = ValidationOutcome::invalid(vec![
            "missing field X".to_string(),
            "wrong type for Y".to_string(),
        ]);
        assert_eq!(outcome.status(), ValidationStatus::Invalid);
        assert_eq!(outcome.error_message(), "missing field X, wrong type for Y");
        assert_eq!(ValidationOutcome::valid().error_message(), "NA");
    }

    #[test]
    fn audit_entry_uses_derived_partition_key() {
        let entry = AuditEntry::for_record("batch2.json", "C2", &ValidationOutcome::valid());
        assert_eq!(entry.partition_key, "batch2_C2");
        assert_eq!(entry.row_key, "C2");
        assert_eq!(entry.status.as_str(), "Valid");
        assert_eq!(entry.error_message, "NA");
        assert_eq!(entry.status.sink(), SinkKind::Valid);
    }
}

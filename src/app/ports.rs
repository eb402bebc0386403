use crate::error::Result;
use crate::types::{AuditEntry, SinkKind, ValidationOutcome};
use async_trait::async_trait;
use serde_json::Value;

/// Source of input files and destination of routed records.
#[async_trait]
pub trait RecordStorePort: Send + Sync {
    /// Names of every discoverable input. Fails with `PipelineError::Listing`.
    async fn list_inputs(&self) -> Result<Vec<String>>;

    /// Raw content of one input. An empty string means "unavailable".
    async fn read_input(&self, name: &str) -> String;

    /// Write `content` under `derived_name` in the chosen sink, overwriting.
    async fn write_output(&self, sink: SinkKind, derived_name: &str, content: &str) -> Result<()>;
}

/// Keyed, idempotent audit table.
#[async_trait]
pub trait AuditStorePort: Send + Sync {
    async fn upsert_audit(&self, entry: &AuditEntry) -> Result<()>;
}

/// Structural validator. Must be a pure function of `record`.
pub trait SchemaValidatorPort: Send + Sync {
    fn validate(&self, record: &Value) -> ValidationOutcome;
}

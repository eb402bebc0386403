pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod server;
pub mod types;
pub mod validation;

// Ports and the run entry point
pub mod app;
// Storage and audit adapters
pub mod infra;

mod sync;

pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Orchestrator, RunSummary};

use crate::infra::{FsRecordStore, SqliteAuditStore};
use crate::validation::JsonSchemaValidator;
use std::sync::Arc;

/// Wire the filesystem record store, the SQLite audit table and the JSON
/// Schema validator described by `config` into an orchestrator.
pub fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let record_store = Arc::new(FsRecordStore::from_config(config));
    let audit_store = Arc::new(SqliteAuditStore::open(
        config.audit_db_path(),
        &config.audit_table,
    )?);
    let validator = Arc::new(JsonSchemaValidator::from_file(&config.schema_path)?);
    Ok(Orchestrator::new(
        record_store,
        audit_store,
        validator,
        config.concurrency,
        config.correlation_pointer.clone(),
    ))
}

/// Perform one complete run against the configured stores.
pub async fn run_once(config: &AppConfig) -> Result<RunSummary> {
    build_orchestrator(config)?.run_once().await
}

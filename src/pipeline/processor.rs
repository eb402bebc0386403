use crate::app::ports::{AuditStorePort, RecordStorePort, SchemaValidatorPort};
use crate::error::{PipelineError, Result};
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::record::{decode_record, extract_correlation_id, parse_records};
use crate::types::{derived_output_name, AuditEntry, SinkKind, ValidationOutcome, ValidationStatus};
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one input as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputDisposition {
    /// Content was parsed and every record was handled
    Processed,
    /// The same input name was already handled in this run
    AlreadyProcessed,
    /// Content could not be retrieved or was empty
    Unavailable,
    /// Content is not a JSON array; no record was touched
    Malformed { reason: String },
}

/// What happened to one element of an input's array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordOutcome {
    Routed {
        index: usize,
        correlation_id: String,
        status: ValidationStatus,
        sink: SinkKind,
    },
    Duplicate {
        index: usize,
        correlation_id: String,
    },
    Failed {
        index: usize,
        correlation_id: String,
        reason: String,
    },
    NotAnObject {
        index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputReport {
    pub input_name: String,
    pub disposition: InputDisposition,
    pub records: Vec<RecordOutcome>,
}

impl InputReport {
    fn empty(input_name: &str, disposition: InputDisposition) -> Self {
        Self {
            input_name: input_name.to_string(),
            disposition,
            records: Vec::new(),
        }
    }

    pub fn routed(&self, status: ValidationStatus) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, RecordOutcome::Routed { status: s, .. } if *s == status))
            .count()
    }

    pub fn duplicates(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, RecordOutcome::Duplicate { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, RecordOutcome::Failed { .. }))
            .count()
    }

    pub fn non_objects(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, RecordOutcome::NotAnObject { .. }))
            .count()
    }
}

/// Validates and routes the records of one input at a time.
///
/// A processor belongs to a single run: the correlation-id set and the
/// processed-input guard it holds are that run's state.
pub struct RecordProcessor {
    record_store: Arc<dyn RecordStorePort>,
    audit_store: Arc<dyn AuditStorePort>,
    validator: Arc<dyn SchemaValidatorPort>,
    dedup: Arc<Deduplicator>,
    processed_inputs: Deduplicator,
    correlation_pointer: String,
}

impl RecordProcessor {
    pub fn new(
        record_store: Arc<dyn RecordStorePort>,
        audit_store: Arc<dyn AuditStorePort>,
        validator: Arc<dyn SchemaValidatorPort>,
        dedup: Arc<Deduplicator>,
        correlation_pointer: impl Into<String>,
    ) -> Self {
        Self {
            record_store,
            audit_store,
            validator,
            dedup,
            processed_inputs: Deduplicator::new(),
            correlation_pointer: correlation_pointer.into(),
        }
    }

    /// Process every record of `input_name` in array order.
    ///
    /// Failures are contained: an unreadable or malformed input is skipped
    /// and a record whose persistence fails does not stop the next one.
    #[instrument(skip_all, fields(input = %input_name))]
    pub async fn process(&self, input_name: &str) -> InputReport {
        if !self.processed_inputs.check_and_mark(input_name) {
            info!("Input '{}' has already been processed in this run, skipping", input_name);
            crate::metrics::inputs::skipped("already_processed");
            return InputReport::empty(input_name, InputDisposition::AlreadyProcessed);
        }

        let t_input = Instant::now();
        let content = self.record_store.read_input(input_name).await;
        if content.is_empty() {
            warn!("Input '{}' is empty or could not be retrieved, skipping", input_name);
            crate::metrics::inputs::skipped("unavailable");
            return InputReport::empty(input_name, InputDisposition::Unavailable);
        }

        let records = match parse_records(&content) {
            Ok(records) => records,
            Err(e) => {
                let err = PipelineError::Parse {
                    name: input_name.to_string(),
                    message: e.to_string(),
                };
                error!("{}", err);
                crate::metrics::inputs::skipped("malformed");
                return InputReport::empty(
                    input_name,
                    InputDisposition::Malformed {
                        reason: e.to_string(),
                    },
                );
            }
        };
        info!("Processing {} records from '{}'", records.len(), input_name);

        let mut outcomes = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            outcomes.push(self.process_record(input_name, index, record).await);
        }

        let report = InputReport {
            input_name: input_name.to_string(),
            disposition: InputDisposition::Processed,
            records: outcomes,
        };
        info!(
            "Finished '{}': {} valid, {} invalid, {} duplicates, {} failed",
            input_name,
            report.routed(ValidationStatus::Valid),
            report.routed(ValidationStatus::Invalid),
            report.duplicates(),
            report.failures()
        );
        crate::metrics::inputs::processed(t_input.elapsed().as_secs_f64());
        report
    }

    async fn process_record(&self, input_name: &str, index: usize, raw: &RawValue) -> RecordOutcome {
        let record = match decode_record(raw) {
            Ok(record) => record,
            Err(e) => {
                error!("Element {} of '{}' could not be decoded: {}", index, input_name, e);
                crate::metrics::records::failed();
                return RecordOutcome::Failed {
                    index,
                    correlation_id: String::new(),
                    reason: e.to_string(),
                };
            }
        };
        if !record.is_object() {
            warn!("Element {} of '{}' is not an object, skipping", index, input_name);
            return RecordOutcome::NotAnObject { index };
        }

        let correlation_id = match extract_correlation_id(&record, &self.correlation_pointer) {
            Ok(id) => id,
            Err(e) => {
                warn!("Record {} of '{}': {}; treating id as empty", index, input_name, e);
                String::new()
            }
        };

        // Marked before persistence so a concurrent or later duplicate is
        // skipped even when this record's writes fail.
        if !self.dedup.check_and_mark(&correlation_id) {
            info!("Skipping duplicate correlationId: {}", correlation_id);
            crate::metrics::records::duplicate();
            return RecordOutcome::Duplicate {
                index,
                correlation_id,
            };
        }

        match self.route_record(input_name, &correlation_id, &record, raw).await {
            Ok(status) => {
                crate::metrics::records::routed(status.as_str());
                RecordOutcome::Routed {
                    index,
                    correlation_id,
                    status,
                    sink: status.sink(),
                }
            }
            Err(e) => {
                error!("Record {} of '{}' (correlationId '{}') failed: {}", index, input_name, correlation_id, e);
                crate::metrics::records::failed();
                RecordOutcome::Failed {
                    index,
                    correlation_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Validate once, audit, then write the record's original text to the
    /// sink selected by the outcome.
    async fn route_record(
        &self,
        input_name: &str,
        correlation_id: &str,
        record: &Value,
        raw: &RawValue,
    ) -> Result<ValidationStatus> {
        let outcome = self.validate_once(record)?;
        let entry = AuditEntry::for_record(input_name, correlation_id, &outcome);

        self.audit_store.upsert_audit(&entry).await?;
        debug!("Audit row {}/{} stored as {}", entry.partition_key, entry.row_key, entry.status);

        let status = outcome.status();
        let derived_name = derived_output_name(input_name, correlation_id);
        self.record_store
            .write_output(status.sink(), &derived_name, raw.get())
            .await?;
        debug!("Wrote {} to {} sink", derived_name, status.sink());

        Ok(status)
    }

    fn validate_once(&self, record: &Value) -> Result<ValidationOutcome> {
        let validator = &self.validator;
        panic::catch_unwind(AssertUnwindSafe(|| validator.validate(record)))
            .map_err(|_| PipelineError::Schema("validator panicked".to_string()))
    }
}

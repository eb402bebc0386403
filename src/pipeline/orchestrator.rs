use crate::app::ports::{AuditStorePort, RecordStorePort, SchemaValidatorPort};
use crate::error::{PipelineError, Result};
use crate::pipeline::dedup::Deduplicator;
use crate::pipeline::processor::{InputDisposition, InputReport, RecordProcessor};
use crate::types::ValidationStatus;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, Instrument};

/// Aggregate result of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub inputs_discovered: usize,
    pub inputs_processed: usize,
    pub inputs_already_processed: usize,
    pub inputs_unavailable: usize,
    pub inputs_malformed: usize,
    /// Units whose invocation raised instead of completing
    pub inputs_failed: usize,

    pub records_valid: usize,
    pub records_invalid: usize,
    pub records_duplicate: usize,
    pub records_failed: usize,
    pub records_non_object: usize,

    pub failed_inputs: Vec<String>,
    pub reports: Vec<InputReport>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        self.inputs_failed == 0
    }

    fn record_report(&mut self, report: InputReport) {
        match report.disposition {
            InputDisposition::Processed => self.inputs_processed += 1,
            InputDisposition::AlreadyProcessed => self.inputs_already_processed += 1,
            InputDisposition::Unavailable => self.inputs_unavailable += 1,
            InputDisposition::Malformed { .. } => self.inputs_malformed += 1,
        }
        self.records_valid += report.routed(ValidationStatus::Valid);
        self.records_invalid += report.routed(ValidationStatus::Invalid);
        self.records_duplicate += report.duplicates();
        self.records_failed += report.failures();
        self.records_non_object += report.non_objects();
        self.reports.push(report);
    }

    fn record_failure(&mut self, input_name: String) {
        self.inputs_failed += 1;
        self.failed_inputs.push(input_name);
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", if self.success() { "succeeded" } else { "FAILED" })?;
        writeln!(
            f,
            "  inputs:  {} discovered, {} processed, {} already processed, {} unavailable, {} malformed, {} failed",
            self.inputs_discovered,
            self.inputs_processed,
            self.inputs_already_processed,
            self.inputs_unavailable,
            self.inputs_malformed,
            self.inputs_failed
        )?;
        write!(
            f,
            "  records: {} valid, {} invalid, {} duplicate, {} failed, {} not objects",
            self.records_valid,
            self.records_invalid,
            self.records_duplicate,
            self.records_failed,
            self.records_non_object
        )?;
        for name in &self.failed_inputs {
            write!(f, "\n  failed input: {}", name)?;
        }
        Ok(())
    }
}

/// Discovers inputs and fans one `RecordProcessor` invocation out per input.
pub struct Orchestrator {
    record_store: Arc<dyn RecordStorePort>,
    audit_store: Arc<dyn AuditStorePort>,
    validator: Arc<dyn SchemaValidatorPort>,
    concurrency: usize,
    correlation_pointer: String,
}

impl Orchestrator {
    pub fn new(
        record_store: Arc<dyn RecordStorePort>,
        audit_store: Arc<dyn AuditStorePort>,
        validator: Arc<dyn SchemaValidatorPort>,
        concurrency: usize,
        correlation_pointer: impl Into<String>,
    ) -> Self {
        Self {
            record_store,
            audit_store,
            validator,
            concurrency: concurrency.max(1),
            correlation_pointer: correlation_pointer.into(),
        }
    }

    /// List every input. This is the only failure that aborts a run.
    pub async fn discover(&self) -> Result<Vec<String>> {
        match self.record_store.list_inputs().await {
            Ok(names) => {
                info!("Discovered {} inputs", names.len());
                Ok(names)
            }
            Err(e) => {
                crate::metrics::run::listing_failed();
                let err = match e {
                    PipelineError::Listing(_) => e,
                    other => PipelineError::Listing(other.to_string()),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Process `names` with at most `concurrency` units in flight and wait
    /// for all of them. Each call is its own run with fresh dedup state.
    pub async fn dispatch(&self, names: Vec<String>) -> RunSummary {
        let t_run = Instant::now();
        crate::metrics::run::started();

        let mut summary = RunSummary {
            inputs_discovered: names.len(),
            ..RunSummary::default()
        };
        if names.is_empty() {
            info!("No inputs to process");
            crate::metrics::run::finished(true, t_run.elapsed().as_secs_f64());
            return summary;
        }

        let processor = Arc::new(RecordProcessor::new(
            self.record_store.clone(),
            self.audit_store.clone(),
            self.validator.clone(),
            Arc::new(Deduplicator::new()),
            self.correlation_pointer.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        info!(
            "Dispatching {} inputs ({} concurrent)",
            names.len(),
            self.concurrency
        );

        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            let processor = processor.clone();
            let semaphore = semaphore.clone();
            let span = info_span!("unit", input = %name);
            let task_name = name.clone();
            let handle = tokio::spawn(
                async move {
                    // The semaphore is never closed, so acquisition only fails
                    // if it were; run unbounded rather than drop the unit.
                    let _permit = semaphore.acquire_owned().await.ok();
                    processor.process(&task_name).await
                }
                .instrument(span),
            );
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            match handle.await {
                Ok(report) => summary.record_report(report),
                Err(e) => {
                    error!("Processing of input '{}' failed: {}", name, e);
                    crate::metrics::inputs::failed();
                    summary.record_failure(name);
                }
            }
        }

        info!(
            "Run finished: {} valid, {} invalid, {} duplicate, {} failed inputs",
            summary.records_valid,
            summary.records_invalid,
            summary.records_duplicate,
            summary.inputs_failed
        );
        crate::metrics::run::finished(summary.success(), t_run.elapsed().as_secs_f64());
        summary
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let names = self.discover().await?;
        Ok(self.dispatch(names).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::memory::{InMemoryAuditStore, InMemoryRecordStore};
    use crate::types::{SinkKind, ValidationOutcome};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct AlwaysValid;

    impl SchemaValidatorPort for AlwaysValid {
        fn validate(&self, _record: &Value) -> ValidationOutcome {
            ValidationOutcome::valid()
        }
    }

    /// Delegates to an in-memory store but panics when reading one input.
    struct ExplodingStore {
        inner: InMemoryRecordStore,
        explode_on: String,
    }

    #[async_trait]
    impl RecordStorePort for ExplodingStore {
        async fn list_inputs(&self) -> Result<Vec<String>> {
            self.inner.list_inputs().await
        }

        async fn read_input(&self, name: &str) -> String {
            if name == self.explode_on {
                panic!("storage client crashed");
            }
            self.inner.read_input(name).await
        }

        async fn write_output(&self, sink: SinkKind, derived_name: &str, content: &str) -> Result<()> {
            self.inner.write_output(sink, derived_name, content).await
        }
    }

    fn batch(ids: &[&str]) -> String {
        let records: Vec<Value> = ids
            .iter()
            .map(|id| json!({ "customerTechnicalHeader": { "correlationId": id } }))
            .collect();
        serde_json::to_string(&records).unwrap()
    }

    fn orchestrator(store: Arc<dyn RecordStorePort>, audit: Arc<InMemoryAuditStore>, concurrency: usize) -> Orchestrator {
        Orchestrator::new(
            store,
            audit,
            Arc::new(AlwaysValid),
            concurrency,
            "/customerTechnicalHeader/correlationId",
        )
    }

    #[tokio::test]
    async fn listing_failure_aborts_before_any_unit() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.add_input("a.json", batch(&["A"]));
        store.fail_listing();
        let audit = Arc::new(InMemoryAuditStore::new());

        let result = orchestrator(store.clone(), audit.clone(), 4).run_once().await;

        assert!(matches!(result, Err(PipelineError::Listing(_))));
        assert_eq!(store.read_count(), 0);
        assert_eq!(audit.upsert_count(), 0);
    }

    #[tokio::test]
    async fn empty_listing_succeeds_with_nothing_done() {
        let store = Arc::new(InMemoryRecordStore::new());
        let audit = Arc::new(InMemoryAuditStore::new());

        let summary = orchestrator(store.clone(), audit, 4).run_once().await.unwrap();

        assert!(summary.success());
        assert_eq!(summary.inputs_discovered, 0);
        assert_eq!(store.read_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_ids_across_inputs_are_routed_once() {
        let store = Arc::new(InMemoryRecordStore::new());
        for i in 0..8 {
            store.add_input(format!("batch{}.json", i), batch(&["SHARED", &format!("own{}", i)]));
        }
        let audit = Arc::new(InMemoryAuditStore::new());

        let summary = orchestrator(store.clone(), audit.clone(), 3).run_once().await.unwrap();

        assert!(summary.success());
        assert_eq!(summary.inputs_processed, 8);
        assert_eq!(summary.records_valid, 9);
        assert_eq!(summary.records_duplicate, 7);
        assert_eq!(audit.rows().iter().filter(|r| r.row_key == "SHARED").count(), 1);
    }

    #[tokio::test]
    async fn each_run_starts_with_fresh_dedup_state() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.add_input("batch.json", batch(&["A"]));
        let audit = Arc::new(InMemoryAuditStore::new());
        let orchestrator = orchestrator(store.clone(), audit.clone(), 2);

        let first = orchestrator.run_once().await.unwrap();
        let second = orchestrator.run_once().await.unwrap();

        assert_eq!(first.records_valid, 1);
        assert_eq!(second.records_valid, 1);
        assert_eq!(second.inputs_already_processed, 0);
        assert_eq!(audit.rows().len(), 1);
    }

    #[tokio::test]
    async fn panicking_unit_fails_the_run_but_not_its_siblings() {
        let inner = InMemoryRecordStore::new();
        inner.add_input("good.json", batch(&["G"]));
        inner.add_input("bad.json", batch(&["B"]));
        let store = Arc::new(ExplodingStore {
            inner,
            explode_on: "bad.json".to_string(),
        });
        let audit = Arc::new(InMemoryAuditStore::new());

        let summary = orchestrator(store.clone(), audit.clone(), 2).run_once().await.unwrap();

        assert!(!summary.success());
        assert_eq!(summary.failed_inputs, vec!["bad.json".to_string()]);
        assert_eq!(summary.inputs_processed, 1);
        assert!(store.inner.output(SinkKind::Valid, "good_G.json").is_some());
        assert!(summary.to_string().contains("failed input: bad.json"));
    }

    #[tokio::test]
    async fn duplicate_names_in_one_dispatch_are_processed_once() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.add_input("batch.json", batch(&["A"]));
        let audit = Arc::new(InMemoryAuditStore::new());

        let summary = orchestrator(store.clone(), audit, 1)
            .dispatch(vec!["batch.json".to_string(), "batch.json".to_string()])
            .await;

        assert_eq!(summary.inputs_processed, 1);
        assert_eq!(summary.inputs_already_processed, 1);
        assert_eq!(store.read_count(), 1);
    }
}

//! In-memory collaborators for development and testing.
//!
//! Both stores count calls and can be told to fail for chosen keys, which is
//! how the pipeline's containment rules are exercised without real storage.

use crate::app::ports::{AuditStorePort, RecordStorePort};
use crate::error::{PipelineError, Result};
use crate::sync::lock;
use crate::types::{AuditEntry, SinkKind};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inputs: Mutex<BTreeMap<String, String>>,
    outputs: Mutex<BTreeMap<(SinkKind, String), String>>,
    write_log: Mutex<Vec<(SinkKind, String)>>,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    fail_listing: AtomicBool,
    list_calls: AtomicUsize,
    read_calls: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&self, name: impl Into<String>, content: impl Into<String>) {
        lock(&self.inputs).insert(name.into(), content.into());
    }

    /// Make `list_inputs` fail with a listing error.
    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    /// Make reads of `name` degrade to empty content.
    pub fn fail_read(&self, name: impl Into<String>) {
        lock(&self.failing_reads).insert(name.into());
    }

    /// Make writes of `derived_name` (to either sink) fail.
    pub fn fail_write(&self, derived_name: impl Into<String>) {
        lock(&self.failing_writes).insert(derived_name.into());
    }

    pub fn output(&self, sink: SinkKind, derived_name: &str) -> Option<String> {
        lock(&self.outputs)
            .get(&(sink, derived_name.to_string()))
            .cloned()
    }

    /// Names currently stored in `sink`.
    pub fn output_names(&self, sink: SinkKind) -> Vec<String> {
        lock(&self.outputs)
            .keys()
            .filter(|(s, _)| *s == sink)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Every successful write in call order, overwrites included.
    pub fn writes(&self) -> Vec<(SinkKind, String)> {
        lock(&self.write_log).clone()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.write_log).len()
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_count(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStorePort for InMemoryRecordStore {
    async fn list_inputs(&self) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(PipelineError::Listing("in-memory listing failure".to_string()));
        }
        Ok(lock(&self.inputs).keys().cloned().collect())
    }

    async fn read_input(&self, name: &str) -> String {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.failing_reads).contains(name) {
            warn!("{}", PipelineError::retrieval(name, "injected failure"));
            return String::new();
        }
        match lock(&self.inputs).get(name) {
            Some(content) => content.clone(),
            None => {
                warn!("{}", PipelineError::retrieval(name, "not found"));
                String::new()
            }
        }
    }

    async fn write_output(&self, sink: SinkKind, derived_name: &str, content: &str) -> Result<()> {
        if lock(&self.failing_writes).contains(derived_name) {
            return Err(PipelineError::persistence(derived_name, "injected write failure"));
        }
        lock(&self.outputs).insert((sink, derived_name.to_string()), content.to_string());
        lock(&self.write_log).push((sink, derived_name.to_string()));
        debug!("Stored {} in {} sink", derived_name, sink);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    rows: Mutex<BTreeMap<(String, String), AuditEntry>>,
    failing_partitions: Mutex<HashSet<String>>,
    upsert_calls: AtomicUsize,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make upserts for `partition_key` fail.
    pub fn fail_upsert(&self, partition_key: impl Into<String>) {
        lock(&self.failing_partitions).insert(partition_key.into());
    }

    pub fn get(&self, partition_key: &str, row_key: &str) -> Option<AuditEntry> {
        lock(&self.rows)
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
    }

    pub fn rows(&self) -> Vec<AuditEntry> {
        lock(&self.rows).values().cloned().collect()
    }

    /// Number of upsert calls that reached the table (successful ones).
    pub fn upsert_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditStorePort for InMemoryAuditStore {
    async fn upsert_audit(&self, entry: &AuditEntry) -> Result<()> {
        if lock(&self.failing_partitions).contains(&entry.partition_key) {
            return Err(PipelineError::persistence(
                entry.partition_key.clone(),
                "injected upsert failure",
            ));
        }
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.rows).insert(
            (entry.partition_key.clone(), entry.row_key.clone()),
            entry.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ValidationOutcome, ValidationStatus};

    #[tokio::test]
    async fn repeated_upsert_keeps_one_row() {
        let audit = InMemoryAuditStore::new();
        let entry = AuditEntry::for_record("batch1.json", "C1", &ValidationOutcome::valid());

        audit.upsert_audit(&entry).await.unwrap();
        audit.upsert_audit(&entry).await.unwrap();

        assert_eq!(audit.rows(), vec![entry]);
    }

    #[tokio::test]
    async fn upsert_overwrites_fields() {
        let audit = InMemoryAuditStore::new();
        let first = AuditEntry::for_record("b.json", "C1", &ValidationOutcome::valid());
        let second = AuditEntry::for_record(
            "b.json",
            "C1",
            &ValidationOutcome::invalid(vec!["bad".to_string()]),
        );

        audit.upsert_audit(&first).await.unwrap();
        audit.upsert_audit(&second).await.unwrap();

        let row = audit.get("b_C1", "C1").unwrap();
        assert_eq!(row.status, ValidationStatus::Invalid);
        assert_eq!(row.error_message, "bad");
    }

    #[tokio::test]
    async fn injected_failures_apply() {
        let store = InMemoryRecordStore::new();
        store.add_input("a.json", "[]");
        store.fail_read("a.json");
        store.fail_write("a_X.json");

        assert_eq!(store.read_input("a.json").await, "");
        assert!(store.write_output(SinkKind::Valid, "a_X.json", "{}").await.is_err());
        assert_eq!(store.write_count(), 0);

        store.fail_listing();
        assert!(matches!(store.list_inputs().await, Err(PipelineError::Listing(_))));
    }
}

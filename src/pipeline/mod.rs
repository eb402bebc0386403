// Validation pipeline: discovery and fan-out, per-input processing, dedup

pub mod dedup;
pub mod orchestrator;
pub mod processor;
pub mod record;

pub use dedup::Deduplicator;
pub use orchestrator::{Orchestrator, RunSummary};
pub use processor::{InputDisposition, InputReport, RecordOutcome, RecordProcessor};

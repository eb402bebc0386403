// Adapters implementing the app::ports traits

pub mod fs_store;
pub mod memory;
pub mod sqlite_audit;

pub use fs_store::FsRecordStore;
pub use memory::{InMemoryAuditStore, InMemoryRecordStore};
pub use sqlite_audit::{AuditRow, SqliteAuditStore};

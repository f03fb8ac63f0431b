//! tsmeta Metadata Store - persistent schema namespace
//!
//! Maps the storage-group / device / measurement tree onto redb tables
//! and enforces its structural invariants under concurrent writers.

pub mod keys;
pub mod lock;
pub mod store;
pub mod tables;
pub mod traverse;
pub mod types;

// Re-exports
pub use store::{MeasurementNode, MetaStoreError, MetaStoreResult, MetadataStore, PatternScope};
pub use types::{MeasurementRecord, NodeKind, NodeRecord};

//! Storage seams for the margin engine — the read-only source of raw rows
//! and the date-keyed snapshot store, with in-memory implementations for
//! development and tests.

pub mod snapshots;
pub mod source;

pub use snapshots::{MemorySnapshotStore, SnapshotStore};
pub use source::{DataSource, SourceFixture, StaticDataSource};

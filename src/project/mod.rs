//! Cosplay projects: snapshot types, where snapshots come from, and progress reports.

pub mod report;
pub mod source;
pub mod store;
pub mod types;

pub use report::ProgressReport;
pub use source::SnapshotSource;
pub use store::ProjectStore;

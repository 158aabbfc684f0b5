//! Pipeline stages
//!
//! Each stage is a plain component with a report-returning entry point; the
//! scheduler wires them to queues.

pub mod discovery;
pub mod extraction;
pub mod grouping;
pub mod insertion;

pub use discovery::{DiscoveryReport, DiscoveryStage};
pub use extraction::{ExtractionReport, ExtractionStage};
pub use grouping::{GroupingReport, GroupingStage};
pub use insertion::{EntityCounts, InsertionReport, InsertionStage};

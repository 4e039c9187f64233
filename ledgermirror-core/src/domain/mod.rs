//! Core domain entities
//!
//! Pure data structures and total functions - no I/O.

pub mod labels;
mod operation;
pub mod result;
mod sync_run;

pub use operation::{Money, Operation, RawOperation, OPERATION_COLUMNS};
pub use sync_run::{
    FetchWindow, FetchedBatch, ReplicationReport, RunStatus, RunTotals, SinkOutcome, SinkStatus,
    SyncReport,
};

//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on one step of the pipeline or one use case.

pub mod fetch;
pub mod fingerprint;
pub mod logging;
pub mod normalize;
pub mod replicate;
pub mod sinks;
mod snapshot;
mod status;
mod sync;

pub use fetch::OperationFetcher;
pub use fingerprint::{fingerprint, resolve_id};
pub use logging::{EntryPoint, LogEntry, LogEvent, LogStats, LoggingService};
pub use normalize::{money_to_decimal, money_to_string, Normalizer, DEFAULT_REPORTING_TZ};
pub use replicate::Replicator;
pub use sinks::{
    ObjectStoreSink, RelationalUpsertSink, SpreadsheetAppendSink, OBJECT_STORE_SINK,
    RELATIONAL_SINK, SPREADSHEET_SINK,
};
pub use snapshot::{ReloadReport, SnapshotService};
pub use status::{StatusService, StatusSummary};
pub use sync::{SyncOptions, SyncService};

//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. Services depend
//! only on these traits, adapters provide the implementations.

mod data_provider;
mod object_store;
mod repository;
mod sink;
mod spreadsheet;

pub use data_provider::{BrokerAccount, OperationSource};
pub use object_store::{ObjectInfo, ObjectStore};
pub use repository::{RelationalStore, StoreStats};
pub use sink::OperationSink;
pub use spreadsheet::SpreadsheetClient;

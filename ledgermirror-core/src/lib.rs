//! ledgermirror core - brokerage ledger synchronization engine
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Operations, sink outcomes and run reports
//! - **ports**: Trait definitions for the source and the storage back ends
//! - **services**: Fetch, normalize, replicate, snapshot and status use cases
//! - **adapters**: Concrete implementations (Tinkoff, S3, DuckDB, PostgREST, Google Sheets)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod ports;
pub mod services;

use std::sync::Arc;

use adapters::demo::DemoSource;
use adapters::duckdb::DuckDbRepository;
use adapters::local_store::LocalDirectoryStore;
use adapters::postgrest::PostgrestStore;
use adapters::s3::S3ObjectStore;
use adapters::sheets::GoogleSheetsClient;
use adapters::tinkoff::TinkoffSource;
use config::{Config, ObjectStoreSettings, RelationalSettings, SourceKind};
use ports::{ObjectStore, OperationSink, OperationSource, RelationalStore, SpreadsheetClient};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, Result};
pub use domain::{
    Money, Operation, RawOperation, RunStatus, RunTotals, SinkOutcome, SinkStatus, SyncReport,
};

/// Main context for ledgermirror operations
///
/// Built once from a `Config`; holds every configured adapter behind its port
/// and the services that drive them.
pub struct LedgerContext {
    pub config: Config,
    pub sync_service: SyncService,
    pub status_service: StatusService,
    /// Present when an object store is configured
    pub snapshot_service: Option<SnapshotService>,
    pub logger: Option<Arc<LoggingService>>,
}

fn build_source(config: &Config) -> Result<Arc<dyn OperationSource>> {
    Ok(match config.source {
        SourceKind::Tinkoff => Arc::new(TinkoffSource::new_with_base_url(
            &config.api_url,
            config.http_timeout_secs,
        )?),
        SourceKind::Demo => Arc::new(DemoSource::new()),
    })
}

fn build_object_store(config: &Config) -> Result<Option<Arc<dyn ObjectStore>>> {
    let store: Arc<dyn ObjectStore> = match &config.object_store {
        Some(ObjectStoreSettings::S3(s3)) => Arc::new(S3ObjectStore::new(
            &s3.endpoint,
            &s3.region,
            &s3.bucket,
            &s3.access_key,
            &s3.secret_key,
            config.http_timeout_secs,
        )?),
        Some(ObjectStoreSettings::Local(dir)) => Arc::new(LocalDirectoryStore::new(dir)?),
        None => return Ok(None),
    };
    Ok(Some(store))
}

fn build_relational(config: &Config) -> Result<Option<Arc<dyn RelationalStore>>> {
    let store: Arc<dyn RelationalStore> = match &config.relational {
        Some(RelationalSettings::DuckDb(path)) => {
            Arc::new(DuckDbRepository::new(path, &config.relational_table)?)
        }
        Some(RelationalSettings::Postgrest { url, key }) => Arc::new(PostgrestStore::new(
            url,
            key,
            &config.relational_table,
            config.http_timeout_secs,
        )?),
        None => return Ok(None),
    };
    Ok(Some(store))
}

fn build_spreadsheet(config: &Config) -> Result<Option<Arc<dyn SpreadsheetClient>>> {
    let Some(sheets) = &config.sheets else {
        return Ok(None);
    };
    let client = GoogleSheetsClient::new_with_base_url(
        &sheets.api_url,
        &sheets.access_token,
        &sheets.spreadsheet,
        &sheets.worksheet,
        config.http_timeout_secs,
    )?;
    Ok(Some(Arc::new(client)))
}

impl LedgerContext {
    /// Create the context, connecting every configured adapter
    pub fn from_config(config: Config, logger: Option<Arc<LoggingService>>) -> Result<Self> {
        let source = build_source(&config)?;
        let object_store = build_object_store(&config)?;
        let relational = build_relational(&config)?;
        let spreadsheet = build_spreadsheet(&config)?;

        // Object store first, then the sinks a snapshot reload replays into
        let mut downstream: Vec<Arc<dyn OperationSink>> = Vec::new();
        if let Some(store) = &relational {
            downstream.push(Arc::new(RelationalUpsertSink::new(Arc::clone(store))));
        }
        if let Some(client) = &spreadsheet {
            downstream.push(Arc::new(SpreadsheetAppendSink::new(Arc::clone(client))));
        }
        let mut sinks: Vec<Arc<dyn OperationSink>> = Vec::new();
        if let Some(store) = &object_store {
            sinks.push(Arc::new(ObjectStoreSink::new(
                Arc::clone(store),
                config.reporting_tz,
                &config.key_prefix,
            )));
        }
        sinks.extend(downstream.iter().cloned());

        let mut sync_service = SyncService::new(
            OperationFetcher::new(source),
            Normalizer::new(config.reporting_tz),
            Replicator::new(sinks),
            config.token.clone(),
            config.days_back,
        );
        let mut snapshot_service = object_store.map(|store| {
            SnapshotService::new(store, &config.key_prefix, Replicator::new(downstream))
        });
        if let Some(logger) = &logger {
            sync_service = sync_service.with_logger(Arc::clone(logger));
            snapshot_service = snapshot_service.map(|s| s.with_logger(Arc::clone(logger)));
        }

        Ok(Self {
            status_service: StatusService::new(relational),
            sync_service,
            snapshot_service,
            logger,
            config,
        })
    }

    /// Snapshot service, or a configuration error when no object store is set
    pub fn snapshots(&self) -> Result<&SnapshotService> {
        self.snapshot_service
            .as_ref()
            .ok_or_else(|| Error::config("No object store configured"))
    }
}

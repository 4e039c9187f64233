//! Brokerage source port
//!
//! Defines the read-only interface to the source of record (Tinkoff Invest,
//! demo data, ...). The fetcher depends only on account listing and
//! operation listing by time range.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::result::Result;
use crate::domain::RawOperation;

/// Brokerage account visible to a credential
#[derive(Debug, Clone, Serialize)]
pub struct BrokerAccount {
    pub id: String,
    pub name: Option<String>,
}

/// Operation source trait
///
/// Implementations report transport and API failures as `Error::Upstream`
/// and never retry.
pub trait OperationSource: Send + Sync {
    /// Provider name (e.g., "tinkoff", "demo")
    fn name(&self) -> &str;

    /// List accounts available for the token, in provider order
    fn get_accounts(&self, token: &str) -> Result<Vec<BrokerAccount>>;

    /// List operations of one account within `[from, to)`, in provider order
    fn get_operations(
        &self,
        token: &str,
        account_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawOperation>>;
}

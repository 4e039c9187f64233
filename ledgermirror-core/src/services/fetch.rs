//! Operation fetcher - pulls one window of raw operations from the source

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::result::{Error, Result};
use crate::domain::{FetchWindow, FetchedBatch};
use crate::ports::OperationSource;

/// Fetches raw operations for the first account of a credential
pub struct OperationFetcher {
    source: Arc<dyn OperationSource>,
}

impl OperationFetcher {
    pub fn new(source: Arc<dyn OperationSource>) -> Self {
        Self { source }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch `[now - days_back, now)`
    pub fn fetch(&self, token: &str, days_back: u32) -> Result<FetchedBatch> {
        self.fetch_at(token, days_back, Utc::now())
    }

    /// Fetch the window ending at `now`
    pub fn fetch_at(&self, token: &str, days_back: u32, now: DateTime<Utc>) -> Result<FetchedBatch> {
        if days_back < 1 {
            return Err(Error::validation(format!(
                "days_back must be at least 1, got {}",
                days_back
            )));
        }
        let window = FetchWindow::ending_at(now, days_back);

        let accounts = self.source.get_accounts(token)?;
        let account = accounts.into_iter().next().ok_or(Error::NoAccount)?;
        log::debug!(
            "Fetching operations from {} for account {} ({} days)",
            self.source.name(),
            account.id,
            days_back
        );

        let operations = self
            .source
            .get_operations(token, &account.id, window.start, window.end)?;

        Ok(FetchedBatch {
            account_id: account.id,
            window,
            operations,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::domain::RawOperation;
    use crate::ports::BrokerAccount;

    struct StubSource {
        accounts: Vec<BrokerAccount>,
        operations: Result<Vec<RawOperation>>,
        calls: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl StubSource {
        fn new(accounts: &[&str], operations: Result<Vec<RawOperation>>) -> Self {
            Self {
                accounts: accounts
                    .iter()
                    .map(|id| BrokerAccount {
                        id: id.to_string(),
                        name: None,
                    })
                    .collect(),
                operations,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl OperationSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        fn get_accounts(&self, _token: &str) -> Result<Vec<BrokerAccount>> {
            Ok(self.accounts.clone())
        }

        fn get_operations(
            &self,
            _token: &str,
            account_id: &str,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<RawOperation>> {
            self.calls
                .lock()
                .unwrap()
                .push((account_id.to_string(), from, to));
            match &self.operations {
                Ok(ops) => Ok(ops.clone()),
                Err(e) => Err(Error::upstream(e.to_string())),
            }
        }
    }

    fn op(id: &str) -> RawOperation {
        RawOperation {
            id: Some(id.to_string()),
            ..RawOperation::default()
        }
    }

    #[test]
    fn test_uses_first_account_and_window() {
        let source = Arc::new(StubSource::new(&["acc-1", "acc-2"], Ok(vec![op("a"), op("b")])));
        let fetcher = OperationFetcher::new(source.clone());
        let now = Utc::now();

        let batch = fetcher.fetch_at("t.token", 30, now).unwrap();
        assert_eq!(batch.account_id, "acc-1");
        assert_eq!(batch.operations.len(), 2);
        assert_eq!(batch.operations[0].id.as_deref(), Some("a"));
        assert_eq!(batch.window.end, now);

        let calls = source.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "acc-1");
        assert_eq!(calls[0].2 - calls[0].1, chrono::Duration::days(30));
    }

    #[test]
    fn test_zero_days_rejected_before_network() {
        let source = Arc::new(StubSource::new(&["acc-1"], Ok(vec![])));
        let fetcher = OperationFetcher::new(source.clone());

        let err = fetcher.fetch("t.token", 0).unwrap_err();
        assert!(err.is_precondition());
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_account() {
        let fetcher = OperationFetcher::new(Arc::new(StubSource::new(&[], Ok(vec![]))));
        assert!(matches!(fetcher.fetch("t.token", 1), Err(Error::NoAccount)));
    }

    #[test]
    fn test_empty_list_is_not_failure() {
        let fetcher = OperationFetcher::new(Arc::new(StubSource::new(&["acc-1"], Ok(vec![]))));
        let batch = fetcher.fetch("t.token", 1).unwrap();
        assert!(batch.operations.is_empty());
    }

    #[test]
    fn test_upstream_error_propagates() {
        let fetcher = OperationFetcher::new(Arc::new(StubSource::new(
            &["acc-1"],
            Err(Error::upstream("HTTP 500")),
        )));
        assert!(matches!(fetcher.fetch("t.token", 1), Err(Error::Upstream(_))));
    }
}

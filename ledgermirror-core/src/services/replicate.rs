//! Replication coordinator - hands one row batch to every configured sink

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};

use crate::domain::{Operation, ReplicationReport, SinkOutcome};
use crate::ports::OperationSink;

/// Fans a batch out to the registered sinks
///
/// Sinks are independent: a failing or panicking sink yields a failed
/// outcome and never stops the others. Outcomes come back in registration
/// order regardless of completion order.
pub struct Replicator {
    sinks: Vec<Arc<dyn OperationSink>>,
    parallel: bool,
}

impl Replicator {
    pub fn new(sinks: Vec<Arc<dyn OperationSink>>) -> Self {
        Self {
            sinks,
            parallel: true,
        }
    }

    /// Run sinks one after another on the calling thread
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.sinks.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn replicate(&self, rows: &[Operation]) -> ReplicationReport {
        self.replicate_with(rows, self.parallel)
    }

    /// Replicate with an explicit fan-out mode
    pub fn replicate_with(&self, rows: &[Operation], parallel: bool) -> ReplicationReport {
        self.replicate_at(rows, parallel, Utc::now())
    }

    /// Replicate the batch of a run that started at `started_at`
    pub fn replicate_at(
        &self,
        rows: &[Operation],
        parallel: bool,
        started_at: DateTime<Utc>,
    ) -> ReplicationReport {
        let outcomes = if parallel && self.sinks.len() > 1 {
            self.replicate_parallel(rows, started_at)
        } else {
            self.sinks
                .iter()
                .map(|sink| run_guarded(sink.as_ref(), rows, started_at))
                .collect()
        };
        ReplicationReport { outcomes }
    }

    fn replicate_parallel(&self, rows: &[Operation], started_at: DateTime<Utc>) -> Vec<SinkOutcome> {
        thread::scope(|scope| {
            let handles: Vec<_> = self
                .sinks
                .iter()
                .map(|sink| {
                    let sink = sink.as_ref();
                    (sink.name().to_string(), scope.spawn(move || sink.replicate_at(rows, started_at)))
                })
                .collect();

            handles
                .into_iter()
                .map(|(name, handle)| match handle.join() {
                    Ok(outcome) => outcome,
                    Err(payload) => panicked(&name, payload.as_ref()),
                })
                .collect()
        })
    }
}

fn run_guarded(
    sink: &dyn OperationSink,
    rows: &[Operation],
    started_at: DateTime<Utc>,
) -> SinkOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.replicate_at(rows, started_at))) {
        Ok(outcome) => outcome,
        Err(payload) => panicked(sink.name(), payload.as_ref()),
    }
}

fn panicked(sink: &str, payload: &(dyn Any + Send)) -> SinkOutcome {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    log::error!("Sink {} panicked: {}", sink, message);
    SinkOutcome::failed(sink, format!("sink panicked: {}", message))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::domain::{RunStatus, SinkStatus};

    struct CountingSink {
        name: &'static str,
        delay_ms: u64,
        seen: AtomicUsize,
    }

    impl CountingSink {
        fn new(name: &'static str, delay_ms: u64) -> Self {
            Self {
                name,
                delay_ms,
                seen: AtomicUsize::new(0),
            }
        }
    }

    impl OperationSink for CountingSink {
        fn name(&self) -> &str {
            self.name
        }

        fn replicate(&self, rows: &[Operation]) -> SinkOutcome {
            thread::sleep(Duration::from_millis(self.delay_ms));
            self.seen.fetch_add(rows.len(), Ordering::SeqCst);
            SinkOutcome::succeeded(self.name, rows.len())
        }
    }

    struct FailingSink;

    impl OperationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        fn replicate(&self, _rows: &[Operation]) -> SinkOutcome {
            SinkOutcome::failed("failing", "connection refused")
        }
    }

    struct PanickingSink;

    impl OperationSink for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }

        fn replicate(&self, _rows: &[Operation]) -> SinkOutcome {
            panic!("disk on fire");
        }
    }

    fn rows(n: usize) -> Vec<Operation> {
        (0..n)
            .map(|i| Operation {
                operation_id: i.to_string(),
                timestamp_local: String::new(),
                category: String::new(),
                amount: "1.00".to_string(),
                currency: "rub".to_string(),
                status: String::new(),
                description: String::new(),
            })
            .collect()
    }

    #[test]
    fn test_outcomes_in_registration_order() {
        let slow = Arc::new(CountingSink::new("slow", 50));
        let fast = Arc::new(CountingSink::new("fast", 0));
        let replicator = Replicator::new(vec![slow.clone(), fast.clone()]);

        let report = replicator.replicate(&rows(3));
        assert_eq!(report.outcomes[0].sink, "slow");
        assert_eq!(report.outcomes[1].sink, "fast");
        assert_eq!(slow.seen.load(Ordering::SeqCst), 3);
        assert_eq!(fast.seen.load(Ordering::SeqCst), 3);
        assert_eq!(report.run_status(), RunStatus::Succeeded);
    }

    #[test]
    fn test_failure_does_not_stop_other_sinks() {
        let ok = Arc::new(CountingSink::new("ok", 0));
        for parallel in [true, false] {
            let mut replicator =
                Replicator::new(vec![Arc::new(FailingSink), ok.clone(), Arc::new(PanickingSink)]);
            replicator.set_parallel(parallel);

            let report = replicator.replicate(&rows(2));
            assert_eq!(report.outcomes.len(), 3);
            assert_eq!(report.outcomes[0].status, SinkStatus::Failed);
            assert_eq!(report.outcomes[1].status, SinkStatus::Succeeded);
            assert_eq!(report.outcomes[2].status, SinkStatus::Failed);
            assert!(report.outcomes[2]
                .error
                .as_deref()
                .unwrap()
                .contains("disk on fire"));
            assert_eq!(report.run_status(), RunStatus::PartiallySucceeded);
        }
        assert_eq!(ok.seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_all_failed() {
        let replicator = Replicator::new(vec![Arc::new(FailingSink), Arc::new(PanickingSink)]).sequential();
        assert_eq!(replicator.replicate(&rows(1)).run_status(), RunStatus::Failed);
    }

    #[test]
    fn test_sink_names() {
        let replicator = Replicator::new(vec![Arc::new(FailingSink), Arc::new(CountingSink::new("ok", 0))]);
        assert_eq!(replicator.sink_names(), vec!["failing", "ok"]);
        assert!(!replicator.is_empty());
    }
}

//! Applying range diffs to the cloud and host route tables

use crate::{
    diff, validate_range_set, Cidr, Result, RouteOp, RouteTable, SyncEvent, SyncObserver,
    TableKind, TrackerError,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do when a backend operation fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it
    #[default]
    Abort,
    /// Attempt every remaining range and return all failures together
    Continue,
}

/// Outcome of a successful reconciliation
#[derive(Clone, Debug, Serialize)]
pub struct SyncReport {
    pub added: Vec<Cidr>,
    pub removed: Vec<Cidr>,
    pub unchanged: usize,
    /// Backend calls issued
    pub operations: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.operations == 0
    }
}

/// Synchronizer applies the difference between two range sets to both tables.
///
/// All additions happen before any removal so that a range still owned by
/// this host is never left without a route. Each range goes to the cloud
/// table first, then the host table. Nothing is rolled back on failure.
pub struct Synchronizer {
    cloud: Arc<dyn RouteTable>,
    host: Arc<dyn RouteTable>,
    observers: Vec<Arc<dyn SyncObserver>>,
    policy: FailurePolicy,
    validate_input: bool,
}

impl Synchronizer {
    pub fn new(cloud: Arc<dyn RouteTable>, host: Arc<dyn RouteTable>) -> Self {
        Self {
            cloud,
            host,
            observers: Vec::new(),
            policy: FailurePolicy::default(),
            validate_input: true,
        }
    }

    pub fn with_observer<O: SyncObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn with_shared_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check both inputs are sorted and non-overlapping before touching any table
    pub fn validate_input(mut self, validate: bool) -> Self {
        self.validate_input = validate;
        self
    }

    /// Bring both tables from `prev` to `curr`.
    ///
    /// Both inputs must be sorted ascending and non-overlapping. On error the
    /// tables reflect some prefix of the intended changes, and calling again
    /// with the same inputs is safe.
    pub async fn reconcile(&self, prev: &[Cidr], curr: &[Cidr]) -> Result<SyncReport> {
        let started_at = Utc::now();

        if self.validate_input {
            validate_range_set(prev).map_err(|e| in_set("previous", e))?;
            validate_range_set(curr).map_err(|e| in_set("current", e))?;
        }

        let diff = diff(prev, curr);
        self.emit(&SyncEvent::DiffComputed(&diff));

        let mut operations = 0;
        let mut failures = Vec::new();

        for cidr in &diff.added {
            self.apply(cidr, true, &mut operations, &mut failures).await?;
        }
        for cidr in &diff.removed {
            self.apply(cidr, false, &mut operations, &mut failures).await?;
        }

        if !failures.is_empty() {
            return Err(TrackerError::Partial(failures));
        }

        let report = SyncReport {
            added: diff.added,
            removed: diff.removed,
            unchanged: diff.unchanged,
            operations,
            started_at,
            finished_at: Utc::now(),
        };
        self.emit(&SyncEvent::Completed(&report));
        Ok(report)
    }

    /// Add or remove one range in the cloud table, then the host table
    async fn apply(
        &self,
        cidr: &Cidr,
        add: bool,
        operations: &mut usize,
        failures: &mut Vec<TrackerError>,
    ) -> Result<()> {
        let tables = [(TableKind::Cloud, &self.cloud), (TableKind::Host, &self.host)];

        for (kind, table) in tables {
            let (op, result) = if add {
                (RouteOp::add(kind), table.add_route(cidr).await)
            } else {
                (RouteOp::remove(kind), table.remove_route(cidr).await)
            };
            *operations += 1;

            let source = match result {
                Ok(()) => {
                    self.emit(&SyncEvent::RouteApplied { op, cidr });
                    continue;
                }
                Err(source) => source,
            };

            let message = source.to_string();
            self.emit(&SyncEvent::RouteFailed {
                op,
                cidr,
                error: &message,
            });
            let err = TrackerError::Backend {
                op,
                cidr: cidr.to_string(),
                source,
            };
            match self.policy {
                FailurePolicy::Abort => return Err(err),
                // The host route is skipped when the cloud route could not be changed
                FailurePolicy::Continue => {
                    failures.push(err);
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn emit(&self, event: &SyncEvent<'_>) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

fn in_set(which: &str, err: TrackerError) -> TrackerError {
    match err {
        TrackerError::Configuration(msg) => {
            TrackerError::Configuration(format!("{} set: {}", which, msg))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendError;
    use std::collections::HashSet;
    use std::sync::Mutex;

    type CallLog = Arc<Mutex<Vec<(RouteOp, String)>>>;

    /// Records every call into a log shared by both tables
    struct RecordingTable {
        kind: TableKind,
        log: CallLog,
        failing: HashSet<(RouteOp, String)>,
    }

    impl RecordingTable {
        fn new(kind: TableKind, log: &CallLog) -> Self {
            Self {
                kind,
                log: log.clone(),
                failing: HashSet::new(),
            }
        }

        fn fail_on(mut self, op: RouteOp, cidr: &str) -> Self {
            self.failing.insert((op, cidr.to_string()));
            self
        }

        fn record(&self, op: RouteOp, cidr: &Cidr) -> std::result::Result<(), BackendError> {
            let key = (op, cidr.to_string());
            self.log.lock().unwrap().push(key.clone());
            if self.failing.contains(&key) {
                Err(BackendError::Other(format!("{} rejected", cidr)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl RouteTable for RecordingTable {
        fn kind(&self) -> TableKind {
            self.kind
        }

        async fn add_route(&self, cidr: &Cidr) -> std::result::Result<(), BackendError> {
            self.record(RouteOp::add(self.kind), cidr)
        }

        async fn remove_route(&self, cidr: &Cidr) -> std::result::Result<(), BackendError> {
            self.record(RouteOp::remove(self.kind), cidr)
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        applied: Mutex<usize>,
        failed: Mutex<usize>,
        completed: Mutex<usize>,
    }

    impl SyncObserver for CountingObserver {
        fn on_event(&self, event: &SyncEvent<'_>) {
            match event {
                SyncEvent::RouteApplied { .. } => *self.applied.lock().unwrap() += 1,
                SyncEvent::RouteFailed { .. } => *self.failed.lock().unwrap() += 1,
                SyncEvent::Completed(_) => *self.completed.lock().unwrap() += 1,
                SyncEvent::DiffComputed(_) => {}
            }
        }
    }

    fn set(items: &[&str]) -> Vec<Cidr> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn synchronizer(cloud: RecordingTable, host: RecordingTable) -> Synchronizer {
        Synchronizer::new(Arc::new(cloud), Arc::new(host))
    }

    fn calls(log: &CallLog) -> Vec<(RouteOp, String)> {
        log.lock().unwrap().clone()
    }

    fn call(op: RouteOp, cidr: &str) -> (RouteOp, String) {
        (op, cidr.to_string())
    }

    #[tokio::test]
    async fn test_adds_before_removes_cloud_before_host() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log),
            RecordingTable::new(TableKind::Host, &log),
        );

        let prev = set(&["10.0.0.0/24", "10.0.2.0/24"]);
        let curr = set(&["10.0.1.0/24", "10.0.2.0/24"]);
        let report = sync.reconcile(&prev, &curr).await.unwrap();

        assert_eq!(
            calls(&log),
            vec![
                call(RouteOp::AddCloudRoute, "10.0.1.0/24"),
                call(RouteOp::AddHostRoute, "10.0.1.0/24"),
                call(RouteOp::RemoveCloudRoute, "10.0.0.0/24"),
                call(RouteOp::RemoveHostRoute, "10.0.0.0/24"),
            ]
        );
        assert_eq!(report.added, set(&["10.0.1.0/24"]));
        assert_eq!(report.removed, set(&["10.0.0.0/24"]));
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.operations, 4);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_empty_diff_makes_no_calls() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log),
            RecordingTable::new(TableKind::Host, &log),
        );

        let ranges = set(&["10.0.0.0/24", "10.0.1.0/24"]);
        let report = sync.reconcile(&ranges, &ranges).await.unwrap();
        assert!(report.is_noop());

        let report = sync.reconcile(&[], &[]).await.unwrap();
        assert!(report.is_noop());
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_host_add_failure_reports_range() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log),
            RecordingTable::new(TableKind::Host, &log)
                .fail_on(RouteOp::AddHostRoute, "10.0.1.0/24"),
        );

        let err = sync
            .reconcile(&set(&["10.0.0.0/24"]), &set(&["10.0.0.0/24", "10.0.1.0/24"]))
            .await
            .unwrap_err();

        match &err {
            TrackerError::Backend { op, cidr, .. } => {
                assert_eq!(*op, RouteOp::AddHostRoute);
                assert_eq!(cidr, "10.0.1.0/24");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            calls(&log),
            vec![
                call(RouteOp::AddCloudRoute, "10.0.1.0/24"),
                call(RouteOp::AddHostRoute, "10.0.1.0/24"),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_failure_stops_before_remove_phase() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log)
                .fail_on(RouteOp::AddCloudRoute, "10.0.3.0/24"),
            RecordingTable::new(TableKind::Host, &log),
        );

        let prev = set(&["10.0.0.0/24"]);
        let curr = set(&["10.0.1.0/24", "10.0.3.0/24", "10.0.5.0/24"]);
        let err = sync.reconcile(&prev, &curr).await.unwrap_err();

        assert_eq!(err.backend_failures(), vec![(RouteOp::AddCloudRoute, "10.0.3.0/24")]);
        let log = calls(&log);
        assert_eq!(
            log,
            vec![
                call(RouteOp::AddCloudRoute, "10.0.1.0/24"),
                call(RouteOp::AddHostRoute, "10.0.1.0/24"),
                call(RouteOp::AddCloudRoute, "10.0.3.0/24"),
            ]
        );
        assert!(log.iter().all(|(op, _)| op.is_add()));
    }

    #[tokio::test]
    async fn test_remove_failure_aborts_remaining_removals() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log),
            RecordingTable::new(TableKind::Host, &log)
                .fail_on(RouteOp::RemoveHostRoute, "10.0.0.0/24"),
        );

        let prev = set(&["10.0.0.0/24", "10.0.2.0/24"]);
        let err = sync.reconcile(&prev, &[]).await.unwrap_err();

        assert_eq!(err.backend_failures(), vec![(RouteOp::RemoveHostRoute, "10.0.0.0/24")]);
        assert_eq!(calls(&log).len(), 2);
    }

    #[tokio::test]
    async fn test_continue_policy_attempts_every_range() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log)
                .fail_on(RouteOp::AddCloudRoute, "10.0.1.0/24"),
            RecordingTable::new(TableKind::Host, &log)
                .fail_on(RouteOp::RemoveHostRoute, "10.0.0.0/24"),
        )
        .with_policy(FailurePolicy::Continue);

        let prev = set(&["10.0.0.0/24"]);
        let curr = set(&["10.0.1.0/24", "10.0.2.0/24"]);
        let err = sync.reconcile(&prev, &curr).await.unwrap_err();

        assert!(matches!(err, TrackerError::Partial(_)));
        assert_eq!(
            err.backend_failures(),
            vec![
                (RouteOp::AddCloudRoute, "10.0.1.0/24"),
                (RouteOp::RemoveHostRoute, "10.0.0.0/24"),
            ]
        );
        assert_eq!(
            calls(&log),
            vec![
                // host step skipped after the cloud failure
                call(RouteOp::AddCloudRoute, "10.0.1.0/24"),
                call(RouteOp::AddCloudRoute, "10.0.2.0/24"),
                call(RouteOp::AddHostRoute, "10.0.2.0/24"),
                call(RouteOp::RemoveCloudRoute, "10.0.0.0/24"),
                call(RouteOp::RemoveHostRoute, "10.0.0.0/24"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unsorted_input_is_rejected_without_calls() {
        let log = CallLog::default();
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log),
            RecordingTable::new(TableKind::Host, &log),
        );

        let unsorted = set(&["10.0.2.0/24", "10.0.1.0/24"]);
        let err = sync.reconcile(&[], &unsorted).await.unwrap_err();
        match err {
            TrackerError::Configuration(msg) => assert!(msg.starts_with("current set")),
            other => panic!("unexpected error: {:?}", other),
        }

        let overlapping = set(&["10.0.0.0/24", "10.0.0.0/16"]);
        let err = sync.reconcile(&overlapping, &[]).await.unwrap_err();
        assert!(matches!(err, TrackerError::Configuration(_)));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_observer_sees_every_operation() {
        let log = CallLog::default();
        let observer = Arc::new(CountingObserver::default());
        let sync = synchronizer(
            RecordingTable::new(TableKind::Cloud, &log),
            RecordingTable::new(TableKind::Host, &log)
                .fail_on(RouteOp::AddHostRoute, "10.0.1.0/24"),
        )
        .with_shared_observer(observer.clone());

        sync.reconcile(&[], &set(&["10.0.0.0/24"])).await.unwrap();
        assert_eq!(*observer.applied.lock().unwrap(), 2);
        assert_eq!(*observer.completed.lock().unwrap(), 1);

        let prev = set(&["10.0.0.0/24"]);
        let curr = set(&["10.0.0.0/24", "10.0.1.0/24"]);
        assert!(sync.reconcile(&prev, &curr).await.is_err());
        assert_eq!(*observer.applied.lock().unwrap(), 3);
        assert_eq!(*observer.failed.lock().unwrap(), 1);
        assert_eq!(*observer.completed.lock().unwrap(), 1);
    }
}

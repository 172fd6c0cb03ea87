//! Reconciliation events and observers

use crate::{Cidr, RangeDiff, RouteOp, SyncReport};
use tracing::{debug, info, warn};

/// Progress reported by the synchronizer during a reconciliation
#[derive(Clone, Debug)]
pub enum SyncEvent<'a> {
    /// The diff has been computed; no backend call has been made yet
    DiffComputed(&'a RangeDiff),
    /// A backend operation succeeded
    RouteApplied { op: RouteOp, cidr: &'a Cidr },
    /// A backend operation failed
    RouteFailed {
        op: RouteOp,
        cidr: &'a Cidr,
        error: &'a str,
    },
    /// Every operation succeeded
    Completed(&'a SyncReport),
}

/// Receives reconciliation events
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent<'_>);
}

/// Observer that forwards events to `tracing`
#[derive(Clone, Debug, Default)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, event: &SyncEvent<'_>) {
        match event {
            SyncEvent::DiffComputed(diff) => {
                debug!(
                    added = diff.added.len(),
                    removed = diff.removed.len(),
                    unchanged = diff.unchanged,
                    "Computed range diff"
                );
            }
            SyncEvent::RouteApplied { op, cidr } => {
                debug!(op = %op, cidr = %cidr, "Route operation applied");
            }
            SyncEvent::RouteFailed { op, cidr, error } => {
                warn!(op = %op, cidr = %cidr, error = %error, "Route operation failed");
            }
            SyncEvent::Completed(report) => {
                info!(
                    added = report.added.len(),
                    removed = report.removed.len(),
                    operations = report.operations,
                    "Route tables reconciled"
                );
            }
        }
    }
}

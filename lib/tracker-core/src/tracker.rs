//! Serialized reconciliation with a retained range set

use crate::{Cidr, Result, SyncReport, Synchronizer};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// RouteTracker keeps both route tables in line with the ranges owned by
/// this host.
///
/// At most one reconciliation runs at a time. The last range set applied
/// successfully is retained so callers can pass only the current set.
pub struct RouteTracker {
    synchronizer: Synchronizer,
    applied: Mutex<Vec<Cidr>>,
}

impl RouteTracker {
    pub fn new(synchronizer: Synchronizer) -> Self {
        Self {
            synchronizer,
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Reconcile an explicit previous/current pair.
    ///
    /// The retained set becomes `curr` on success and is left alone on error.
    pub async fn handle_update(&self, prev: &[Cidr], curr: &[Cidr]) -> Result<SyncReport> {
        let mut applied = self.applied.lock().await;
        let report = self.run(prev, curr).await?;
        *applied = curr.to_vec();
        Ok(report)
    }

    /// Reconcile from the retained set to `curr`.
    ///
    /// A failed call leaves the retained set unchanged, so calling again with
    /// the same `curr` retries the same diff.
    pub async fn update(&self, curr: &[Cidr]) -> Result<SyncReport> {
        let mut applied = self.applied.lock().await;
        let report = self.run(&applied, curr).await?;
        *applied = curr.to_vec();
        Ok(report)
    }

    /// Ranges applied by the last successful reconciliation
    pub async fn applied(&self) -> Vec<Cidr> {
        self.applied.lock().await.clone()
    }

    async fn run(&self, prev: &[Cidr], curr: &[Cidr]) -> Result<SyncReport> {
        let span = info_span!("reconcile", id = %Uuid::new_v4());
        async {
            debug!(prev = ?prev, curr = ?curr, "Replacing route entries");
            self.synchronizer.reconcile(prev, curr).await
        }
        .instrument(span)
        .await
    }
}

impl fmt::Display for RouteTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "awsvpc")
    }
}

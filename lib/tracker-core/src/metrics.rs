//! Prometheus metrics for route reconciliation

use crate::{RouteOp, SyncEvent, SyncObserver};
use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Prometheus metrics collector fed by synchronizer events
#[derive(Clone)]
pub struct MetricsObserver {
    /// Backend operations that succeeded, by operation
    pub operations_total: IntCounterVec,
    /// Backend operations that failed, by operation
    pub failures_total: IntCounterVec,
    /// Reconciliations that completed without error
    pub reconciliations_total: IntCounter,
    /// Ranges routed to this host after the last successful reconciliation
    pub owned_ranges: IntGauge,
    pub registry: Arc<Registry>,
}

impl MetricsObserver {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new(
                "route_tracker_operations_total",
                "Route table operations applied",
            ),
            &["op"],
        )?;

        let failures_total = IntCounterVec::new(
            Opts::new(
                "route_tracker_failures_total",
                "Route table operations that failed",
            ),
            &["op"],
        )?;

        let reconciliations_total = IntCounter::new(
            "route_tracker_reconciliations_total",
            "Successful reconciliations",
        )?;

        let owned_ranges = IntGauge::new(
            "route_tracker_owned_ranges",
            "Address ranges currently routed to this host",
        )?;

        registry.register(Box::new(operations_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(reconciliations_total.clone()))?;
        registry.register(Box::new(owned_ranges.clone()))?;

        Ok(Self {
            operations_total,
            failures_total,
            reconciliations_total,
            owned_ranges,
            registry,
        })
    }

    pub fn set_owned_ranges(&self, count: usize) {
        self.owned_ranges.set(count as i64);
    }

    pub fn operations(&self, op: RouteOp) -> u64 {
        self.operations_total.with_label_values(&[op.as_str()]).get()
    }

    pub fn failures(&self, op: RouteOp) -> u64 {
        self.failures_total.with_label_values(&[op.as_str()]).get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl SyncObserver for MetricsObserver {
    fn on_event(&self, event: &SyncEvent<'_>) {
        match event {
            SyncEvent::RouteApplied { op, .. } => {
                self.operations_total.with_label_values(&[op.as_str()]).inc();
            }
            SyncEvent::RouteFailed { op, .. } => {
                self.failures_total.with_label_values(&[op.as_str()]).inc();
            }
            SyncEvent::Completed(_) => self.reconciliations_total.inc(),
            SyncEvent::DiffComputed(_) => {}
        }
    }
}

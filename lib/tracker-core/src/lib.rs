//! Core route tracking functionality
//!
//! This library provides:
//! - CIDR range sets with a total order suitable for diffing
//! - Diffing of previous/current range sets
//! - Synchronization of a cloud VPC route table and the host route table
//! - A serialized tracker that retains the last applied range set

pub mod cidr;
pub mod diff;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod observer;
pub mod sync;
pub mod table;
pub mod tracker;

pub use cidr::{cidrs_from_ranges, validate_range_set, Cidr, Ipv4Range};
pub use diff::{diff, RangeDiff};
pub use error::{BackendError, Result, TrackerError};
pub use memory::MemoryRouteTable;
pub use metrics::MetricsObserver;
pub use observer::{SyncEvent, SyncObserver, TracingObserver};
pub use sync::{FailurePolicy, SyncReport, Synchronizer};
pub use table::{RouteOp, RouteTable, TableKind};
pub use tracker::RouteTracker;

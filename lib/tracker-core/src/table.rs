//! Routing table backends

use crate::{BackendError, Cidr};
use serde::Serialize;
use std::fmt;

/// Which of the two routing tables a backend manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Cloud provider VPC route table, governs delivery between hosts
    Cloud,
    /// Kernel route table, governs delivery on this host
    Host,
}

/// A single backend operation, named after the table it touches
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum RouteOp {
    AddCloudRoute,
    AddHostRoute,
    RemoveCloudRoute,
    RemoveHostRoute,
}

impl RouteOp {
    pub fn add(table: TableKind) -> Self {
        match table {
            TableKind::Cloud => RouteOp::AddCloudRoute,
            TableKind::Host => RouteOp::AddHostRoute,
        }
    }

    pub fn remove(table: TableKind) -> Self {
        match table {
            TableKind::Cloud => RouteOp::RemoveCloudRoute,
            TableKind::Host => RouteOp::RemoveHostRoute,
        }
    }

    pub fn table(&self) -> TableKind {
        match self {
            RouteOp::AddCloudRoute | RouteOp::RemoveCloudRoute => TableKind::Cloud,
            RouteOp::AddHostRoute | RouteOp::RemoveHostRoute => TableKind::Host,
        }
    }

    pub fn is_add(&self) -> bool {
        matches!(self, RouteOp::AddCloudRoute | RouteOp::AddHostRoute)
    }

    /// Label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOp::AddCloudRoute => "add_cloud_route",
            RouteOp::AddHostRoute => "add_host_route",
            RouteOp::RemoveCloudRoute => "remove_cloud_route",
            RouteOp::RemoveHostRoute => "remove_host_route",
        }
    }
}

impl fmt::Display for RouteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A routing table that routes for a range can be added to and removed from.
///
/// Both operations must be safe to repeat: adding a route that is already
/// present, or removing one that is already absent, succeeds. A route for the
/// same range pointing somewhere else is a `BackendError::Conflict`.
#[async_trait::async_trait]
pub trait RouteTable: Send + Sync {
    fn kind(&self) -> TableKind;

    /// Name for logging
    fn name(&self) -> &str {
        match self.kind() {
            TableKind::Cloud => "cloud",
            TableKind::Host => "host",
        }
    }

    async fn add_route(&self, cidr: &Cidr) -> Result<(), BackendError>;

    async fn remove_route(&self, cidr: &Cidr) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_op_mapping() {
        assert_eq!(RouteOp::add(TableKind::Cloud), RouteOp::AddCloudRoute);
        assert_eq!(RouteOp::remove(TableKind::Host), RouteOp::RemoveHostRoute);
        assert_eq!(RouteOp::RemoveCloudRoute.table(), TableKind::Cloud);
        assert!(RouteOp::AddHostRoute.is_add());
        assert!(!RouteOp::RemoveHostRoute.is_add());
    }

    #[test]
    fn test_route_op_display() {
        assert_eq!(RouteOp::AddCloudRoute.to_string(), "AddCloudRoute");
        assert_eq!(RouteOp::RemoveHostRoute.as_str(), "remove_host_route");
    }
}

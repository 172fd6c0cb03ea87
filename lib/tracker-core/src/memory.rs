//! In-memory route table, used for dry runs and tests

use crate::{BackendError, Cidr, RouteTable, TableKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// MemoryRouteTable keeps routes in a map of range to route target
pub struct MemoryRouteTable {
    kind: TableKind,
    target: String,
    limit: Option<usize>,
    routes: Arc<RwLock<BTreeMap<Cidr, String>>>,
}

impl MemoryRouteTable {
    /// Create an empty table whose routes point at `target`
    pub fn new(kind: TableKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            limit: None,
            routes: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Reject additions once the table holds `limit` routes
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Insert a route pointing at another target
    pub async fn insert_foreign(&self, cidr: Cidr, target: impl Into<String>) {
        self.routes.write().await.insert(cidr, target.into());
    }

    /// Ranges routed to this table's target, ascending
    pub async fn routes(&self) -> Vec<Cidr> {
        let routes = self.routes.read().await;
        routes
            .iter()
            .filter(|(_, target)| **target == self.target)
            .map(|(cidr, _)| *cidr)
            .collect()
    }

    pub async fn contains(&self, cidr: &Cidr) -> bool {
        let routes = self.routes.read().await;
        routes.get(cidr).is_some_and(|target| *target == self.target)
    }

    /// Total number of routes, including foreign ones
    pub async fn len(&self) -> usize {
        self.routes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routes.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl RouteTable for MemoryRouteTable {
    fn kind(&self) -> TableKind {
        self.kind
    }

    async fn add_route(&self, cidr: &Cidr) -> Result<(), BackendError> {
        let mut routes = self.routes.write().await;
        match routes.get(cidr) {
            Some(target) if *target == self.target => return Ok(()),
            Some(target) => {
                return Err(BackendError::Conflict(format!(
                    "{} already routed to {}",
                    cidr, target
                )))
            }
            None => {}
        }
        if let Some(limit) = self.limit {
            if routes.len() >= limit {
                return Err(BackendError::LimitExceeded(format!(
                    "{} table holds {} routes",
                    self.name(),
                    limit
                )));
            }
        }
        routes.insert(*cidr, self.target.clone());
        debug!("Added {} route {} -> {}", self.name(), cidr, self.target);
        Ok(())
    }

    async fn remove_route(&self, cidr: &Cidr) -> Result<(), BackendError> {
        let mut routes = self.routes.write().await;
        match routes.get(cidr) {
            Some(target) if *target != self.target => Err(BackendError::Conflict(format!(
                "{} is routed to {}",
                cidr, target
            ))),
            Some(_) => {
                routes.remove(cidr);
                debug!("Removed {} route {}", self.name(), cidr);
                Ok(())
            }
            None => Ok(()),
        }
    }
}

//! Host route table through iproute2

use crate::{CommandOutput, CommandRunner};
use std::sync::Arc;
use tracing::debug;
use tracker_core::{BackendError, Cidr, RouteTable, TableKind};

/// KernelRouteTable installs link-scope routes towards a bridge device
pub struct KernelRouteTable {
    runner: Arc<dyn CommandRunner>,
    ip_bin: String,
    device: String,
}

impl KernelRouteTable {
    pub fn new(runner: Arc<dyn CommandRunner>, device: impl Into<String>) -> Self {
        Self {
            runner,
            ip_bin: "ip".to_string(),
            device: device.into(),
        }
    }

    /// Use a different `ip` executable
    pub fn with_ip_bin(mut self, ip_bin: impl Into<String>) -> Self {
        self.ip_bin = ip_bin.into();
        self
    }

    /// Arguments for `ip route <verb> <cidr> dev <device> [scope link]`
    fn route_args(&self, verb: &str, cidr: &Cidr, scoped: bool) -> Vec<String> {
        let mut args = Vec::new();
        if !cidr.is_ipv4() {
            args.push("-6".to_string());
        }
        args.extend([
            "route".to_string(),
            verb.to_string(),
            cidr.to_string(),
            "dev".to_string(),
            self.device.clone(),
        ]);
        if scoped {
            args.extend(["scope".to_string(), "link".to_string()]);
        }
        args
    }

    async fn ip(&self, args: Vec<String>) -> Result<CommandOutput, BackendError> {
        self.runner.run(&self.ip_bin, &args).await
    }

    /// Whether a route for exactly `cidr` already points at our device
    async fn has_route(&self, cidr: &Cidr) -> Result<bool, BackendError> {
        let output = self.ip(self.route_args("show", cidr, false)).await?;
        if !output.success() {
            return Err(output.into_error(&self.ip_bin));
        }
        Ok(!output.stdout.trim().is_empty())
    }

    fn classify(&self, output: CommandOutput) -> BackendError {
        if output.stderr.contains("Operation not permitted") {
            BackendError::Unauthorized(output.stderr.trim().to_string())
        } else {
            output.into_error(&self.ip_bin)
        }
    }
}

#[async_trait::async_trait]
impl RouteTable for KernelRouteTable {
    fn kind(&self) -> TableKind {
        TableKind::Host
    }

    async fn add_route(&self, cidr: &Cidr) -> Result<(), BackendError> {
        let output = self.ip(self.route_args("add", cidr, true)).await?;
        if output.success() {
            return Ok(());
        }

        if output.stderr.contains("File exists") {
            if self.has_route(cidr).await? {
                debug!("Host route {} dev {} already present", cidr, self.device);
                return Ok(());
            }
            return Err(BackendError::Conflict(format!(
                "{} is routed through a device other than {}",
                cidr, self.device
            )));
        }

        Err(self.classify(output))
    }

    async fn remove_route(&self, cidr: &Cidr) -> Result<(), BackendError> {
        let output = self.ip(self.route_args("del", cidr, true)).await?;
        if output.success() {
            return Ok(());
        }

        if output.stderr.contains("No such process") {
            debug!("Host route {} dev {} already absent", cidr, self.device);
            return Ok(());
        }

        Err(self.classify(output))
    }
}

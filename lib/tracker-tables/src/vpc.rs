//! Cloud provider VPC route table through the provider CLI

use crate::{CommandOutput, CommandRunner};
use std::sync::Arc;
use tracing::debug;
use tracker_core::{BackendError, Cidr, RouteTable, TableKind};

/// VpcRouteTable routes ranges in one VPC route table to one instance
pub struct VpcRouteTable {
    runner: Arc<dyn CommandRunner>,
    aws_bin: String,
    region: Option<String>,
    route_table_id: String,
    instance_id: String,
}

impl VpcRouteTable {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        route_table_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            aws_bin: "aws".to_string(),
            region: None,
            route_table_id: route_table_id.into(),
            instance_id: instance_id.into(),
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Use a different provider CLI executable
    pub fn with_aws_bin(mut self, aws_bin: impl Into<String>) -> Self {
        self.aws_bin = aws_bin.into();
        self
    }

    fn ec2_args(&self, action: &str) -> Vec<String> {
        let mut args = vec!["ec2".to_string(), action.to_string()];
        if let Some(region) = &self.region {
            args.extend(["--region".to_string(), region.clone()]);
        }
        args
    }

    /// Arguments naming the route table and destination of a route
    fn route_args(&self, action: &str, cidr: &Cidr) -> Vec<String> {
        let destination = if cidr.is_ipv4() {
            "--destination-cidr-block"
        } else {
            "--destination-ipv6-cidr-block"
        };
        let mut args = self.ec2_args(action);
        args.extend([
            "--route-table-id".to_string(),
            self.route_table_id.clone(),
            destination.to_string(),
            cidr.to_string(),
        ]);
        args
    }

    async fn aws(&self, args: Vec<String>) -> Result<CommandOutput, BackendError> {
        self.runner.run(&self.aws_bin, &args).await
    }

    /// Instance currently targeted by the route for `cidr`, if any
    async fn route_target(&self, cidr: &Cidr) -> Result<Option<String>, BackendError> {
        let field = if cidr.is_ipv4() {
            "DestinationCidrBlock"
        } else {
            "DestinationIpv6CidrBlock"
        };
        let mut args = self.ec2_args("describe-route-tables");
        args.extend([
            "--route-table-ids".to_string(),
            self.route_table_id.clone(),
            "--query".to_string(),
            format!("RouteTables[0].Routes[?{}=='{}'].InstanceId", field, cidr),
            "--output".to_string(),
            "text".to_string(),
        ]);

        let output = self.aws(args).await?;
        if !output.success() {
            return Err(self.classify(output));
        }
        let target = output.stdout.trim();
        if target.is_empty() || target == "None" {
            Ok(None)
        } else {
            Ok(Some(target.to_string()))
        }
    }

    fn classify(&self, output: CommandOutput) -> BackendError {
        let stderr = output.stderr.trim().to_string();
        if stderr.contains("RouteLimitExceeded") {
            BackendError::LimitExceeded(stderr)
        } else if stderr.contains("UnauthorizedOperation") || stderr.contains("AuthFailure") {
            BackendError::Unauthorized(stderr)
        } else {
            output.into_error(&self.aws_bin)
        }
    }
}

#[async_trait::async_trait]
impl RouteTable for VpcRouteTable {
    fn kind(&self) -> TableKind {
        TableKind::Cloud
    }

    async fn add_route(&self, cidr: &Cidr) -> Result<(), BackendError> {
        let mut args = self.route_args("create-route", cidr);
        args.extend(["--instance-id".to_string(), self.instance_id.clone()]);

        let output = self.aws(args).await?;
        if output.success() {
            return Ok(());
        }

        if output.stderr.contains("RouteAlreadyExists") {
            return match self.route_target(cidr).await? {
                Some(target) if target == self.instance_id => {
                    debug!("VPC route {} -> {} already present", cidr, target);
                    Ok(())
                }
                Some(target) => Err(BackendError::Conflict(format!(
                    "{} is routed to {} in {}",
                    cidr, target, self.route_table_id
                ))),
                None => Err(BackendError::Conflict(format!(
                    "{} is routed to a non-instance target in {}",
                    cidr, self.route_table_id
                ))),
            };
        }

        Err(self.classify(output))
    }

    async fn remove_route(&self, cidr: &Cidr) -> Result<(), BackendError> {
        // delete-route ignores the target, so only delete our own route
        match self.route_target(cidr).await? {
            Some(target) if target == self.instance_id => {}
            Some(target) => {
                return Err(BackendError::Conflict(format!(
                    "{} is routed to {} in {}",
                    cidr, target, self.route_table_id
                )))
            }
            None => {
                debug!("VPC route {} already absent from {}", cidr, self.route_table_id);
                return Ok(());
            }
        }

        let output = self.aws(self.route_args("delete-route", cidr)).await?;
        if output.success() {
            return Ok(());
        }

        if output.stderr.contains("InvalidRoute.NotFound") {
            debug!("VPC route {} already absent from {}", cidr, self.route_table_id);
            return Ok(());
        }

        Err(self.classify(output))
    }
}

//! Route table backends driven through system commands
//!
//! - `KernelRouteTable`: host routes through iproute2
//! - `VpcRouteTable`: cloud provider VPC routes through the provider CLI
pub mod command;
pub mod kernel;
pub mod vpc;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use kernel::KernelRouteTable;
pub use vpc::VpcRouteTable;

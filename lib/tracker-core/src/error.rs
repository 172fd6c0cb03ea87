use crate::table::RouteOp;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Invalid CIDR {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("{op} failed for {cidr}: {source}")]
    Backend {
        op: RouteOp,
        cidr: String,
        #[source]
        source: BackendError,
    },

    #[error("Invalid range set: {0}")]
    Configuration(String),

    #[error("{} route operation(s) failed, first: {}", .0.len(), first_failure(.0))]
    Partial(Vec<TrackerError>),
}

impl TrackerError {
    pub(crate) fn parse(input: &str, reason: impl ToString) -> Self {
        TrackerError::Parse {
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Every backend failure carried by this error, in the order they occurred
    pub fn backend_failures(&self) -> Vec<(RouteOp, &str)> {
        match self {
            TrackerError::Backend { op, cidr, .. } => vec![(*op, cidr.as_str())],
            TrackerError::Partial(errors) => {
                errors.iter().flat_map(|e| e.backend_failures()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn first_failure(errors: &[TrackerError]) -> String {
    errors
        .first()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "none".to_string())
}

/// Failure reported by a routing table backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Conflicting route: {0}")]
    Conflict(String),

    #[error("Route limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout {
        program: String,
        timeout: std::time::Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

//! Owned range file
//!
//! ```yaml
//! cidrs:
//!   - 10.32.0.0/24
//! ranges:
//!   - { start: 10.32.1.0, end: 10.32.1.128 }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracker_core::{cidrs_from_ranges, Cidr, Ipv4Range};

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangesFile {
    pub cidrs: Vec<Cidr>,
    /// Half-open `[start, end)` address ranges
    pub ranges: Vec<Ipv4Range>,
}

impl RangesFile {
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse ranges file")
    }

    /// All owned ranges as a sorted range set
    pub fn into_range_set(self) -> Result<Vec<Cidr>> {
        let mut set = cidrs_from_ranges(&self.ranges)?;
        set.extend(self.cidrs);
        set.sort();
        set.dedup();
        Ok(set)
    }
}

/// Read the owned range set, or `None` if the file does not exist
pub async fn read_range_set(path: &Path) -> Result<Option<Vec<Cidr>>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()))
        }
    };
    RangesFile::parse(&content)?.into_range_set().map(Some)
}

//! Generated names for the temporary resources a build creates.

use chrono::{DateTime, Utc};

/// Suffix derived from `now`, unique per second, e.g. `20261017093015`.
pub fn timestamp_suffix(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S").to_string()
}

/// Names for the resource group, VM and deployment of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub resource_group: String,
    pub compute: String,
    pub deployment: String,
}

impl ResourceNames {
    /// Derives all names from a single suffix so the resources of one build
    /// are easy to correlate in the portal.
    pub fn from_suffix(suffix: &str) -> Self {
        Self {
            resource_group: format!("imagesmith-rg-{suffix}"),
            // Windows computer names are capped at 15 characters.
            compute: format!("pkr{}", tail(suffix, 12)),
            deployment: format!("imagesmith-deploy-{suffix}"),
        }
    }

    pub fn generate() -> Self {
        Self::from_suffix(&timestamp_suffix(Utc::now()))
    }
}

fn tail(value: &str, len: usize) -> &str {
    let start = value.len().saturating_sub(len);
    value.get(start..).unwrap_or(value)
}

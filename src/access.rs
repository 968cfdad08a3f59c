use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_APPROVED: &str = "approved";
pub const STATUS_REJECTED: &str = "rejected";

/// Owner decision on an access request. Stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessStatus {
    Pending,
    Approved,
    Rejected,
}

impl AccessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessStatus::Pending => STATUS_PENDING,
            AccessStatus::Approved => STATUS_APPROVED,
            AccessStatus::Rejected => STATUS_REJECTED,
        }
    }

    /// Approvals and rejections notify the requester; resetting to pending does not.
    pub fn is_decision(&self) -> bool {
        !matches!(self, AccessStatus::Pending)
    }
}

impl fmt::Display for AccessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            STATUS_PENDING => Ok(AccessStatus::Pending),
            STATUS_APPROVED => Ok(AccessStatus::Approved),
            STATUS_REJECTED => Ok(AccessStatus::Rejected),
            other => Err(format!(
                "invalid status '{other}'. Allowed values: {STATUS_PENDING}, {STATUS_APPROVED}, {STATUS_REJECTED}"
            )),
        }
    }
}

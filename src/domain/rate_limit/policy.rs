//! Behaviour when the counter store cannot be reached

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::domain::DomainError;

/// Process-wide answer for rate-limit checks whose store call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request
    Open,
    /// Reject the request as an internal failure
    #[default]
    Closed,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" => Ok(Self::Open),
            "closed" | "fail-closed" => Ok(Self::Closed),
            other => Err(DomainError::validation(format!(
                "Unknown failure policy '{}'",
                other
            ))),
        }
    }
}

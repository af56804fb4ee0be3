//! What contract construction does when the generative service fails.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fallback applied when drafting fails or its draft is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Report the failure; no contract is created
    #[default]
    Fail,

    /// Use the template pre-filled by literal substitution, if it passes the draft checks
    Deterministic,
}

impl FromStr for FallbackStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "deterministic" => Ok(Self::Deterministic),
            other => Err(format!(
                "unknown fallback '{}': expected fail or deterministic",
                other
            )),
        }
    }
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => f.write_str("fail"),
            Self::Deterministic => f.write_str("deterministic"),
        }
    }
}

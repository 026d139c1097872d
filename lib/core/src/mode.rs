//! Run modes shared by the engine and adapters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a workflow run was started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Started by a user on demand.
    #[default]
    Manual,
    /// Started by a schedule.
    Scheduled,
    /// Started by an external event.
    Triggered,
    /// A test run from authoring tooling.
    Test,
}

impl RunMode {
    /// Returns the wire name of the mode.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Triggered => "triggered",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "scheduled" => Ok(Self::Scheduled),
            "triggered" => Ok(Self::Triggered),
            "test" => Ok(Self::Test),
            _ => Err(format!("unknown run mode: {s}")),
        }
    }
}

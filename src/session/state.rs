use serde::{Deserialize, Serialize};
use std::fmt;

/// Session orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No resources held
    #[default]
    Idle,
    /// Acquiring the audio route
    Routing,
    /// Route live, no segment open
    Waiting,
    /// Route live, one segment open
    Recording,
    /// Closing the segment, then releasing the route
    Draining,
    /// Failed; resources were released on a best-effort basis
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Routing => "routing",
            Self::Waiting => "waiting",
            Self::Recording => "recording",
            Self::Draining => "draining",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

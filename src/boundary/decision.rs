use serde::Serialize;

use crate::watcher::{TrackIdentity, TrackTags};

/// A track that should start recording, with its metadata at start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackStart {
    pub identity: TrackIdentity,
    pub tags: TrackTags,
}

/// Why a track was considered finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Stopped,
    Paused,
    SourceLost,
}

/// Output of the boundary detector, delivered in emission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    TrackStarted(TrackStart),
    TrackEnded {
        identity: TrackIdentity,
        reason: EndReason,
    },
    /// `ended` finished and `started` began at the same boundary.
    /// Carrying both in one decision keeps the end strictly before the start.
    TrackReplaced {
        ended: TrackIdentity,
        started: TrackStart,
    },
}

impl Decision {
    /// Number of track starts this decision represents
    pub fn starts(&self) -> usize {
        match self {
            Self::TrackStarted(_) | Self::TrackReplaced { .. } => 1,
            Self::TrackEnded { .. } => 0,
        }
    }

    /// Number of track ends this decision represents
    pub fn ends(&self) -> usize {
        match self {
            Self::TrackEnded { .. } | Self::TrackReplaced { .. } => 1,
            Self::TrackStarted(_) => 0,
        }
    }
}

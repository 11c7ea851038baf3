//! Error types
//!
//! Each component has its own error enum; `SessionError` is what reaches
//! the operator once the orchestrator gives up. Conditions the orchestrator
//! can recover from (`SourceLost`, `SegmentLost`, filtered discards) are
//! events and outcomes, not errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;
use crate::watcher::TrackIdentity;

/// Errors from the playback event source
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("No MPRIS player matches '{0}'")]
    NoPlayer(String),

    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("D-Bus call failed: {0}")]
    Fdo(#[from] zbus::fdo::Error),
}

/// Errors from the audio graph / route controller
#[derive(Error, Debug)]
pub enum RoutingError {
    #[error("No output ports match '{0}'")]
    NoMatchingPorts(String),

    #[error("Failed to create sink '{name}': {reason}")]
    SinkCreation { name: String, reason: String },

    #[error("Failed to link {output} -> {input}: {reason}")]
    Link {
        output: String,
        input: String,
        reason: String,
    },

    #[error("Audio graph command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Routing task failed: {0}")]
    Task(String),
}

/// Errors from the segment recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Failed to start encoder: {0}")]
    EncoderSpawn(String),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecorderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Unrecoverable session failure, surfaced after best-effort cleanup
#[derive(Error, Debug)]
#[error("{kind} (state: {last_state:?}, last track: {})", display_track(.last_track))]
pub struct SessionError {
    #[source]
    pub kind: SessionErrorKind,
    pub last_state: SessionState,
    pub last_track: Option<TrackIdentity>,
}

#[derive(Error, Debug)]
pub enum SessionErrorKind {
    #[error("routing failed after {attempts} attempts: {source}")]
    RoutingExhausted {
        attempts: u32,
        #[source]
        source: RoutingError,
    },

    #[error("encoder could not be started: {0}")]
    EncoderSpawn(#[source] RecorderError),

    #[error("recorder failure: {0}")]
    Recorder(#[source] RecorderError),

    #[error("playback source lost after {attempts} reconnect attempts: {reason}")]
    ReconnectExhausted { attempts: u32, reason: String },

    #[error("event channel closed unexpectedly")]
    ChannelClosed,
}

fn display_track(track: &Option<TrackIdentity>) -> String {
    track
        .as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string())
}

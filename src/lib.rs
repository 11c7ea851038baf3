pub mod boundary;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod recorder;
pub mod routing;
pub mod session;
pub mod watcher;

pub use boundary::{BoundaryDetector, Decision, DetectorConfig, EndReason, TrackStart};
pub use config::Config;
pub use error::{RecorderError, RoutingError, SessionError, SessionErrorKind, WatchError};
pub use http::{create_router, AppState};
pub use recorder::{
    CloseOutcome, CommittedTrack, Encoder, FfmpegEncoder, OpenOutcome, RecorderConfig,
    SeenTrackRegistry, SegmentRecorder,
};
pub use routing::{AudioGraph, PipeWireCli, RouteController, RouteGuard};
pub use session::{
    Orchestrator, SessionConfig, SessionEnd, SessionEvent, SessionState, StatusReporter,
    StatusSnapshot, Supervisor,
};
pub use watcher::{
    MprisSource, PlaybackObservation, PlaybackSource, PlaybackStatus, PlayerSelector,
    TrackIdentity, TrackTags,
};

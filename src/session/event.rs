use crate::recorder::SegmentId;
use crate::watcher::PlaybackObservation;

/// Everything the orchestrator reacts to, in arrival order
#[derive(Debug)]
pub enum SessionEvent {
    /// Normalized playback event from the watcher
    Observation(PlaybackObservation),
    /// The playback source went away; terminal for the current subscription
    SourceLost { reason: String },
    /// An encoder exited without being asked to
    EncoderExited(EncoderExit),
    /// Operator asked to stop (SIGINT / SIGTERM)
    Shutdown,
}

/// Exit report of an encoder subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderExit {
    pub segment: SegmentId,
    pub success: bool,
    pub detail: String,
}

//! Segment recorder
//!
//! One encoder per track segment. A segment is written to a tentative file
//! under `<output>/.partial/` and only renamed into the output directory once
//! it passes the gates (clean encoder stop, minimum duration, not a
//! duplicate). Committed source URLs are remembered in a registry shared by
//! all sessions.

mod encoder;
mod naming;
mod registry;
mod segment;
mod tags;

/// Identifier of a track segment, unique within the process
pub type SegmentId = u64;

pub use encoder::{
    EncodeRequest, Encoder, EncoderHandle, FfmpegEncoder, StopOutcome, StopRequest, StopSignal,
};
pub use naming::{partial_path, sanitize, unique_path, PARTIAL_DIR};
pub use registry::SeenTrackRegistry;
pub use segment::{
    CloseOutcome, CommittedTrack, DiscardReason, OpenOutcome, RecorderConfig, SegmentRecorder,
    TrackSegment,
};
pub use tags::{read_duration, read_tags, write_tags};

//! Track boundary detection
//!
//! Derives `TrackStarted` / `TrackEnded` / `TrackReplaced` decisions from the
//! stream of playback observations, absorbing heartbeats, metadata glitches
//! and short pause/resume blips.

mod decision;
mod detector;

pub use decision::{Decision, EndReason, TrackStart};
pub use detector::{BoundaryDetector, DetectorConfig};

use std::path::PathBuf;
use std::time::Duration;

use crate::boundary::DetectorConfig;
use crate::recorder::RecorderConfig;
use crate::watcher::{PlayerSelector, SelectionPolicy};

/// Configuration for recording sessions, fixed at startup
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Which MPRIS player to follow
    pub player: PlayerSelector,

    /// Application name pattern whose output ports get routed
    pub target: String,

    /// Name of the capture sink created for each session
    pub sink_name: String,

    /// Also play the captured audio on the default output
    pub listen: bool,

    /// Routing attempts before giving up (ignored while following)
    pub route_attempts: u32,

    /// Delay between routing attempts
    pub route_retry_delay: Duration,

    /// Keep waiting for the application and link ports it creates later
    pub follow: bool,

    /// How often to look for new application ports when following
    pub follow_poll_interval: Duration,

    pub detector: DetectorConfig,

    pub recorder: RecorderConfig,

    /// Consecutive reconnects to the playback source before giving up
    pub reconnect_attempts: u32,

    /// First reconnect delay; doubled per attempt
    pub reconnect_backoff: Duration,
}

impl SessionConfig {
    /// Delay before reconnect attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.reconnect_backoff
            .saturating_mul(factor)
            .min(Duration::from_secs(60))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            player: PlayerSelector::new("spotify", SelectionPolicy::default()),
            target: "spotify".to_string(),
            sink_name: "trackrec".to_string(),
            listen: true,
            route_attempts: 3,
            route_retry_delay: Duration::from_secs(1),
            follow: false,
            follow_poll_interval: Duration::from_secs(2),
            detector: DetectorConfig::default(),
            recorder: RecorderConfig::new(PathBuf::from("recordings")),
            reconnect_attempts: 5,
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

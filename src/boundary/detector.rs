use std::time::{Duration, Instant};
use tracing::debug;

use super::decision::{Decision, EndReason, TrackStart};
use crate::watcher::{PlaybackObservation, PlaybackStatus, TrackIdentity};

/// Detector tuning
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectorConfig {
    /// How long a pause may last before the track counts as ended.
    /// Zero ends the track on the first Paused observation.
    pub pause_grace: Duration,
}

/// Turns playback observations into track-boundary decisions
///
/// Pure state machine: no I/O, no clocks of its own. Time only advances
/// through observation timestamps and `tick`.
#[derive(Debug)]
pub struct BoundaryDetector {
    config: DetectorConfig,
    /// Track currently considered open
    active: Option<TrackIdentity>,
    last_status: Option<PlaybackStatus>,
    /// When the pending pause started, if a grace period is running
    paused_since: Option<Instant>,
}

impl BoundaryDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            active: None,
            last_status: None,
            paused_since: None,
        }
    }

    pub fn active(&self) -> Option<&TrackIdentity> {
        self.active.as_ref()
    }

    pub fn last_status(&self) -> Option<PlaybackStatus> {
        self.last_status
    }

    /// When the pending pause grace period runs out, if one is running
    pub fn deadline(&self) -> Option<Instant> {
        self.paused_since.map(|since| since + self.config.pause_grace)
    }

    /// Process one observation
    pub fn observe(&mut self, observation: PlaybackObservation) -> Vec<Decision> {
        // An expired grace period takes effect before anything newer
        let mut decisions = self.tick(observation.observed_at);

        match observation.status {
            PlaybackStatus::Playing => {
                self.paused_since = None;

                match (self.active.take(), observation.identity) {
                    (active, None) => {
                        debug!("Ignoring playing observation without track identity");
                        self.active = active;
                    }
                    (None, Some(identity)) => {
                        self.active = Some(identity.clone());
                        decisions.push(Decision::TrackStarted(TrackStart {
                            identity,
                            tags: observation.tags,
                        }));
                    }
                    (Some(current), Some(identity)) if current == identity => {
                        self.active = Some(current);
                    }
                    (Some(current), Some(identity)) => {
                        self.active = Some(identity.clone());
                        decisions.push(Decision::TrackReplaced {
                            ended: current,
                            started: TrackStart {
                                identity,
                                tags: observation.tags,
                            },
                        });
                    }
                }
            }
            PlaybackStatus::Stopped => {
                self.paused_since = None;
                if let Some(identity) = self.active.take() {
                    decisions.push(Decision::TrackEnded {
                        identity,
                        reason: EndReason::Stopped,
                    });
                }
            }
            PlaybackStatus::Paused => {
                if self.active.is_some() {
                    if self.config.pause_grace.is_zero() {
                        if let Some(identity) = self.active.take() {
                            decisions.push(Decision::TrackEnded {
                                identity,
                                reason: EndReason::Paused,
                            });
                        }
                    } else if self.paused_since.is_none() {
                        self.paused_since = Some(observation.observed_at);
                    }
                }
            }
        }

        self.last_status = Some(observation.status);
        decisions
    }

    /// Advance time without a new observation
    pub fn tick(&mut self, now: Instant) -> Vec<Decision> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.paused_since = None;
                self.active
                    .take()
                    .map(|identity| Decision::TrackEnded {
                        identity,
                        reason: EndReason::Paused,
                    })
                    .into_iter()
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// End whatever is open because the source went away
    pub fn finish(&mut self) -> Option<Decision> {
        self.paused_since = None;
        self.active.take().map(|identity| Decision::TrackEnded {
            identity,
            reason: EndReason::SourceLost,
        })
    }
}

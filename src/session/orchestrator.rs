use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::event::SessionEvent;
use super::state::SessionState;
use super::status::{LastResult, StatusReporter};
use crate::boundary::{BoundaryDetector, Decision, TrackStart};
use crate::error::{RecorderError, RoutingError, SessionError, SessionErrorKind};
use crate::recorder::{CloseOutcome, Encoder, OpenOutcome, SeenTrackRegistry, SegmentRecorder};
use crate::routing::{RouteController, RouteGuard};
use crate::watcher::TrackIdentity;

/// Why a session finished without an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Operator requested shutdown
    Shutdown,
    /// The playback source disconnected; the caller may reconnect
    SourceLost(String),
}

enum Routed {
    Live(RouteGuard),
    Ended(SessionEnd),
}

/// Drives one session from `Idle` back to `Idle` (or `Error`)
///
/// Consumes session events strictly in order. Teardown always closes the
/// open segment before the route is released.
pub struct Orchestrator {
    config: SessionConfig,
    session_id: String,
    routes: RouteController,
    recorder: SegmentRecorder,
    detector: BoundaryDetector,
    status: StatusReporter,
    state: SessionState,
    route: Option<RouteGuard>,
    last_track: Option<TrackIdentity>,
}

impl Orchestrator {
    pub fn new(
        config: SessionConfig,
        session_id: impl Into<String>,
        routes: RouteController,
        encoder: Arc<dyn Encoder>,
        registry: SeenTrackRegistry,
        status: StatusReporter,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let recorder = SegmentRecorder::new(config.recorder.clone(), encoder, registry, events);
        let detector = BoundaryDetector::new(config.detector);

        Self {
            config,
            session_id: session_id.into(),
            routes,
            recorder,
            detector,
            status,
            state: SessionState::Idle,
            route: None,
            last_track: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity of the most recently started track
    pub fn last_track(&self) -> Option<&TrackIdentity> {
        self.last_track.as_ref()
    }

    /// Run the session until shutdown, source loss or a fatal error.
    ///
    /// Resources are released before this returns, on every path.
    pub async fn run(
        &mut self,
        events: &mut mpsc::Receiver<SessionEvent>,
    ) -> Result<SessionEnd, SessionError> {
        info!("Session {} starting", self.session_id);
        let session_id = self.session_id.clone();
        self.status.update(|s| {
            s.session_id = Some(session_id);
            s.segments_committed = 0;
            s.segments_discarded = 0;
            s.segments_lost = 0;
        });

        let mut pending = VecDeque::new();

        self.set_state(SessionState::Routing);
        match self.establish_route(events, &mut pending).await {
            Ok(Routed::Live(guard)) => {
                self.route = Some(guard);
                self.set_state(SessionState::Waiting);
            }
            Ok(Routed::Ended(end)) => {
                self.drain().await;
                return Ok(end);
            }
            Err(kind) => return Err(self.fail(kind).await),
        }

        match self.event_loop(events, pending).await {
            Ok(end) => {
                self.drain().await;
                info!("Session {} finished: {:?}", self.session_id, end);
                Ok(end)
            }
            Err(kind) => Err(self.fail(kind).await),
        }
    }

    async fn establish_route(
        &mut self,
        events: &mut mpsc::Receiver<SessionEvent>,
        pending: &mut VecDeque<SessionEvent>,
    ) -> Result<Routed, SessionErrorKind> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match self.acquire_route().await {
                Ok(guard) => return Ok(Routed::Live(guard)),
                Err(e) => e,
            };

            // While following, a missing application is waited for indefinitely
            let waiting_for_app =
                self.config.follow && matches!(error, RoutingError::NoMatchingPorts(_));

            if !waiting_for_app && attempt >= self.config.route_attempts.max(1) {
                return Err(SessionErrorKind::RoutingExhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = if waiting_for_app {
                self.config.follow_poll_interval
            } else {
                self.config.route_retry_delay
            };

            if waiting_for_app {
                debug!("Waiting for '{}' to appear: {}", self.config.target, error);
            } else {
                warn!(
                    "Routing attempt {}/{} failed: {} (retrying in {:?})",
                    attempt, self.config.route_attempts, error, delay
                );
            }

            // Keep listening so shutdown is not delayed by the retry wait;
            // other events are replayed once the route is live
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    event = events.recv() => match event {
                        None => return Err(SessionErrorKind::ChannelClosed),
                        Some(SessionEvent::Shutdown) => {
                            info!("Shutdown requested while routing");
                            return Ok(Routed::Ended(SessionEnd::Shutdown));
                        }
                        Some(SessionEvent::SourceLost { reason }) => {
                            warn!("Playback source lost while routing: {}", reason);
                            return Ok(Routed::Ended(SessionEnd::SourceLost(reason)));
                        }
                        Some(other) => pending.push_back(other),
                    },
                }
            }
        }
    }

    async fn event_loop(
        &mut self,
        events: &mut mpsc::Receiver<SessionEvent>,
        mut pending: VecDeque<SessionEvent>,
    ) -> Result<SessionEnd, SessionErrorKind> {
        while let Some(event) = pending.pop_front() {
            if let Some(end) = self.handle_event(event).await? {
                return Ok(end);
            }
        }

        let period = self.config.follow_poll_interval.max(Duration::from_millis(10));
        let mut follow = tokio::time::interval(period);
        follow.set_missed_tick_behavior(MissedTickBehavior::Skip);
        follow.tick().await;

        loop {
            let deadline = self.detector.deadline();

            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(SessionErrorKind::ChannelClosed);
                    };
                    if let Some(end) = self.handle_event(event).await? {
                        return Ok(end);
                    }
                }
                _ = sleep_until(deadline) => {
                    let decisions = self.detector.tick(Instant::now());
                    self.apply(decisions).await?;
                }
                _ = follow.tick(), if self.config.follow => {
                    self.refresh_route().await?;
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: SessionEvent,
    ) -> Result<Option<SessionEnd>, SessionErrorKind> {
        match event {
            SessionEvent::Observation(observation) => {
                debug!(
                    "Observation: {:?} {}",
                    observation.status,
                    observation.tags.display_name()
                );
                let decisions = self.detector.observe(observation);
                self.apply(decisions).await?;
                Ok(None)
            }
            SessionEvent::EncoderExited(exit) => {
                if let Some(outcome) = self.recorder.lose(exit.segment, &exit.detail).await {
                    self.set_state(SessionState::Waiting);
                    self.record_outcome(&outcome);
                }
                Ok(None)
            }
            SessionEvent::SourceLost { reason } => {
                warn!("Playback source lost: {}", reason);
                Ok(Some(SessionEnd::SourceLost(reason)))
            }
            SessionEvent::Shutdown => {
                info!("Shutdown requested");
                Ok(Some(SessionEnd::Shutdown))
            }
        }
    }

    async fn apply(&mut self, decisions: Vec<Decision>) -> Result<(), SessionErrorKind> {
        for decision in decisions {
            match decision {
                Decision::TrackStarted(start) => self.start_track(start).await?,
                Decision::TrackEnded { identity, reason } => {
                    debug!("Track ended ({:?}): {}", reason, identity);
                    self.end_track().await;
                }
                Decision::TrackReplaced { ended, started } => {
                    debug!("Track replaced: {} -> {}", ended, started.identity);
                    self.end_track().await;
                    self.start_track(started).await?;
                }
            }
        }
        Ok(())
    }

    async fn start_track(&mut self, start: TrackStart) -> Result<(), SessionErrorKind> {
        self.last_track = Some(start.identity.clone());

        let Some(source) = self.route.as_ref().map(|route| route.monitor_source()) else {
            warn!("No live route; not recording {}", start.tags.display_name());
            return Ok(());
        };

        match self.recorder.open(&start, &source).await {
            Ok(OpenOutcome::Opened(_)) => {
                self.set_state(SessionState::Recording);
                Ok(())
            }
            Ok(OpenOutcome::SkippedDuplicate) => {
                let name = start.tags.display_name();
                self.status.update(|s| {
                    s.segments_discarded += 1;
                    s.last_result = Some(LastResult::skipped(name));
                });
                self.set_state(SessionState::Waiting);
                Ok(())
            }
            Err(e @ RecorderError::EncoderSpawn(_)) => Err(SessionErrorKind::EncoderSpawn(e)),
            Err(e) => Err(SessionErrorKind::Recorder(e)),
        }
    }

    async fn end_track(&mut self) {
        self.close_segment().await;
        if self.state == SessionState::Recording {
            self.set_state(SessionState::Waiting);
        }
    }

    async fn close_segment(&mut self) {
        let name = self.recorder.current().map(|s| s.tags.display_name());

        match self.recorder.close().await {
            Ok(Some(outcome)) => self.record_outcome(&outcome),
            Ok(None) => {}
            Err(e) => {
                // The segment is gone either way; keep the session going
                error!("Failed to finalize {}: {}", name.unwrap_or_default(), e);
                self.status.update(|s| s.segments_lost += 1);
            }
        }
    }

    fn record_outcome(&mut self, outcome: &CloseOutcome) {
        let name = match outcome {
            CloseOutcome::Committed(track) => track.tags.display_name(),
            other => other.identity().to_string(),
        };
        let result = LastResult::from_outcome(outcome, name);

        self.status.update(|s| {
            match outcome {
                CloseOutcome::Committed(_) => s.segments_committed += 1,
                CloseOutcome::Discarded { .. } => s.segments_discarded += 1,
                CloseOutcome::Lost { .. } => s.segments_lost += 1,
            }
            s.last_result = Some(result);
        });
    }

    async fn acquire_route(&self) -> Result<RouteGuard, RoutingError> {
        let routes = self.routes.clone();
        let target = self.config.target.clone();
        let listen = self.config.listen;

        tokio::task::spawn_blocking(move || routes.acquire(&target, listen))
            .await
            .map_err(|e| RoutingError::Task(e.to_string()))?
    }

    async fn refresh_route(&mut self) -> Result<(), SessionErrorKind> {
        let Some(mut guard) = self.route.take() else {
            return Ok(());
        };

        let joined = tokio::task::spawn_blocking(move || {
            let result = guard.refresh();
            (guard, result)
        })
        .await;

        match joined {
            Ok((guard, result)) => {
                self.route = Some(guard);
                if let Err(e) = result {
                    warn!("Route refresh failed: {}", e);
                }
                Ok(())
            }
            // The guard was dropped (and released) inside the failed task
            Err(e) => Err(SessionErrorKind::RoutingExhausted {
                attempts: 1,
                source: RoutingError::Task(e.to_string()),
            }),
        }
    }

    async fn release_route(&mut self) {
        let Some(mut guard) = self.route.take() else {
            return;
        };

        if let Err(e) = tokio::task::spawn_blocking(move || guard.release()).await {
            error!("Route release task failed: {}", e);
        }
        self.status.update(|s| s.route_live = false);
    }

    /// Close the open segment, then release the route
    async fn teardown(&mut self) {
        if let Some(Decision::TrackEnded { identity, .. }) = self.detector.finish() {
            debug!("Closing {} for teardown", identity);
        }
        self.close_segment().await;
        self.release_route().await;
    }

    async fn drain(&mut self) {
        self.set_state(SessionState::Draining);
        self.teardown().await;
        self.set_state(SessionState::Idle);
    }

    async fn fail(&mut self, kind: SessionErrorKind) -> SessionError {
        let last_state = self.state;
        error!("Session {} failed in {}: {}", self.session_id, last_state, kind);

        self.set_state(SessionState::Error);
        self.teardown().await;
        // Refresh the snapshot now that nothing is held
        self.set_state(SessionState::Error);

        SessionError {
            kind,
            last_state,
            last_track: self.last_track.clone(),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state: {} -> {}", self.state, state);
        }
        self.state = state;

        let segment = self.recorder.current();
        let track = segment.map(|s| s.identity.clone());
        let title = segment.map(|s| s.tags.title.clone());
        let artist = segment.map(|s| s.tags.artist.clone());
        let file = segment.map(|s| s.output_path.clone());
        let since = segment.map(|s| s.started_wall);
        let route_live = self.route.as_ref().is_some_and(|r| r.is_live());

        self.status.update(|s| {
            s.state = state;
            s.track = track;
            s.title = title;
            s.artist = artist;
            s.file = file;
            s.recording_since = since;
            if since.is_none() {
                s.elapsed_secs = 0.0;
            }
            s.route_live = route_live;
        });
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

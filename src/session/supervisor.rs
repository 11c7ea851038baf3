use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::event::SessionEvent;
use super::orchestrator::{Orchestrator, SessionEnd};
use super::state::SessionState;
use super::status::StatusReporter;
use crate::error::{SessionError, SessionErrorKind};
use crate::recorder::{Encoder, SeenTrackRegistry};
use crate::routing::RouteController;
use crate::watcher::{PlaybackSource, TrackIdentity};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs sessions back to back, reconnecting to the playback source
///
/// Owns what outlives a single session: the event channel, the registry of
/// committed tracks and the status reporter.
pub struct Supervisor {
    config: SessionConfig,
    source: Arc<dyn PlaybackSource>,
    routes: RouteController,
    encoder: Arc<dyn Encoder>,
    registry: SeenTrackRegistry,
    status: StatusReporter,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    last_track: Option<TrackIdentity>,
    sessions: usize,
}

impl Supervisor {
    pub fn new(
        config: SessionConfig,
        source: Arc<dyn PlaybackSource>,
        routes: RouteController,
        encoder: Arc<dyn Encoder>,
        registry: SeenTrackRegistry,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            source,
            routes,
            encoder,
            registry,
            status: StatusReporter::new(),
            events_tx,
            events_rx,
            last_track: None,
            sessions: 0,
        }
    }

    /// Sender for injecting events (interrupts) into the session channel
    pub fn events(&self) -> mpsc::Sender<SessionEvent> {
        self.events_tx.clone()
    }

    pub fn status(&self) -> StatusReporter {
        self.status.clone()
    }

    pub fn registry(&self) -> &SeenTrackRegistry {
        &self.registry
    }

    /// Number of sessions started so far
    pub fn sessions(&self) -> usize {
        self.sessions
    }

    /// Run until shutdown or an unrecoverable error
    pub async fn run(&mut self) -> Result<(), SessionError> {
        let mut failures = 0u32;

        loop {
            let watch = match self
                .source
                .subscribe(&self.config.player, self.events_tx.clone())
                .await
            {
                Ok(watch) => {
                    failures = 0;
                    watch
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.config.reconnect_attempts {
                        return Err(self.exhausted(failures, e.to_string()));
                    }

                    let delay = self.config.backoff(failures);
                    warn!(
                        "Playback source unavailable: {} (attempt {}/{}, retrying in {:?})",
                        e, failures, self.config.reconnect_attempts, delay
                    );
                    if self.wait(delay).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            info!("Following player {}", watch.player());
            let player = watch.player().to_string();
            self.status.update(|s| s.player = Some(player));

            let end = self.run_session().await;
            drop(watch);

            match end? {
                SessionEnd::Shutdown => {
                    info!("Shutdown complete");
                    return Ok(());
                }
                SessionEnd::SourceLost(reason) => {
                    failures += 1;
                    if failures > self.config.reconnect_attempts {
                        return Err(self.exhausted(failures, reason));
                    }

                    let delay = self.config.backoff(failures);
                    info!("Reconnecting to the playback source in {:?}", delay);
                    self.status.update(|s| s.player = None);
                    if self.wait(delay).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn run_session(&mut self) -> Result<SessionEnd, SessionError> {
        self.sessions += 1;
        let session_id = format!("session-{}", uuid::Uuid::new_v4());

        let mut orchestrator = Orchestrator::new(
            self.config.clone(),
            session_id,
            self.routes.clone(),
            Arc::clone(&self.encoder),
            self.registry.clone(),
            self.status.clone(),
            self.events_tx.clone(),
        );

        let result = orchestrator.run(&mut self.events_rx).await;
        if let Some(track) = orchestrator.last_track() {
            self.last_track = Some(track.clone());
        }
        result
    }

    /// Sleep for `delay`; returns true if shutdown was requested meanwhile
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                event = self.events_rx.recv() => match event {
                    Some(SessionEvent::Shutdown) | None => {
                        info!("Shutdown requested while reconnecting");
                        return true;
                    }
                    Some(other) => debug!("Dropping event between sessions: {:?}", other),
                },
            }
        }
    }

    fn exhausted(&self, attempts: u32, reason: String) -> SessionError {
        error!(
            "Giving up on the playback source after {} attempt(s): {}",
            attempts, reason
        );
        self.status.update(|s| s.state = SessionState::Error);

        SessionError {
            kind: SessionErrorKind::ReconnectExhausted { attempts, reason },
            last_state: SessionState::Idle,
            last_track: self.last_track.clone(),
        }
    }
}

/// Turn SIGINT / SIGTERM into `SessionEvent::Shutdown`
pub fn forward_interrupts(events: mpsc::Sender<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_interrupt().await;
        info!("Interrupt received; draining");
        if events.send(SessionEvent::Shutdown).await.is_err() {
            debug!("Session channel already closed");
        }
    })
}

#[cfg(unix)]
async fn wait_for_interrupt() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_interrupt() {
    let _ = tokio::signal::ctrl_c().await;
}

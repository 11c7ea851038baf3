//! Metadata watcher
//!
//! Normalizes playback events from a media player into `PlaybackObservation`
//! values delivered on the session event channel. A subscription is not
//! restartable: once the source disconnects it sends a single
//! `SessionEvent::SourceLost` and the caller has to subscribe again.

mod mpris;
mod observation;
mod selector;

pub use mpris::{tags_from_metadata, MprisSource};
pub use observation::{PlaybackObservation, PlaybackStatus, TrackIdentity, TrackTags};
pub use selector::{PlayerCandidate, PlayerSelector, SelectionPolicy, MPRIS_PREFIX};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::WatchError;
use crate::session::SessionEvent;

/// Source of playback observations
#[async_trait]
pub trait PlaybackSource: Send + Sync {
    /// Select a player and start forwarding its observations into `events`
    async fn subscribe(
        &self,
        selector: &PlayerSelector,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<WatchHandle, WatchError>;
}

/// A live subscription; dropping it stops forwarding
pub struct WatchHandle {
    player: String,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn new(player: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            player: player.into(),
            task,
        }
    }

    /// Bus name (or other label) of the player being watched
    pub fn player(&self) -> &str {
        &self.player
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

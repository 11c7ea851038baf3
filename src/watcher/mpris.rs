// MPRIS playback source over the D-Bus session bus
//
// Subscribes to PlaybackStatus / Metadata property changes of one player and
// turns them into PlaybackObservation values on the session event channel.

use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::fdo::DBusProxy;
use zbus::Connection;
use zvariant::{OwnedValue, Value};

use super::observation::{PlaybackObservation, PlaybackStatus, TrackTags};
use super::selector::{PlayerCandidate, PlayerSelector, MPRIS_PREFIX};
use super::{PlaybackSource, WatchHandle};
use crate::error::WatchError;
use crate::session::SessionEvent;

#[zbus::proxy(
    interface = "org.mpris.MediaPlayer2.Player",
    default_path = "/org/mpris/MediaPlayer2"
)]
trait Player {
    #[zbus(property)]
    fn playback_status(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn metadata(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
}

/// Playback source backed by MPRIS players on the session bus
pub struct MprisSource {
    connection: Connection,
}

impl MprisSource {
    /// Connect to the user's session bus
    pub async fn connect() -> Result<Self, WatchError> {
        let connection = Connection::session().await?;
        Ok(Self { connection })
    }

    async fn player_proxy(&self, bus_name: &str) -> Result<PlayerProxy<'static>, WatchError> {
        let proxy = PlayerProxy::builder(&self.connection)
            .destination(bus_name.to_string())?
            .build()
            .await?;
        Ok(proxy)
    }

    async fn candidates(&self, dbus: &DBusProxy<'_>) -> Result<Vec<PlayerCandidate>, WatchError> {
        let mut candidates = Vec::new();

        for name in dbus.list_names().await? {
            let bus_name = name.to_string();
            if !bus_name.starts_with(MPRIS_PREFIX) {
                continue;
            }

            // A player that can't report its status is still a candidate
            let status = match self.player_proxy(&bus_name).await {
                Ok(proxy) => proxy
                    .playback_status()
                    .await
                    .map(|s| PlaybackStatus::from_mpris(&s))
                    .unwrap_or(PlaybackStatus::Stopped),
                Err(_) => PlaybackStatus::Stopped,
            };

            candidates.push(PlayerCandidate { bus_name, status });
        }

        Ok(candidates)
    }
}

#[async_trait]
impl PlaybackSource for MprisSource {
    async fn subscribe(
        &self,
        selector: &PlayerSelector,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<WatchHandle, WatchError> {
        let dbus = DBusProxy::new(&self.connection).await?;

        let chosen = selector
            .choose(self.candidates(&dbus).await?)
            .ok_or_else(|| WatchError::NoPlayer(selector.pattern().to_string()))?;

        info!("Using MPRIS player: {}", chosen.bus_name);

        let player = self.player_proxy(&chosen.bus_name).await?;
        let mut status_changes = player.receive_playback_status_changed().await;
        let mut metadata_changes = player.receive_metadata_changed().await;
        let mut owner_changes = dbus.receive_name_owner_changed().await?;

        // Prime with the current state so a track already playing is picked up
        let initial = snapshot(&player).await?;

        let bus_name = chosen.bus_name.clone();
        let task = tokio::spawn(async move {
            if events.send(SessionEvent::Observation(initial)).await.is_err() {
                return;
            }

            let reason = loop {
                tokio::select! {
                    changed = status_changes.next() => {
                        if changed.is_none() {
                            break "playback status stream ended".to_string();
                        }
                    }
                    changed = metadata_changes.next() => {
                        if changed.is_none() {
                            break "metadata stream ended".to_string();
                        }
                    }
                    signal = owner_changes.next() => {
                        let Some(signal) = signal else {
                            break "name owner stream ended".to_string();
                        };
                        match signal.args() {
                            Ok(args)
                                if args.name().as_str() == bus_name
                                    && args.new_owner().is_none() =>
                            {
                                break format!("{} left the bus", bus_name);
                            }
                            _ => continue,
                        }
                    }
                }

                match snapshot(&player).await {
                    Ok(observation) => {
                        debug!(
                            "Observation: {:?} {:?}",
                            observation.status, observation.identity
                        );
                        if events.send(SessionEvent::Observation(observation)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => break format!("failed to read player properties: {}", e),
                }
            };

            warn!("Playback source lost: {}", reason);
            let _ = events.send(SessionEvent::SourceLost { reason }).await;
        });

        Ok(WatchHandle::new(chosen.bus_name, task))
    }
}

/// Read status + metadata from the (cached) proxy properties
async fn snapshot(player: &PlayerProxy<'_>) -> Result<PlaybackObservation, WatchError> {
    let status = PlaybackStatus::from_mpris(&player.playback_status().await?);
    let metadata = player.metadata().await?;
    Ok(PlaybackObservation::new(
        status,
        tags_from_metadata(&metadata),
        Instant::now(),
    ))
}

/// Convert an MPRIS metadata map into track tags
pub fn tags_from_metadata(metadata: &HashMap<String, OwnedValue>) -> TrackTags {
    let text = |key: &str| metadata.get(key).and_then(|v| value_str(v)).unwrap_or_default();

    let artist = metadata
        .get("xesam:artist")
        .and_then(|v| match &**v {
            Value::Array(items) => items.iter().find_map(|item| match item {
                Value::Str(s) => Some(s.as_str().to_string()),
                _ => None,
            }),
            Value::Str(s) => Some(s.as_str().to_string()),
            _ => None,
        })
        .unwrap_or_default();

    let positive = |key: &str| {
        metadata
            .get(key)
            .and_then(|v| value_i64(v))
            .filter(|n| *n > 0)
    };

    TrackTags {
        title: text("xesam:title"),
        artist,
        album: text("xesam:album"),
        track_number: positive("xesam:trackNumber").and_then(|n| u32::try_from(n).ok()),
        disc_number: positive("xesam:discNumber").and_then(|n| u32::try_from(n).ok()),
        // mpris:length is in microseconds
        duration_hint: positive("mpris:length").map(|us| Duration::from_micros(us as u64)),
        source_url: metadata
            .get("xesam:url")
            .and_then(|v| value_str(v))
            .filter(|url| !url.trim().is_empty()),
    }
}

fn value_str(value: &Value<'_>) -> Option<String> {
    match value {
        Value::Str(s) => Some(s.as_str().to_string()),
        Value::ObjectPath(p) => Some(p.as_str().to_string()),
        _ => None,
    }
}

fn value_i64(value: &Value<'_>) -> Option<i64> {
    match value {
        Value::I32(n) => Some(*n as i64),
        Value::I64(n) => Some(*n),
        Value::U32(n) => Some(*n as i64),
        Value::U64(n) => i64::try_from(*n).ok(),
        Value::I16(n) => Some(*n as i64),
        Value::U16(n) => Some(*n as i64),
        _ => None,
    }
}

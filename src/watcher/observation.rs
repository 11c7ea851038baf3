use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Playback status as reported by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    /// Parse an MPRIS `PlaybackStatus` string. Anything unknown counts as stopped.
    pub fn from_mpris(value: &str) -> Self {
        match value.trim() {
            "Playing" => Self::Playing,
            "Paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Track metadata captured from a single observation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    /// Length advertised by the player (`mpris:length`)
    pub duration_hint: Option<Duration>,
    /// Stable source identifier (`xesam:url`)
    pub source_url: Option<String>,
}

impl TrackTags {
    /// Source URL with surrounding whitespace removed, `None` when blank
    pub fn source_url(&self) -> Option<&str> {
        self.source_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Human-readable "Artist - Title" label used for logs and file names
    pub fn display_name(&self) -> String {
        let artist = self.artist.trim();
        let title = self.title.trim();
        match (artist.is_empty(), title.is_empty()) {
            (false, false) => format!("{} - {}", artist, title),
            (true, false) => title.to_string(),
            (false, true) => artist.to_string(),
            (true, true) => "unknown".to_string(),
        }
    }
}

/// Stable key for "the same track"
///
/// The source URL is authoritative when the player provides one. Without it
/// the identity falls back to a structural key, which means two distinct
/// plays of the same track cannot be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackIdentity {
    SourceUrl { url: String },
    Structural {
        title: String,
        artist: String,
        album: String,
        duration_ms: Option<u64>,
    },
}

impl TrackIdentity {
    /// Derive the identity for a metadata record.
    ///
    /// Returns `None` when there is neither a URL nor a title, which is what
    /// players emit briefly while switching tracks.
    pub fn from_tags(tags: &TrackTags) -> Option<Self> {
        if let Some(url) = tags.source_url() {
            return Some(Self::SourceUrl {
                url: url.to_string(),
            });
        }

        if tags.title.trim().is_empty() {
            return None;
        }

        Some(Self::Structural {
            title: tags.title.trim().to_string(),
            artist: tags.artist.trim().to_string(),
            album: tags.album.trim().to_string(),
            duration_ms: tags.duration_hint.map(|d| d.as_millis() as u64),
        })
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceUrl { url } => write!(f, "{}", url),
            Self::Structural { title, artist, .. } if artist.is_empty() => write!(f, "{}", title),
            Self::Structural { title, artist, .. } => write!(f, "{} - {}", artist, title),
        }
    }
}

/// Immutable snapshot of the player at one point in time
#[derive(Debug, Clone)]
pub struct PlaybackObservation {
    pub status: PlaybackStatus,
    pub identity: Option<TrackIdentity>,
    pub tags: TrackTags,
    pub observed_at: Instant,
}

impl PlaybackObservation {
    /// Build an observation, deriving the identity from the tags
    pub fn new(status: PlaybackStatus, tags: TrackTags, observed_at: Instant) -> Self {
        Self {
            status,
            identity: TrackIdentity::from_tags(&tags),
            tags,
            observed_at,
        }
    }
}

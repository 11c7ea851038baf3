use serde::Deserialize;
use tracing::warn;

use super::observation::PlaybackStatus;

/// Bus name prefix shared by every MPRIS player
pub const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";

/// How to choose between several players matching the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// A playing player wins over paused/stopped ones, ties by name
    #[default]
    PreferPlaying,
    /// First name in sorted order
    Alphabetical,
}

/// Case-insensitive pattern matched against the player part of an MPRIS bus name
#[derive(Debug, Clone)]
pub struct PlayerSelector {
    pattern: String,
    pub policy: SelectionPolicy,
}

/// A player found on the bus, with its current status
#[derive(Debug, Clone)]
pub struct PlayerCandidate {
    pub bus_name: String,
    pub status: PlaybackStatus,
}

impl PlayerSelector {
    pub fn new(pattern: impl Into<String>, policy: SelectionPolicy) -> Self {
        Self {
            pattern: pattern.into().trim().to_lowercase(),
            policy,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether a bus name belongs to a player this selector accepts.
    ///
    /// An empty pattern accepts every MPRIS player.
    pub fn matches(&self, bus_name: &str) -> bool {
        let Some(player) = bus_name.strip_prefix(MPRIS_PREFIX) else {
            return false;
        };
        self.pattern.is_empty() || player.to_lowercase().contains(&self.pattern)
    }

    /// Pick one candidate according to the policy.
    ///
    /// Ties are logged together with the losing candidates so the choice is
    /// never silent.
    pub fn choose(&self, mut candidates: Vec<PlayerCandidate>) -> Option<PlayerCandidate> {
        candidates.retain(|c| self.matches(&c.bus_name));
        candidates.sort_by(|a, b| a.bus_name.cmp(&b.bus_name));

        let chosen = match self.policy {
            SelectionPolicy::PreferPlaying => candidates
                .iter()
                .find(|c| c.status == PlaybackStatus::Playing)
                .or_else(|| candidates.first())
                .cloned(),
            SelectionPolicy::Alphabetical => candidates.first().cloned(),
        }?;

        if candidates.len() > 1 {
            let others: Vec<&str> = candidates
                .iter()
                .filter(|c| c.bus_name != chosen.bus_name)
                .map(|c| c.bus_name.as_str())
                .collect();
            warn!(
                "{} players match '{}', using {} ({:?}); ignoring {:?}",
                candidates.len(),
                self.pattern,
                chosen.bus_name,
                self.policy,
                others
            );
        }

        Some(chosen)
    }
}

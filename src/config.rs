use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::boundary::DetectorConfig;
use crate::recorder::RecorderConfig;
use crate::session::SessionConfig;
use crate::watcher::{PlayerSelector, SelectionPolicy};

/// Prefix of environment overrides, e.g. `TRACKREC__RECORDER__MIN_SECONDS=10`
pub const ENV_PREFIX: &str = "TRACKREC";

/// Top-level settings loaded from `config.toml`
///
/// Precedence (highest wins): CLI flags, environment variables
/// (`TRACKREC__SECTION__KEY`), the config file, struct defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recorder: RecorderSettings,
    pub routing: RoutingSettings,
    pub player: PlayerSettings,
    pub follow: FollowSettings,
    pub session: SessionSettings,
    pub status: StatusSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecorderSettings {
    /// Where committed files go; `~` is expanded
    pub output_dir: String,
    /// Recordings shorter than this are dropped
    pub min_seconds: u64,
    /// FLAC compression level, 0..=8
    pub compression_level: u8,
    /// Skip tracks whose source URL was already kept
    pub dedupe: bool,
    /// Remember kept URLs across runs in `<output_dir>/.trackrec_index`
    pub persist_index: bool,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            output_dir: "./recordings".to_string(),
            min_seconds: 30,
            compression_level: 5,
            dedupe: false,
            persist_index: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Application whose output is captured (matched against port names)
    pub target: String,
    pub sink_name: String,
    /// Keep hearing the audio while it is recorded
    pub listen: bool,
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            target: "spotify".to_string(),
            sink_name: "trackrec".to_string(),
            listen: true,
            attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerSettings {
    /// MPRIS player name pattern; empty accepts any player
    pub selector: String,
    pub policy: SelectionPolicy,
    /// How long a pause may last before the track counts as ended
    pub pause_grace_ms: u64,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            selector: "spotify".to_string(),
            policy: SelectionPolicy::default(),
            pause_grace_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FollowSettings {
    /// Wait for the application and link ports it creates later
    pub enabled: bool,
    pub poll_interval_ms: u64,
}

impl Default for FollowSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub reconnect_attempts: u32,
    pub reconnect_backoff_ms: u64,
    /// Time the encoder gets to finalize a file before it is killed
    pub stop_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_backoff_ms: 1000,
            stop_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Address for the status HTTP API, e.g. `127.0.0.1:7878`
    pub http_bind: Option<String>,
    /// File rewritten with `KEY=value` lines on every change
    pub status_file: Option<String>,
}

impl Config {
    /// Load from the config file (if any) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build().context("Failed to read configuration")?;
        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.recorder.compression_level > 8 {
            bail!(
                "recorder.compression_level must be 0..=8 (got {})",
                self.recorder.compression_level
            );
        }
        if self.follow.poll_interval_ms == 0 {
            bail!("follow.poll_interval_ms must be >= 1");
        }
        if self.routing.sink_name.trim().is_empty() {
            bail!("routing.sink_name must not be empty");
        }
        if self.routing.target.trim().is_empty() {
            bail!("routing.target must not be empty");
        }
        Ok(())
    }

    /// Output directory with `~` and environment variables expanded
    pub fn output_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.recorder.output_dir)
            .with_context(|| format!("Cannot expand '{}'", self.recorder.output_dir))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Index file for persisted dedupe, when enabled
    pub fn index_file(&self) -> Result<Option<PathBuf>> {
        if !(self.recorder.dedupe && self.recorder.persist_index) {
            return Ok(None);
        }
        Ok(Some(self.output_dir()?.join(".trackrec_index")))
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        let recorder = RecorderConfig {
            output_dir: self.output_dir()?,
            min_duration: Duration::from_secs(self.recorder.min_seconds),
            dedupe: self.recorder.dedupe,
            stop_timeout: Duration::from_millis(self.session.stop_timeout_ms),
        };

        Ok(SessionConfig {
            player: PlayerSelector::new(&self.player.selector, self.player.policy),
            target: self.routing.target.clone(),
            sink_name: self.routing.sink_name.clone(),
            listen: self.routing.listen,
            route_attempts: self.routing.attempts,
            route_retry_delay: Duration::from_millis(self.routing.retry_delay_ms),
            follow: self.follow.enabled,
            follow_poll_interval: Duration::from_millis(self.follow.poll_interval_ms),
            detector: DetectorConfig {
                pause_grace: Duration::from_millis(self.player.pause_grace_ms),
            },
            recorder,
            reconnect_attempts: self.session.reconnect_attempts,
            reconnect_backoff: Duration::from_millis(self.session.reconnect_backoff_ms),
        })
    }
}

/// Config file from `TRACKREC_CONFIG`, else the XDG default
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("TRACKREC_CONFIG") {
        return Some(PathBuf::from(p));
    }
    default_config_path()
}

/// `$XDG_CONFIG_HOME/trackrec/config.toml`, or `~/.config/trackrec/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else {
        env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    };

    config_home.map(|d| d.join("trackrec").join("config.toml"))
}

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;

/// Record what an MPRIS player plays, one tagged FLAC file per track
#[derive(Debug, Parser)]
#[command(name = "trackrec", version)]
pub struct Cli {
    /// Config file (default: $TRACKREC_CONFIG or ~/.config/trackrec/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub out: Option<String>,

    /// MPRIS player to follow (e.g. spotify)
    #[arg(long)]
    pub player: Option<String>,

    /// Application whose audio is captured
    #[arg(long)]
    pub target: Option<String>,

    /// Drop recordings shorter than this
    #[arg(long, value_name = "SECONDS")]
    pub min_seconds: Option<u64>,

    /// FLAC compression level 0..8
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=8))]
    pub comp: Option<u8>,

    /// Keep the audio audible while recording
    #[arg(long, conflicts_with = "no_listen")]
    pub listen: bool,

    /// Record silently
    #[arg(long)]
    pub no_listen: bool,

    /// Skip tracks that were already kept
    #[arg(long)]
    pub dedupe: bool,

    /// Remember kept tracks across runs (with --dedupe)
    #[arg(long)]
    pub persist_index: bool,

    /// Wait for the application and follow streams it creates later
    #[arg(long)]
    pub follow: bool,

    /// Serve the status API on this address (e.g. 127.0.0.1:7878)
    #[arg(long, value_name = "ADDR")]
    pub status_bind: Option<String>,

    /// Keep a KEY=value status file up to date
    #[arg(long, value_name = "PATH")]
    pub status_file: Option<String>,
}

impl Cli {
    /// Override loaded settings with the flags that were given
    pub fn apply(&self, config: &mut Config) {
        if let Some(out) = &self.out {
            config.recorder.output_dir = out.clone();
        }
        if let Some(player) = &self.player {
            config.player.selector = player.clone();
        }
        if let Some(target) = &self.target {
            config.routing.target = target.clone();
        }
        if let Some(min_seconds) = self.min_seconds {
            config.recorder.min_seconds = min_seconds;
        }
        if let Some(comp) = self.comp {
            config.recorder.compression_level = comp;
        }
        if self.listen {
            config.routing.listen = true;
        }
        if self.no_listen {
            config.routing.listen = false;
        }
        if self.dedupe {
            config.recorder.dedupe = true;
        }
        if self.persist_index {
            config.recorder.persist_index = true;
        }
        if self.follow {
            config.follow.enabled = true;
        }
        if let Some(bind) = &self.status_bind {
            config.status.http_bind = Some(bind.clone());
        }
        if let Some(path) = &self.status_file {
            config.status.status_file = Some(path.clone());
        }
    }
}

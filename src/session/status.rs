use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::state::SessionState;
use crate::recorder::{CloseOutcome, DiscardReason};
use crate::watcher::TrackIdentity;

/// How the last segment ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    Keep,
    Drop,
    Skip,
    Lost,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keep => "KEEP",
            Self::Drop => "DROP",
            Self::Skip => "SKIP",
            Self::Lost => "LOST",
        }
    }
}

/// Outcome of the most recent segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastResult {
    pub kind: ResultKind,
    pub track: String,
    pub detail: Option<String>,
    pub duration_secs: Option<f64>,
    pub file: Option<PathBuf>,
}

impl LastResult {
    pub fn skipped(track: String) -> Self {
        Self {
            kind: ResultKind::Skip,
            track,
            detail: Some("already recorded".to_string()),
            duration_secs: None,
            file: None,
        }
    }

    pub fn from_outcome(outcome: &CloseOutcome, track: String) -> Self {
        match outcome {
            CloseOutcome::Committed(committed) => Self {
                kind: ResultKind::Keep,
                track,
                detail: None,
                duration_secs: Some(committed.elapsed.as_secs_f64()),
                file: Some(committed.path.clone()),
            },
            CloseOutcome::Discarded { reason, elapsed, .. } => Self {
                kind: ResultKind::Drop,
                track,
                detail: Some(
                    match reason {
                        DiscardReason::TooShort => "too short",
                        DiscardReason::Duplicate => "duplicate",
                    }
                    .to_string(),
                ),
                duration_secs: Some(elapsed.as_secs_f64()),
                file: None,
            },
            CloseOutcome::Lost { detail, .. } => Self {
                kind: ResultKind::Lost,
                track,
                detail: Some(detail.clone()),
                duration_secs: None,
                file: None,
            },
        }
    }
}

/// Point-in-time view of the recorder
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub session_id: Option<String>,
    pub state: SessionState,
    /// Player currently followed
    pub player: Option<String>,
    /// Identity of the track being recorded
    pub track: Option<TrackIdentity>,
    pub title: Option<String>,
    pub artist: Option<String>,
    /// Tentative output file of the open segment
    pub file: Option<PathBuf>,
    pub recording_since: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub route_live: bool,
    pub segments_committed: usize,
    pub segments_discarded: usize,
    pub segments_lost: usize,
    pub last_result: Option<LastResult>,
}

impl StatusSnapshot {
    /// Render as `KEY=value` lines for the status file
    pub fn to_key_values(&self) -> String {
        let mut out = String::new();
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();

        let _ = writeln!(out, "STATE={}", self.state);
        let _ = writeln!(out, "SESSION={}", opt(&self.session_id));
        let _ = writeln!(out, "PLAYER={}", opt(&self.player));
        let _ = writeln!(out, "ARTIST={}", opt(&self.artist));
        let _ = writeln!(out, "TITLE={}", opt(&self.title));
        let _ = writeln!(
            out,
            "FILE={}",
            self.file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        let _ = writeln!(
            out,
            "STARTED_AT={}",
            self.recording_since
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        );
        let _ = writeln!(out, "ELAPSED={:.1}", self.elapsed_secs);
        let _ = writeln!(out, "ROUTE_LIVE={}", self.route_live);
        let _ = writeln!(out, "COMMITTED={}", self.segments_committed);

        if let Some(last) = &self.last_result {
            let _ = writeln!(out, "LAST_RESULT={}", last.kind.as_str());
            let _ = writeln!(out, "LAST_TRACK={}", last.track);
            let _ = writeln!(
                out,
                "LAST_DURATION={}",
                last.duration_secs
                    .map(|d| format!("{:.1}", d))
                    .unwrap_or_default()
            );
            let _ = writeln!(
                out,
                "LAST_FILE={}",
                last.file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }

        out
    }
}

/// Publishes status snapshots
///
/// `snapshot()` answers on-demand queries; `subscribe()` yields a receiver
/// that is notified on every change.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot with the elapsed time brought up to date
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut snapshot = self.tx.borrow().clone();
        if let Some(since) = snapshot.recording_since {
            let elapsed = Utc::now().signed_duration_since(since);
            snapshot.elapsed_secs = elapsed.num_milliseconds().max(0) as f64 / 1000.0;
        }
        snapshot
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Apply `f` and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        self.tx.send_modify(f);
    }
}

/// Keep a `KEY=value` status file in sync with the reporter
pub fn spawn_status_file_writer(status: &StatusReporter, path: PathBuf) -> JoinHandle<()> {
    let mut rx = status.subscribe();

    tokio::spawn(async move {
        loop {
            let contents = rx.borrow_and_update().to_key_values();
            if let Err(e) = write_atomic(&path, &contents).await {
                warn!("Failed to write status file {}: {}", path.display(), e);
            }

            if rx.changed().await.is_err() {
                debug!("Status reporter closed; status file writer stopping");
                break;
            }
        }
    })
}

async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

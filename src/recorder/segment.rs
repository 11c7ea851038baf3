use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::encoder::{EncodeRequest, Encoder, EncoderHandle, StopOutcome};
use super::naming::{partial_path, unique_path, PARTIAL_DIR};
use super::registry::SeenTrackRegistry;
use super::tags;
use super::SegmentId;
use crate::boundary::TrackStart;
use crate::error::RecorderError;
use crate::session::SessionEvent;
use crate::watcher::{TrackIdentity, TrackTags};

// Unique across every session of the process so late encoder exits can be
// matched to the segment they belong to
static NEXT_SEGMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Segment recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory committed files are written to
    pub output_dir: PathBuf,
    /// Segments shorter than this are discarded
    pub min_duration: Duration,
    /// Skip tracks whose source URL was already committed
    pub dedupe: bool,
    /// How long the encoder gets to finalize before it is killed
    pub stop_timeout: Duration,
}

impl RecorderConfig {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            min_duration: Duration::from_secs(30),
            dedupe: false,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

/// One track's recording in progress
#[derive(Debug)]
pub struct TrackSegment {
    pub id: SegmentId,
    pub identity: TrackIdentity,
    pub tags: TrackTags,
    pub started_at: Instant,
    pub started_wall: DateTime<Utc>,
    /// Tentative output file while recording
    pub output_path: PathBuf,
    encoder: EncoderHandle,
}

impl TrackSegment {
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Result of `SegmentRecorder::open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened(SegmentId),
    /// Track was committed before; nothing is recorded
    SkippedDuplicate,
}

/// A recording that was kept
#[derive(Debug, Clone, Serialize)]
pub struct CommittedTrack {
    pub identity: TrackIdentity,
    pub tags: TrackTags,
    pub path: PathBuf,
    pub elapsed: Duration,
    /// Duration of the written audio, when the file could be read back
    pub measured: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    TooShort,
    Duplicate,
}

/// Result of closing a segment
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    Committed(CommittedTrack),
    Discarded {
        identity: TrackIdentity,
        reason: DiscardReason,
        elapsed: Duration,
    },
    /// Encoder failed; the partial output was removed
    Lost {
        identity: TrackIdentity,
        detail: String,
    },
}

impl CloseOutcome {
    pub fn identity(&self) -> &TrackIdentity {
        match self {
            Self::Committed(track) => &track.identity,
            Self::Discarded { identity, .. } | Self::Lost { identity, .. } => identity,
        }
    }
}

/// Owns the lifecycle of at most one open segment
pub struct SegmentRecorder {
    config: RecorderConfig,
    encoder: Arc<dyn Encoder>,
    registry: SeenTrackRegistry,
    events: mpsc::Sender<SessionEvent>,
    current: Option<TrackSegment>,
}

impl SegmentRecorder {
    pub fn new(
        config: RecorderConfig,
        encoder: Arc<dyn Encoder>,
        registry: SeenTrackRegistry,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            encoder,
            registry,
            events,
            current: None,
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn current(&self) -> Option<&TrackSegment> {
        self.current.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Start recording `start` from `source`.
    ///
    /// The caller closes the previous segment first. If one is still open it
    /// is closed here and its outcome logged.
    pub async fn open(
        &mut self,
        start: &TrackStart,
        source: &str,
    ) -> Result<OpenOutcome, RecorderError> {
        if let Some(prior) = self.current.as_ref() {
            error!(
                "Segment {} still open while starting '{}'; closing it first",
                prior.id,
                start.tags.display_name()
            );
            self.close().await?;
        }

        if self.config.dedupe {
            if let Some(url) = start.tags.source_url() {
                if self.registry.contains(url) {
                    info!("SKIP (already recorded): {}", start.tags.display_name());
                    return Ok(OpenOutcome::SkippedDuplicate);
                }
            }
        }

        let partial_dir = self.config.output_dir.join(PARTIAL_DIR);
        tokio::fs::create_dir_all(&partial_dir)
            .await
            .map_err(|e| RecorderError::io(&partial_dir, e))?;

        let id = NEXT_SEGMENT_ID.fetch_add(1, Ordering::Relaxed);
        let started_wall = Utc::now();
        let output_path = partial_path(
            &self.config.output_dir,
            &start.tags.display_name(),
            started_wall,
            id,
            self.encoder.extension(),
        );

        let encoder = self.encoder.spawn(
            EncodeRequest {
                segment: id,
                source: source.to_string(),
                output: output_path.clone(),
            },
            self.events.clone(),
        )?;

        info!("REC -> {} [segment {}]", start.tags.display_name(), id);

        self.current = Some(TrackSegment {
            id,
            identity: start.identity.clone(),
            tags: start.tags.clone(),
            started_at: Instant::now(),
            started_wall,
            output_path,
            encoder,
        });

        Ok(OpenOutcome::Opened(id))
    }

    /// Stop the open segment and either commit or discard it.
    ///
    /// Returns `Ok(None)` when nothing was open.
    pub async fn close(&mut self) -> Result<Option<CloseOutcome>, RecorderError> {
        let Some(mut segment) = self.current.take() else {
            return Ok(None);
        };

        // Taken before stopping: finalizing the file is not recorded audio
        let elapsed = segment.elapsed();
        let stop = segment.encoder.stop(self.config.stop_timeout).await;

        if !stop.is_clean() {
            let detail = match stop {
                StopOutcome::Failed(detail) => format!("encoder failed: {}", detail),
                StopOutcome::Forced => "encoder killed after stop timeout".to_string(),
                _ => "encoder exited unexpectedly".to_string(),
            };
            warn!("LOST {} ({})", segment.tags.display_name(), detail);
            remove_partial(&segment.output_path).await;
            return Ok(Some(CloseOutcome::Lost {
                identity: segment.identity,
                detail,
            }));
        }

        let measured = measure(&segment.output_path).await;
        let recorded = measured.unwrap_or(elapsed);

        if recorded < self.config.min_duration {
            info!(
                "DROP (too short: {:.1}s < {:.1}s): {}",
                recorded.as_secs_f64(),
                self.config.min_duration.as_secs_f64(),
                segment.tags.display_name()
            );
            remove_partial(&segment.output_path).await;
            return Ok(Some(CloseOutcome::Discarded {
                identity: segment.identity,
                reason: DiscardReason::TooShort,
                elapsed: recorded,
            }));
        }

        // Another session may have committed the same track meanwhile
        if self.config.dedupe {
            if let Some(url) = segment.tags.source_url() {
                if self.registry.contains(url) {
                    info!("DROP (duplicate): {}", segment.tags.display_name());
                    remove_partial(&segment.output_path).await;
                    return Ok(Some(CloseOutcome::Discarded {
                        identity: segment.identity,
                        reason: DiscardReason::Duplicate,
                        elapsed,
                    }));
                }
            }
        }

        let committed = self.commit(segment, elapsed, measured).await?;
        Ok(Some(CloseOutcome::Committed(committed)))
    }

    /// Handle an encoder that exited on its own.
    ///
    /// Ignored unless `segment` is the one currently open.
    pub async fn lose(&mut self, segment: SegmentId, detail: &str) -> Option<CloseOutcome> {
        if self.current.as_ref().map(|s| s.id) != Some(segment) {
            debug!("Ignoring exit of stale encoder for segment {}", segment);
            return None;
        }

        let mut lost = self.current.take()?;
        // Lets the supervisor task finish
        let _ = lost.encoder.stop(self.config.stop_timeout).await;

        warn!("LOST {} (encoder exited: {})", lost.tags.display_name(), detail);
        remove_partial(&lost.output_path).await;

        Some(CloseOutcome::Lost {
            identity: lost.identity,
            detail: detail.to_string(),
        })
    }

    async fn commit(
        &self,
        segment: TrackSegment,
        elapsed: Duration,
        measured: Option<Duration>,
    ) -> Result<CommittedTrack, RecorderError> {
        let tagged_path = segment.output_path.clone();
        let tags = segment.tags.clone();

        match tokio::task::spawn_blocking(move || tags::write_tags(&tagged_path, &tags)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Could not tag {}: {}", segment.output_path.display(), e),
            Err(e) => warn!("Tagging task failed: {}", e),
        }

        let final_path = unique_path(
            &self.config.output_dir,
            &segment.tags.display_name(),
            self.encoder.extension(),
        );

        tokio::fs::rename(&segment.output_path, &final_path)
            .await
            .map_err(|e| RecorderError::io(&segment.output_path, e))?;

        if let Some(url) = segment.tags.source_url() {
            self.registry.insert(url);
        }

        info!(
            "KEEP ({:.1}s): {}",
            elapsed.as_secs_f64(),
            final_path.display()
        );

        Ok(CommittedTrack {
            identity: segment.identity,
            tags: segment.tags,
            path: final_path,
            elapsed,
            measured,
        })
    }
}

/// Duration of the audio actually written, if the file can be parsed
async fn measure(path: &Path) -> Option<Duration> {
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || tags::read_duration(&path)).await {
        Ok(Ok(duration)) => Some(duration),
        Ok(Err(e)) => {
            debug!("Could not measure recording: {}", e);
            None
        }
        Err(e) => {
            warn!("Measuring task failed: {}", e);
            None
        }
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

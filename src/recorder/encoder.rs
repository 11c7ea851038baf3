use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::SegmentId;
use crate::error::RecorderError;
use crate::session::{EncoderExit, SessionEvent};

/// What an encoder should capture and where to write it
#[derive(Debug, Clone)]
pub struct EncodeRequest {
    pub segment: SegmentId,
    /// Capture source (monitor of the session sink)
    pub source: String,
    pub output: PathBuf,
}

/// Result of asking a running encoder to stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Finished and flushed its output
    Clean,
    /// Exited with an error after being asked to stop
    Failed(String),
    /// Did not stop within the timeout and was killed
    Forced,
    /// Had already exited before the stop request
    AlreadyExited { success: bool },
}

impl StopOutcome {
    /// Whether the output file can be trusted
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean | Self::AlreadyExited { success: true })
    }
}

/// Starts one encoder process per segment
///
/// Implementations must report an exit that was not requested through
/// `EncoderHandle::stop` as `SessionEvent::EncoderExited` on `events`.
pub trait Encoder: Send + Sync {
    /// File extension of the produced files
    fn extension(&self) -> &str;

    fn spawn(
        &self,
        request: EncodeRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<EncoderHandle, RecorderError>;
}

/// Stop request delivered to whoever supervises the encoder
#[derive(Debug)]
pub struct StopRequest {
    timeout: Duration,
    reply: oneshot::Sender<StopOutcome>,
}

impl StopRequest {
    /// How long a graceful stop may take before the encoder is killed
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn reply(self, outcome: StopOutcome) {
        let _ = self.reply.send(outcome);
    }
}

/// Receiving side of an `EncoderHandle`
#[derive(Debug)]
pub struct StopSignal {
    rx: Option<oneshot::Receiver<StopRequest>>,
}

impl StopSignal {
    /// Wait for a stop request. `None` means the handle was dropped.
    pub async fn recv(&mut self) -> Option<StopRequest> {
        match self.rx.as_mut() {
            Some(rx) => {
                let request = rx.await.ok();
                self.rx = None;
                request
            }
            None => std::future::pending().await,
        }
    }
}

/// Control handle for a running encoder
#[derive(Debug)]
pub struct EncoderHandle {
    stop_tx: Option<oneshot::Sender<StopRequest>>,
}

impl EncoderHandle {
    /// Create a handle together with the signal its supervisor listens on
    pub fn pair() -> (Self, StopSignal) {
        let (tx, rx) = oneshot::channel();
        (Self { stop_tx: Some(tx) }, StopSignal { rx: Some(rx) })
    }

    /// Ask the encoder to finish; it is killed if it takes longer than `timeout`
    pub async fn stop(&mut self, timeout: Duration) -> StopOutcome {
        let Some(stop_tx) = self.stop_tx.take() else {
            return StopOutcome::AlreadyExited { success: false };
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = StopRequest {
            timeout,
            reply: reply_tx,
        };

        if stop_tx.send(request).is_err() {
            return StopOutcome::AlreadyExited { success: false };
        }

        reply_rx
            .await
            .unwrap_or(StopOutcome::AlreadyExited { success: false })
    }
}

/// FLAC encoder running `ffmpeg` against a PulseAudio/PipeWire source
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    compression_level: u8,
}

impl FfmpegEncoder {
    pub fn new(compression_level: u8) -> Self {
        Self {
            program: "ffmpeg".to_string(),
            compression_level: compression_level.min(8),
        }
    }

    /// Use a different ffmpeg binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn args(&self, source: &str, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostats".into(),
            "-f".into(),
            "pulse".into(),
            "-i".into(),
            source.into(),
            "-acodec".into(),
            "flac".into(),
            "-compression_level".into(),
            self.compression_level.to_string(),
            "-y".into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

impl Encoder for FfmpegEncoder {
    fn extension(&self) -> &str {
        "flac"
    }

    fn spawn(
        &self,
        request: EncodeRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<EncoderHandle, RecorderError> {
        let args = self.args(&request.source, &request.output);
        debug!("Running: {} {}", self.program, args.join(" "));

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Own process group: a terminal Ctrl-C must reach only us, so the
        // segment can still be finalized with "q" while draining
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .map_err(|e| RecorderError::EncoderSpawn(format!("{}: {}", self.program, e)))?;

        info!(
            "Encoder started for segment {} (pid {:?})",
            request.segment,
            child.id()
        );

        let (handle, stop) = EncoderHandle::pair();
        tokio::spawn(supervise(child, request.segment, stop, events));

        Ok(handle)
    }
}

/// Own the child process until it exits or is asked to stop
async fn supervise(
    mut child: Child,
    segment: SegmentId,
    mut stop: StopSignal,
    events: mpsc::Sender<SessionEvent>,
) {
    tokio::select! {
        status = child.wait() => {
            let (success, detail) = describe(status);
            warn!("Encoder for segment {} exited on its own: {}", segment, detail);

            // Never block here: the orchestrator may be waiting on our stop reply
            let exit = SessionEvent::EncoderExited(EncoderExit {
                segment,
                success,
                detail,
            });
            if let Err(e) = events.try_send(exit) {
                warn!("Could not report encoder exit for segment {}: {}", segment, e);
            }

            // Still answer a late stop request
            if let Some(request) = stop.recv().await {
                request.reply(StopOutcome::AlreadyExited { success });
            }
        }
        request = stop.recv() => {
            match request {
                Some(request) => {
                    let outcome = graceful_stop(&mut child, request.timeout()).await;
                    request.reply(outcome);
                }
                None => {
                    // Handle dropped without stopping
                    let _ = child.kill().await;
                }
            }
        }
    }
}

async fn graceful_stop(child: &mut Child, timeout: Duration) -> StopOutcome {
    // "q" on stdin makes ffmpeg finalize the file and exit
    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(b"q").await {
            debug!("Could not write to encoder stdin: {}", e);
        }
        let _ = stdin.flush().await;
    }

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let (success, detail) = describe(status);
            if success {
                StopOutcome::Clean
            } else {
                StopOutcome::Failed(detail)
            }
        }
        Err(_) => {
            warn!("Encoder did not stop within {:?}; killing it", timeout);
            let _ = child.kill().await;
            StopOutcome::Forced
        }
    }
}

fn describe(status: std::io::Result<ExitStatus>) -> (bool, String) {
    match status {
        Ok(status) => (status.success(), status.to_string()),
        Err(e) => (false, format!("wait failed: {}", e)),
    }
}

// Test doubles shared by the integration tests
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use trackrec::error::{RecorderError, RoutingError, WatchError};
use trackrec::recorder::{EncodeRequest, Encoder, EncoderHandle, RecorderConfig, StopOutcome};
use trackrec::routing::{AudioGraph, Port, SinkInfo};
use trackrec::session::{EncoderExit, SessionConfig, SessionEvent, StatusReporter, StatusSnapshot};
use trackrec::watcher::{
    PlaybackObservation, PlaybackSource, PlaybackStatus, PlayerSelector, SelectionPolicy,
    TrackTags, WatchHandle,
};

// ============================================================================
// Audio graph
// ============================================================================

#[derive(Default)]
struct GraphState {
    apps: Vec<String>,
    sinks: HashMap<String, u32>,
    links: HashSet<(Port, Port)>,
    next_module: u32,
    created: usize,
    destroyed: usize,
}

/// In-memory audio graph with stereo application streams
#[derive(Default)]
pub struct FakeGraph {
    state: Mutex<GraphState>,
}

impl FakeGraph {
    pub fn with_app(app: &str) -> Arc<Self> {
        let graph = Self::default();
        graph.add_app(app);
        Arc::new(graph)
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_app(&self, app: &str) {
        self.state.lock().unwrap().apps.push(app.to_string());
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn destroyed(&self) -> usize {
        self.state.lock().unwrap().destroyed
    }

    pub fn live_sinks(&self) -> usize {
        self.state.lock().unwrap().sinks.len()
    }

    pub fn link_count(&self) -> usize {
        self.state.lock().unwrap().links.len()
    }
}

fn stereo(node: &str, kind: &str) -> [Port; 2] {
    [
        Port::new(format!("{}:{}_FL", node, kind)),
        Port::new(format!("{}:{}_FR", node, kind)),
    ]
}

impl AudioGraph for FakeGraph {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create_sink(&self, name: &str) -> Result<SinkInfo, RoutingError> {
        let mut state = self.state.lock().unwrap();
        state.next_module += 1;
        state.created += 1;
        let module_id = state.next_module;
        state.sinks.insert(name.to_string(), module_id);
        Ok(SinkInfo {
            name: name.to_string(),
            module_id,
        })
    }

    fn destroy_sink(&self, sink: &SinkInfo) -> Result<(), RoutingError> {
        let mut state = self.state.lock().unwrap();
        state.destroyed += 1;
        state.sinks.remove(&sink.name);
        Ok(())
    }

    fn output_ports(&self) -> Result<Vec<Port>, RoutingError> {
        let state = self.state.lock().unwrap();
        let mut ports = Vec::new();
        for app in &state.apps {
            ports.extend(stereo(app, "output"));
        }
        for sink in state.sinks.keys() {
            ports.extend(stereo(sink, "monitor"));
        }
        Ok(ports)
    }

    fn input_ports(&self) -> Result<Vec<Port>, RoutingError> {
        let state = self.state.lock().unwrap();
        let mut ports: Vec<Port> = stereo("speakers", "playback").into();
        for sink in state.sinks.keys() {
            ports.extend(stereo(sink, "playback"));
        }
        Ok(ports)
    }

    fn default_sink(&self) -> Result<String, RoutingError> {
        Ok("speakers".to_string())
    }

    fn link(&self, output: &Port, input: &Port) -> Result<(), RoutingError> {
        self.state
            .lock()
            .unwrap()
            .links
            .insert((output.clone(), input.clone()));
        Ok(())
    }

    fn unlink(&self, output: &Port, input: &Port) -> Result<(), RoutingError> {
        self.state
            .lock()
            .unwrap()
            .links
            .remove(&(output.clone(), input.clone()));
        Ok(())
    }
}

// ============================================================================
// Encoder
// ============================================================================

const SAMPLE_RATE: u32 = 8000;

/// Encoder that writes a silent WAV file as long as the segment lasted
#[derive(Default)]
pub struct FakeEncoder {
    spawned: AtomicUsize,
    refuse: AtomicBool,
    fail_on: Mutex<HashSet<usize>>,
    finished: Arc<Mutex<Vec<PathBuf>>>,
    /// Time taken to acknowledge a stop after the file is written
    finalize_delay: Duration,
    /// Upper bound on the audio written, whatever the segment length
    audio_cap: Option<Duration>,
}

impl FakeEncoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The `nth` spawned encoder (1-based) dies shortly after starting
    pub fn failing_on(nth: usize) -> Arc<Self> {
        let encoder = Self::default();
        encoder.fail_on.lock().unwrap().insert(nth);
        Arc::new(encoder)
    }

    /// Every spawn fails, as if the binary were missing
    pub fn refusing() -> Arc<Self> {
        let encoder = Self::default();
        encoder.refuse.store(true, Ordering::SeqCst);
        Arc::new(encoder)
    }

    /// Acknowledges every stop only after `delay`
    pub fn slow_finalize(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            finalize_delay: delay,
            ..Self::default()
        })
    }

    /// Never writes more than `cap` of audio, as if capture stalled
    pub fn capped_at(cap: Duration) -> Arc<Self> {
        Arc::new(Self {
            audio_cap: Some(cap),
            ..Self::default()
        })
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Output files of cleanly stopped encoders, in stop order
    pub fn finished(&self) -> Vec<PathBuf> {
        self.finished.lock().unwrap().clone()
    }
}

fn write_wav(path: &Path, length: Duration) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let samples = ((length.as_secs_f64() * SAMPLE_RATE as f64) as u32).max(SAMPLE_RATE / 10);

    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..samples {
        writer.write_sample(0i16)?;
    }
    writer.finalize()?;
    Ok(())
}

impl Encoder for FakeEncoder {
    fn extension(&self) -> &str {
        "wav"
    }

    fn spawn(
        &self,
        request: EncodeRequest,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<EncoderHandle, RecorderError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(RecorderError::EncoderSpawn("fake encoder refused".into()));
        }

        let nth = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        let fails = self.fail_on.lock().unwrap().contains(&nth);

        // Partial output exists from the start, like a real encoder
        std::fs::write(&request.output, b"").map_err(|e| {
            RecorderError::EncoderSpawn(format!("cannot create {:?}: {}", request.output, e))
        })?;

        let (handle, mut stop) = EncoderHandle::pair();
        let finished = Arc::clone(&self.finished);
        let started = Instant::now();
        let finalize_delay = self.finalize_delay;
        let audio_cap = self.audio_cap;

        tokio::spawn(async move {
            if fails {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        let _ = events
                            .send(SessionEvent::EncoderExited(EncoderExit {
                                segment: request.segment,
                                success: false,
                                detail: "exit status: 1".into(),
                            }))
                            .await;
                        if let Some(request) = stop.recv().await {
                            request.reply(StopOutcome::AlreadyExited { success: false });
                        }
                    }
                    request = stop.recv() => {
                        if let Some(request) = request {
                            request.reply(StopOutcome::Failed("exit status: 1".into()));
                        }
                    }
                }
                return;
            }

            if let Some(request_stop) = stop.recv().await {
                let mut length = started.elapsed();
                if let Some(cap) = audio_cap {
                    length = length.min(cap);
                }
                let written = write_wav(&request.output, length);
                tokio::time::sleep(finalize_delay).await;

                let outcome = match written {
                    Ok(()) => {
                        finished.lock().unwrap().push(request.output.clone());
                        StopOutcome::Clean
                    }
                    Err(e) => StopOutcome::Failed(e.to_string()),
                };
                request_stop.reply(outcome);
            }
        });

        Ok(handle)
    }
}

// ============================================================================
// Playback source
// ============================================================================

#[derive(Debug, Clone)]
pub enum Step {
    Observe(PlaybackStatus, TrackTags),
    Wait(Duration),
    /// End the subscription with `SourceLost`
    Lose(String),
}

pub fn play(tags: TrackTags) -> Step {
    Step::Observe(PlaybackStatus::Playing, tags)
}

pub fn pause(tags: TrackTags) -> Step {
    Step::Observe(PlaybackStatus::Paused, tags)
}

pub fn stop() -> Step {
    Step::Observe(PlaybackStatus::Stopped, TrackTags::default())
}

pub fn wait_ms(ms: u64) -> Step {
    Step::Wait(Duration::from_millis(ms))
}

/// Plays one script per subscription; fails to subscribe once they run out
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    subscriptions: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            subscriptions: AtomicUsize::new(0),
        })
    }

    pub fn subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackSource for ScriptedSource {
    async fn subscribe(
        &self,
        selector: &PlayerSelector,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<WatchHandle, WatchError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WatchError::NoPlayer(selector.pattern().to_string()))?;
        self.subscriptions.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            for step in script {
                match step {
                    Step::Observe(status, tags) => {
                        let observation = PlaybackObservation::new(status, tags, Instant::now());
                        if events.send(SessionEvent::Observation(observation)).await.is_err() {
                            return;
                        }
                    }
                    Step::Wait(duration) => tokio::time::sleep(duration).await,
                    Step::Lose(reason) => {
                        let _ = events.send(SessionEvent::SourceLost { reason }).await;
                        return;
                    }
                }
            }
        });

        Ok(WatchHandle::new("org.mpris.MediaPlayer2.scripted", task))
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn track(title: &str, url: &str) -> TrackTags {
    TrackTags {
        title: title.to_string(),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        track_number: Some(1),
        source_url: Some(url.to_string()),
        ..Default::default()
    }
}

pub fn session_config(output_dir: &Path) -> SessionConfig {
    let mut recorder = RecorderConfig::new(output_dir.to_path_buf());
    recorder.min_duration = Duration::ZERO;
    recorder.stop_timeout = Duration::from_secs(2);

    SessionConfig {
        player: PlayerSelector::new("scripted", SelectionPolicy::Alphabetical),
        target: "spotify".to_string(),
        sink_name: "trackrec_test".to_string(),
        listen: false,
        route_attempts: 1,
        route_retry_delay: Duration::from_millis(10),
        follow: false,
        follow_poll_interval: Duration::from_millis(20),
        recorder,
        reconnect_attempts: 0,
        reconnect_backoff: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Files directly in `dir`, sorted by name
pub fn committed_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Files left in the partial directory
pub fn partial_files(dir: &Path) -> Vec<String> {
    committed_files(&dir.join(trackrec::recorder::PARTIAL_DIR))
}

/// Wait until the status satisfies `pred`, failing after `timeout`
pub async fn wait_for_status(
    status: &StatusReporter,
    timeout: Duration,
    pred: impl Fn(&StatusSnapshot) -> bool,
) -> Result<StatusSnapshot> {
    let mut rx = status.subscribe();
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        {
            let snapshot = rx.borrow_and_update().clone();
            if pred(&snapshot) {
                return Ok(snapshot);
            }
        }
        match tokio::time::timeout_at(deadline, rx.changed()).await {
            Ok(Ok(())) => continue,
            Ok(Err(_)) => anyhow::bail!("status reporter closed"),
            Err(_) => anyhow::bail!(
                "timed out waiting for status; last: {:?}",
                status.snapshot()
            ),
        }
    }
}

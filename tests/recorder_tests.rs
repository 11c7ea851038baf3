// Integration tests for the segment recorder
//
// A fake encoder writes real WAV files so committed output can be tagged and
// read back with lofty.

mod common;

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

use common::*;
use trackrec::boundary::TrackStart;
use trackrec::recorder::{
    read_tags, CloseOutcome, DiscardReason, OpenOutcome, RecorderConfig, SeenTrackRegistry,
    SegmentRecorder,
};
use trackrec::session::SessionEvent;
use trackrec::watcher::{TrackIdentity, TrackTags};

const SOURCE: &str = "trackrec_test.monitor";

fn start(tags: TrackTags) -> TrackStart {
    TrackStart {
        identity: TrackIdentity::from_tags(&tags).unwrap(),
        tags,
    }
}

fn config(dir: &Path) -> RecorderConfig {
    let mut config = RecorderConfig::new(dir.to_path_buf());
    config.min_duration = Duration::ZERO;
    config.stop_timeout = Duration::from_secs(2);
    config
}

fn recorder(
    config: RecorderConfig,
    encoder: Arc<FakeEncoder>,
    registry: SeenTrackRegistry,
) -> (SegmentRecorder, mpsc::Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel(16);
    (SegmentRecorder::new(config, encoder, registry, tx), rx)
}

#[tokio::test]
async fn test_commit_writes_tags_and_registers_url() -> Result<()> {
    let out = TempDir::new()?;
    let registry = SeenTrackRegistry::new();
    let encoder = FakeEncoder::new();
    let (mut recorder, _rx) = recorder(config(out.path()), encoder.clone(), registry.clone());

    let outcome = recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?;
    assert!(matches!(outcome, OpenOutcome::Opened(_)));
    assert!(recorder.is_open());
    assert_eq!(partial_files(out.path()).len(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let Some(CloseOutcome::Committed(committed)) = recorder.close().await? else {
        panic!("expected a committed segment");
    };
    assert!(!recorder.is_open());

    assert_eq!(committed.path, out.path().join("Artist - Song.wav"));
    assert!(committed.elapsed >= Duration::from_millis(200));
    let measured = committed.measured.expect("written file has a duration");
    assert!(measured >= Duration::from_millis(150));

    let (tags, _) = read_tags(&committed.path)?;
    assert_eq!(tags.title, "Song");
    assert_eq!(tags.artist, "Artist");
    assert_eq!(tags.album, "Album");
    assert_eq!(tags.track_number, Some(1));
    assert_eq!(tags.source_url.as_deref(), Some("https://tracks.test/u1"));

    assert!(registry.contains("https://tracks.test/u1"));
    assert!(partial_files(out.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_short_segment_is_discarded() -> Result<()> {
    let out = TempDir::new()?;
    let mut config = config(out.path());
    config.min_duration = Duration::from_secs(30);

    let registry = SeenTrackRegistry::new();
    let (mut recorder, _rx) = recorder(config, FakeEncoder::new(), registry.clone());

    recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?;
    let outcome = recorder.close().await?;

    assert!(matches!(
        outcome,
        Some(CloseOutcome::Discarded {
            reason: DiscardReason::TooShort,
            ..
        })
    ));
    assert!(committed_files(out.path()).is_empty());
    assert!(partial_files(out.path()).is_empty());
    // Dropped recordings do not count as seen
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_close_without_segment_is_noop() -> Result<()> {
    let out = TempDir::new()?;
    let encoder = FakeEncoder::new();
    let (mut recorder, _rx) = recorder(config(out.path()), encoder, SeenTrackRegistry::new());

    assert!(recorder.close().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_skipped_at_open() -> Result<()> {
    let out = TempDir::new()?;
    let mut config = config(out.path());
    config.dedupe = true;

    let encoder = FakeEncoder::new();
    let (mut recorder, _rx) = recorder(config, encoder.clone(), SeenTrackRegistry::new());
    let song = start(track("Song", "https://tracks.test/u1"));

    recorder.open(&song, SOURCE).await?;
    assert!(matches!(
        recorder.close().await?,
        Some(CloseOutcome::Committed(_))
    ));

    let outcome = recorder.open(&song, SOURCE).await?;
    assert_eq!(outcome, OpenOutcome::SkippedDuplicate);
    assert!(!recorder.is_open());
    assert_eq!(encoder.spawned(), 1);
    assert_eq!(committed_files(out.path()), vec!["Artist - Song.wav".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_discarded_at_close_across_recorders() -> Result<()> {
    let out = TempDir::new()?;
    let mut config = config(out.path());
    config.dedupe = true;

    let registry = SeenTrackRegistry::new();
    let (mut first, _rx1) = recorder(config.clone(), FakeEncoder::new(), registry.clone());
    let (mut second, _rx2) = recorder(config, FakeEncoder::new(), registry.clone());
    let song = start(track("Song", "https://tracks.test/u1"));

    // Both start before either has committed
    first.open(&song, SOURCE).await?;
    second.open(&song, SOURCE).await?;

    assert!(matches!(first.close().await?, Some(CloseOutcome::Committed(_))));
    assert!(matches!(
        second.close().await?,
        Some(CloseOutcome::Discarded {
            reason: DiscardReason::Duplicate,
            ..
        })
    ));

    assert_eq!(committed_files(out.path()), vec!["Artist - Song.wav".to_string()]);
    assert!(partial_files(out.path()).is_empty());
    assert_eq!(registry.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_same_name_gets_counter_without_dedupe() -> Result<()> {
    let out = TempDir::new()?;
    let encoder = FakeEncoder::new();
    let (mut recorder, _rx) = recorder(config(out.path()), encoder, SeenTrackRegistry::new());
    let song = start(track("Song", "https://tracks.test/u1"));

    for _ in 0..2 {
        recorder.open(&song, SOURCE).await?;
        recorder.close().await?;
    }

    assert_eq!(
        committed_files(out.path()),
        vec![
            "Artist - Song (2).wav".to_string(),
            "Artist - Song.wav".to_string()
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_open_closes_a_forgotten_segment() -> Result<()> {
    let out = TempDir::new()?;
    let encoder = FakeEncoder::new();
    let (mut recorder, _rx) = recorder(config(out.path()), encoder, SeenTrackRegistry::new());

    recorder
        .open(&start(track("A", "https://tracks.test/u1")), SOURCE)
        .await?;
    recorder
        .open(&start(track("B", "https://tracks.test/u2")), SOURCE)
        .await?;
    recorder.close().await?;

    assert_eq!(
        committed_files(out.path()),
        vec!["Artist - A.wav".to_string(), "Artist - B.wav".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_encoder_exit_loses_segment() -> Result<()> {
    let out = TempDir::new()?;
    let registry = SeenTrackRegistry::new();
    let encoder = FakeEncoder::failing_on(1);
    let (mut recorder, mut rx) = recorder(config(out.path()), encoder, registry.clone());

    let OpenOutcome::Opened(id) = recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?
    else {
        panic!("segment should open");
    };

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await?
        .expect("encoder exit is reported");
    let SessionEvent::EncoderExited(exit) = event else {
        panic!("unexpected event: {:?}", event);
    };
    assert_eq!(exit.segment, id);
    assert!(!exit.success);

    // An exit for some other segment is ignored
    assert!(recorder.lose(id + 1000, "stale").await.is_none());
    assert!(recorder.is_open());

    let outcome = recorder.lose(exit.segment, &exit.detail).await;
    assert!(matches!(outcome, Some(CloseOutcome::Lost { .. })));
    assert!(!recorder.is_open());

    // Reported twice, handled once
    assert!(recorder.lose(exit.segment, &exit.detail).await.is_none());

    assert!(partial_files(out.path()).is_empty());
    assert!(committed_files(out.path()).is_empty());
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_stop_is_lost() -> Result<()> {
    let out = TempDir::new()?;
    let encoder = FakeEncoder::failing_on(1);
    let (mut recorder, _rx) = recorder(config(out.path()), encoder, SeenTrackRegistry::new());

    recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?;
    // Stopped before the encoder reports its own failure
    let outcome = recorder.close().await?;

    let Some(CloseOutcome::Lost { identity, detail }) = outcome else {
        panic!("expected a lost segment, got {:?}", outcome);
    };
    assert_eq!(identity.to_string(), "https://tracks.test/u1");
    assert!(detail.contains("exit status: 1"));
    assert!(partial_files(out.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_finalize_time_does_not_count_towards_minimum() -> Result<()> {
    let out = TempDir::new()?;
    let mut config = config(out.path());
    config.min_duration = Duration::from_millis(300);

    let registry = SeenTrackRegistry::new();
    let encoder = FakeEncoder::slow_finalize(Duration::from_millis(400));
    let (mut recorder, _rx) = recorder(config, encoder, registry.clone());

    recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let outcome = recorder.close().await?;

    let Some(CloseOutcome::Discarded { reason, elapsed, .. }) = outcome else {
        panic!("expected a discarded segment, got {:?}", outcome);
    };
    assert_eq!(reason, DiscardReason::TooShort);
    assert!(elapsed < Duration::from_millis(300));
    assert!(committed_files(out.path()).is_empty());
    assert!(registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_minimum_applies_to_written_audio() -> Result<()> {
    let out = TempDir::new()?;
    let mut config = config(out.path());
    config.min_duration = Duration::from_millis(300);

    // The segment lasts long enough but only 100ms of audio reach the file
    let encoder = FakeEncoder::capped_at(Duration::from_millis(100));
    let (mut recorder, _rx) = recorder(config, encoder, SeenTrackRegistry::new());

    recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    let outcome = recorder.close().await?;

    assert!(matches!(
        outcome,
        Some(CloseOutcome::Discarded {
            reason: DiscardReason::TooShort,
            ..
        })
    ));
    assert!(committed_files(out.path()).is_empty());
    assert!(partial_files(out.path()).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_committed_audio_meets_minimum() -> Result<()> {
    let out = TempDir::new()?;
    let mut config = config(out.path());
    config.min_duration = Duration::from_millis(300);

    let encoder = FakeEncoder::slow_finalize(Duration::from_millis(200));
    let (mut recorder, _rx) = recorder(config, encoder, SeenTrackRegistry::new());

    recorder
        .open(&start(track("Song", "https://tracks.test/u1")), SOURCE)
        .await?;
    tokio::time::sleep(Duration::from_millis(450)).await;

    let Some(CloseOutcome::Committed(committed)) = recorder.close().await? else {
        panic!("expected a committed segment");
    };
    let measured = committed.measured.expect("written file has a duration");
    assert!(measured >= Duration::from_millis(300));
    Ok(())
}

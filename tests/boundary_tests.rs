// Integration tests for track boundary detection
//
// Drives the detector with synthetic observation sequences and checks that
// starts and ends stay balanced.

use std::time::{Duration, Instant};

use trackrec::boundary::{BoundaryDetector, Decision, DetectorConfig, EndReason};
use trackrec::watcher::{PlaybackObservation, PlaybackStatus, TrackIdentity, TrackTags};

#[derive(Debug, Clone, Copy)]
enum Input {
    PlayA,
    PlayB,
    /// Playing with empty metadata, as seen during track switches
    PlayBlank,
    PauseA,
    Stop,
    /// Let time pass and tick
    Idle,
}

const ALPHABET: [Input; 6] = [
    Input::PlayA,
    Input::PlayB,
    Input::PlayBlank,
    Input::PauseA,
    Input::Stop,
    Input::Idle,
];

fn tags(title: &str) -> TrackTags {
    TrackTags {
        title: title.to_string(),
        artist: "Artist".to_string(),
        source_url: Some(format!("https://tracks.test/{}", title)),
        ..Default::default()
    }
}

fn observation(status: PlaybackStatus, tags: TrackTags, at: Instant) -> PlaybackObservation {
    PlaybackObservation::new(status, tags, at)
}

fn apply(detector: &mut BoundaryDetector, input: Input, at: Instant) -> Vec<Decision> {
    match input {
        Input::PlayA => detector.observe(observation(PlaybackStatus::Playing, tags("a"), at)),
        Input::PlayB => detector.observe(observation(PlaybackStatus::Playing, tags("b"), at)),
        Input::PlayBlank => {
            detector.observe(observation(PlaybackStatus::Playing, TrackTags::default(), at))
        }
        Input::PauseA => detector.observe(observation(PlaybackStatus::Paused, tags("a"), at)),
        Input::Stop => {
            detector.observe(observation(PlaybackStatus::Stopped, TrackTags::default(), at))
        }
        Input::Idle => detector.tick(at),
    }
}

/// Every sequence of `len` inputs over the alphabet
fn sequences(len: usize) -> Vec<Vec<Input>> {
    let mut all = vec![Vec::new()];
    for _ in 0..len {
        all = all
            .into_iter()
            .flat_map(|prefix| {
                ALPHABET.iter().map(move |input| {
                    let mut next = prefix.clone();
                    next.push(*input);
                    next
                })
            })
            .collect();
    }
    all
}

fn check_balance(grace: Duration, step: Duration) {
    for sequence in sequences(5) {
        let mut detector = BoundaryDetector::new(DetectorConfig { pause_grace: grace });
        let base = Instant::now();
        let mut open = 0i64;

        for (i, input) in sequence.iter().enumerate() {
            let at = base + step * (i as u32 + 1);
            for decision in apply(&mut detector, *input, at) {
                // An end always comes before the start it is paired with
                open -= decision.ends() as i64;
                assert!(open >= 0, "end without start in {:?}", sequence);
                open += decision.starts() as i64;
                assert!(open <= 1, "two open tracks in {:?}", sequence);
            }
            assert_eq!(
                open,
                detector.active().is_some() as i64,
                "detector and decisions disagree in {:?}",
                sequence
            );
        }

        if let Some(decision) = detector.finish() {
            open -= decision.ends() as i64;
        }
        assert_eq!(open, 0, "unbalanced after finish in {:?}", sequence);
    }
}

#[test]
fn test_starts_and_ends_balance_without_grace() {
    check_balance(Duration::ZERO, Duration::from_millis(100));
}

#[test]
fn test_starts_and_ends_balance_with_grace() {
    // Steps shorter than the grace period, so pauses sometimes expire
    check_balance(Duration::from_millis(250), Duration::from_millis(100));
}

#[test]
fn test_short_pause_blip_keeps_segment() {
    let mut detector = BoundaryDetector::new(DetectorConfig {
        pause_grace: Duration::from_secs(2),
    });
    let t0 = Instant::now();

    let started = apply(&mut detector, Input::PlayA, t0);
    assert!(matches!(started.as_slice(), [Decision::TrackStarted(_)]));

    assert!(apply(&mut detector, Input::PauseA, t0 + Duration::from_secs(1)).is_empty());
    assert_eq!(detector.deadline(), Some(t0 + Duration::from_secs(3)));
    assert!(detector.tick(t0 + Duration::from_millis(1100)).is_empty());

    // Resumed 200ms later: no end/start pair
    assert!(apply(&mut detector, Input::PlayA, t0 + Duration::from_millis(1200)).is_empty());
    assert_eq!(detector.deadline(), None);
    assert!(detector.tick(t0 + Duration::from_secs(10)).is_empty());
    assert!(detector.active().is_some());
}

#[test]
fn test_long_pause_ends_then_resume_starts_again() {
    let mut detector = BoundaryDetector::new(DetectorConfig {
        pause_grace: Duration::from_millis(500),
    });
    let t0 = Instant::now();
    let a = TrackIdentity::from_tags(&tags("a")).unwrap();

    apply(&mut detector, Input::PlayA, t0);
    apply(&mut detector, Input::PauseA, t0 + Duration::from_secs(1));

    // The expired pause is reported before the resume
    let decisions = apply(&mut detector, Input::PlayA, t0 + Duration::from_secs(5));
    assert_eq!(decisions.len(), 2);
    assert_eq!(
        decisions[0],
        Decision::TrackEnded {
            identity: a.clone(),
            reason: EndReason::Paused,
        }
    );
    assert!(matches!(&decisions[1], Decision::TrackStarted(start) if start.identity == a));
}

#[test]
fn test_switch_during_pause_replaces_track() {
    let mut detector = BoundaryDetector::new(DetectorConfig {
        pause_grace: Duration::from_secs(2),
    });
    let t0 = Instant::now();

    apply(&mut detector, Input::PlayA, t0);
    apply(&mut detector, Input::PauseA, t0 + Duration::from_millis(100));
    let decisions = apply(&mut detector, Input::PlayB, t0 + Duration::from_millis(300));

    assert_eq!(decisions.len(), 1);
    let Decision::TrackReplaced { ended, started } = &decisions[0] else {
        panic!("expected a replacement, got {:?}", decisions);
    };
    assert_eq!(ended.to_string(), "https://tracks.test/a");
    assert_eq!(started.tags.title, "b");
}

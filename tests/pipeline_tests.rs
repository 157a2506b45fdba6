//! End-to-end composition tests.

use std::collections::HashMap;

use mix_composer::audio::{generate_sine, generate_stepped_levels, AudioBuffer};
use mix_composer::candidates::TrackSource;
use mix_composer::config::ComposerConfig;
use mix_composer::optimizer::SelectionStrategy;
use mix_composer::pipeline::{AnalysisCache, ComposeError, MixComposer};
use mix_composer::plan::{MixIntentPlan, TrackWindow};
use mix_composer::render::{MemorySink, RenderSettings, WavDirectorySink, MERGED_NAME};
use tempfile::TempDir;

const SAMPLE_RATE: u32 = 8000;

fn song(title: &str, tone_hz: f32) -> TrackSource {
    let samples = generate_stepped_levels(
        &[(20.0, 0.2), (30.0, 0.6), (15.0, 0.3), (25.0, 0.55)],
        tone_hz,
        SAMPLE_RATE,
    );
    TrackSource::new(title, "tester", AudioBuffer::mono(samples, SAMPLE_RATE))
}

fn whisper(title: &str) -> TrackSource {
    // About -63 dBFS: still below -32 after the maximum +8 dB of gain.
    let samples = generate_sine(220.0, SAMPLE_RATE, 90.0, 0.001);
    TrackSource::new(title, "tester", AudioBuffer::mono(samples, SAMPLE_RATE))
}

fn short_loud(title: &str, tone_hz: f32) -> TrackSource {
    let samples = generate_sine(tone_hz, SAMPLE_RATE, 22.0, 0.5);
    TrackSource::new(title, "tester", AudioBuffer::mono(samples, SAMPLE_RATE))
}

fn composer() -> MixComposer {
    MixComposer::new(ComposerConfig::default(), RenderSettings::default())
}

// ===== Approved mixes =====

#[test]
fn test_two_track_mix_is_approved_first_time() {
    let tracks = vec![song("first", 220.0), song("second", 330.0)];
    let mut sink = MemorySink::new();

    let output = composer()
        .compose(&tracks, &MixIntentPlan::default_for(2), None, &mut sink)
        .unwrap();

    assert!(output.review.approved, "reasons: {:?}", output.review.reasons);
    assert_eq!(output.attempts, 1);
    assert_eq!(output.selection_strategy, SelectionStrategy::Optimized);
    assert_eq!(output.segments.len(), 2);
    assert_eq!(output.crossfades_ms.len(), 1);
    assert_eq!(output.timeline[0].candidate.track_index, 0);
    assert_eq!(output.timeline[1].candidate.track_index, 1);
    assert!(output.review.duration_seconds >= output.review.minimum_required_seconds);
    assert_eq!(sink.count_named(MERGED_NAME), 1);
    assert!(sink.get(MERGED_NAME).unwrap().dbfs() >= -32.0);
}

#[test]
fn test_timeline_reports_applied_crossfades() {
    let tracks = vec![song("first", 220.0), song("second", 330.0), song("third", 262.0)];
    let plan = MixIntentPlan {
        global_crossfade_seconds: None,
        ..MixIntentPlan::default_for(3)
    };

    let output = composer().compose(&tracks, &plan, None, &mut MemorySink::new()).unwrap();
    assert_eq!(output.timeline.len(), output.crossfades_ms.len() + 1);
    for (segment, &crossfade_ms) in output.timeline.iter().zip(&output.crossfades_ms) {
        assert_eq!(segment.crossfade_to_next_ms, crossfade_ms);
    }
    assert_eq!(output.timeline.last().unwrap().crossfade_to_next_ms, 0);
}

#[test]
fn test_compose_is_deterministic() {
    let tracks = vec![song("first", 220.0), song("second", 330.0), song("third", 262.0)];
    let plan = MixIntentPlan::default_for(3);

    let first = composer().compose(&tracks, &plan, None, &mut MemorySink::new()).unwrap();
    let serial = MixComposer::new(
        ComposerConfig {
            parallel_analysis: false,
            ..ComposerConfig::default()
        },
        RenderSettings::default(),
    );
    let second = serial.compose(&tracks, &plan, None, &mut MemorySink::new()).unwrap();

    assert_eq!(first.timeline, second.timeline);
    assert_eq!(first.crossfades_ms, second.crossfades_ms);
}

#[test]
fn test_forced_window_reaches_the_mix() {
    let tracks = vec![song("first", 220.0), song("second", 330.0)];
    let plan = MixIntentPlan {
        track_windows: vec![TrackWindow {
            track_index: 1,
            start_seconds: Some(30.0),
            end_seconds: Some(60.0),
        }],
        ..MixIntentPlan::default_for(2)
    };

    let output = composer().compose(&tracks, &plan, None, &mut MemorySink::new()).unwrap();
    let forced = &output.timeline[1].candidate;
    assert_eq!(forced.track_index, 1);
    assert!(forced.start_ms.abs_diff(30_000) <= forced.beat_interval_ms as u64);
    assert!(forced.end_ms.abs_diff(60_000) <= forced.beat_interval_ms as u64);
}

#[test]
fn test_preference_hint_is_honored() {
    let tracks = vec![song("first", 220.0), song("second", 330.0)];
    let composer = MixComposer::new(
        ComposerConfig {
            selection_stickiness: 3.0,
            optimizer_enabled: false,
            ..ComposerConfig::default()
        },
        RenderSettings::default(),
    );
    let hint: HashMap<usize, String> = HashMap::from([(0, "t0c2".to_string())]);

    let output = composer
        .compose(&tracks, &MixIntentPlan::default_for(2), Some(&hint), &mut MemorySink::new())
        .unwrap();
    assert_eq!(output.selection_strategy, SelectionStrategy::Greedy);
    assert_eq!(output.timeline[0].candidate.candidate_id, "t0c2");
}

#[test]
fn test_mix_written_as_wav() {
    let dir = TempDir::new().unwrap();
    let mut sink = WavDirectorySink::new(dir.path()).unwrap();
    let tracks = vec![song("first", 220.0), song("second", 330.0)];

    let output = composer()
        .compose(&tracks, &MixIntentPlan::default_for(2), None, &mut sink)
        .unwrap();
    assert_eq!(output.merged.path, Some(dir.path().join("mix.wav")));
    assert!(dir.path().join("segment_0.wav").exists());
    assert!(dir.path().join("segment_1.wav").exists());
}

// ===== Review and recovery =====

#[test]
fn test_quiet_mix_retries_once_then_fails() {
    let tracks = vec![whisper("hush"), whisper("murmur")];
    let mut sink = MemorySink::new();

    let err = composer()
        .compose(&tracks, &MixIntentPlan::default_for(2), None, &mut sink)
        .unwrap_err();

    match err {
        ComposeError::Rejected { reasons, attempts } => {
            assert_eq!(attempts, 2);
            assert!(reasons.iter().any(|r| r.contains("loudness")), "reasons: {:?}", reasons);
            assert!(reasons.iter().any(|r| r.starts_with("attempt 2: ")));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(sink.count_named(MERGED_NAME), 2);
    // The recovery plan asks for at least 180 s.
    assert!(sink.get(MERGED_NAME).unwrap().duration_ms() >= 150_000);
}

#[test]
fn test_short_mix_recovers_on_second_attempt() {
    // 2 x 22 s cannot reach the 50 s minimum for two tracks.
    let tracks = vec![short_loud("intro", 220.0), short_loud("outro", 330.0)];
    let mut sink = MemorySink::new();

    let output = composer()
        .compose(&tracks, &MixIntentPlan::default_for(2), None, &mut sink)
        .unwrap();

    assert_eq!(output.attempts, 2);
    assert!(output.review.approved, "reasons: {:?}", output.review.reasons);
    assert!(output.plan.target_total_duration_seconds >= Some(110));
    assert!(output.plan.reason.ends_with("|recovery"));
    assert!(output.timeline.len() > 2);
    assert_eq!(sink.count_named(MERGED_NAME), 2);

    let first_ms = sink
        .writes()
        .iter()
        .find(|(name, _)| name == MERGED_NAME)
        .map(|(_, audio)| audio.duration_ms())
        .unwrap();
    assert!(first_ms < 50_000);
    assert!(output.merged.duration_ms > first_ms);
    assert!(output.review.duration_seconds >= output.review.minimum_required_seconds);
}

#[test]
fn test_single_track_is_not_retried() {
    let mut sink = MemorySink::new();
    let err = composer()
        .compose(&[whisper("alone")], &MixIntentPlan::default_for(1), None, &mut sink)
        .unwrap_err();
    assert!(matches!(err, ComposeError::Rejected { attempts: 1, .. }));
    assert_eq!(sink.count_named(MERGED_NAME), 1);
}

#[test]
fn test_retry_can_be_disabled() {
    let composer = MixComposer::new(
        ComposerConfig {
            auto_retry_enabled: false,
            ..ComposerConfig::default()
        },
        RenderSettings::default(),
    );
    let mut sink = MemorySink::new();
    let err = composer
        .compose(&[whisper("a"), whisper("b")], &MixIntentPlan::default_for(2), None, &mut sink)
        .unwrap_err();
    assert!(matches!(err, ComposeError::Rejected { attempts: 1, .. }));
    assert_eq!(sink.count_named(MERGED_NAME), 1);
}

#[test]
fn test_no_tracks() {
    let err = composer()
        .compose(&[], &MixIntentPlan::default(), None, &mut MemorySink::new())
        .unwrap_err();
    assert!(matches!(err, ComposeError::NoTracks));
}

// ===== Analysis cache =====

#[test]
fn test_cache_matches_tracks() {
    let tracks = vec![song("first", 220.0), song("second", 330.0)];
    let config = ComposerConfig {
        analysis_enabled: false,
        ..ComposerConfig::default()
    };
    let cache = AnalysisCache::build(&tracks, &config);
    assert_eq!(cache.len(), 2);
    assert!(cache.profiles().iter().all(|p| p.frame_size_ms == 400));
    assert!(cache.profile(2).is_none());

    let pools = MixComposer::new(config, RenderSettings::default()).candidate_pools(
        &tracks,
        &cache,
        &MixIntentPlan::default_for(2),
    );
    assert_eq!(pools.len(), 2);
    assert!(pools.iter().all(|pool| !pool.is_empty()));
}

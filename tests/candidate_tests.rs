//! Integration tests for candidate generation and within-track scoring.

use mix_composer::analysis::{analyze_track, fallback_profile, DspProfile};
use mix_composer::audio::{generate_pulse_train, generate_stepped_levels, AudioBuffer};
use mix_composer::candidates::{
    generate_candidates, transition_aware_score, CandidateRequest, SegmentCandidate, WindowHint,
    MIN_CANDIDATE_MS,
};

const SAMPLE_RATE: u32 = 8000;

fn song() -> AudioBuffer {
    let samples = generate_stepped_levels(
        &[(24.0, 0.15), (36.0, 0.7), (18.0, 0.25), (42.0, 0.6)],
        196.0,
        SAMPLE_RATE,
    );
    AudioBuffer::mono(samples, SAMPLE_RATE)
}

fn generate(audio: &AudioBuffer, profile: &DspProfile, window: WindowHint, target_ms: u64) -> Vec<SegmentCandidate> {
    generate_candidates(&CandidateRequest {
        track_index: 0,
        audio,
        profile,
        window: &window,
        target_duration_ms: target_ms,
        pool_size: 8,
    })
}

// ===== Search path =====

#[test]
fn test_search_candidates_are_valid_windows() {
    let audio = song();
    let profile = analyze_track(&audio, "song");
    let pool = generate(&audio, &profile, WindowHint::Unspecified, 32_000);

    assert!(!pool.is_empty() && pool.len() <= 8);
    for candidate in &pool {
        assert!(candidate.start_ms < candidate.end_ms);
        assert!(candidate.end_ms <= audio.duration_ms());
        assert!(candidate.duration_ms() >= MIN_CANDIDATE_MS);
        assert!((0.0..=1.0).contains(&candidate.section_alignment));
        assert!((-6.0..=6.0).contains(&candidate.drop_strength));
        assert_eq!(candidate.beat_interval_ms, profile.beat_interval_ms);
    }
    let mut windows: Vec<(u64, u64)> = pool.iter().map(|c| (c.start_ms, c.end_ms)).collect();
    windows.sort_unstable();
    windows.dedup();
    assert_eq!(windows.len(), pool.len(), "windows must be unique");
}

#[test]
fn test_generation_is_deterministic() {
    let audio = song();
    let profile = analyze_track(&audio, "song");
    let hint = WindowHint::Suggested { start_ms: 40_000, end_ms: 70_000 };
    let first = generate(&audio, &profile, hint, 30_000);
    let second = generate(&audio, &profile, hint, 30_000);
    assert_eq!(first, second);
}

#[test]
fn test_fallback_profile_still_yields_pool() {
    let audio = song();
    let profile = fallback_profile(&audio);
    let pool = generate(&audio, &profile, WindowHint::Anchored { ratio: 0.4 }, 30_000);
    assert!(!pool.is_empty());
    assert_eq!(pool[0].key_index, -1);
}

// ===== Forced windows =====

#[test]
fn test_forced_window_within_one_beat() {
    let audio = song();
    let profile = analyze_track(&audio, "song");
    let pool = generate(
        &audio,
        &profile,
        WindowHint::Forced { start_ms: 30_300, end_ms: 61_700 },
        30_000,
    );

    assert_eq!(pool.len(), 1);
    let beat = profile.beat_interval_ms as u64;
    assert!(pool[0].start_ms.abs_diff(30_300) <= beat);
    assert!(pool[0].end_ms.abs_diff(61_700) <= beat);
    assert_eq!(pool[0].candidate_id, "t0c0");
}

#[test]
fn test_forced_window_past_the_end_uses_full_track() {
    let audio = song();
    let profile = analyze_track(&audio, "song");
    let pool = generate(
        &audio,
        &profile,
        WindowHint::Forced { start_ms: 500_000, end_ms: 530_000 },
        30_000,
    );

    assert_eq!(pool.len(), 1);
    assert_eq!(pool[0].start_ms, 0);
    assert_eq!(pool[0].end_ms, audio.duration_ms());
    assert_eq!(pool[0].section_alignment, 1.0);
}

// ===== Degenerate tracks =====

#[test]
fn test_short_track_is_used_whole() {
    let pulse = generate_pulse_train(120.0, SAMPLE_RATE, 8.0, 440.0, 100, 0.8);
    let audio = AudioBuffer::mono(pulse, SAMPLE_RATE);
    let profile = analyze_track(&audio, "short");
    let pool = generate(&audio, &profile, WindowHint::Unspecified, 30_000);

    assert_eq!(pool.len(), 1);
    assert_eq!((pool[0].start_ms, pool[0].end_ms), (0, 8_000));
}

#[test]
fn test_empty_track_gets_placeholder() {
    let audio = AudioBuffer::mono(Vec::new(), SAMPLE_RATE);
    let profile = fallback_profile(&audio);
    let pool = generate(&audio, &profile, WindowHint::Unspecified, 30_000);

    assert_eq!(pool.len(), 1);
    assert_eq!((pool[0].start_ms, pool[0].end_ms), (0, 1));
}

// ===== Scoring =====

#[test]
fn test_edge_adjacent_window_scores_lower() {
    let audio = AudioBuffer::mono(vec![0.3; SAMPLE_RATE as usize * 120], SAMPLE_RATE);
    let length = audio.duration_ms();

    let interior = transition_aware_score(&audio, 30_000, 60_000, length);
    let near_edge = transition_aware_score(&audio, 2_000, 32_000, length);
    assert!(near_edge < interior, "near_edge={} interior={}", near_edge, interior);
}

//! Integration tests for timeline layout and extension.

use mix_composer::analysis::KeyScale;
use mix_composer::candidates::SegmentCandidate;
use mix_composer::optimizer::{Selection, SelectionStrategy};
use mix_composer::plan::MixIntentPlan;
use mix_composer::timeline::{build_timeline, segment_cap, timeline_duration_ms};

fn candidate(track_index: usize, rank: usize, duration_ms: u64) -> SegmentCandidate {
    SegmentCandidate {
        candidate_id: format!("t{}c{}", track_index, rank),
        track_index,
        start_ms: rank as u64 * 10_000,
        end_ms: rank as u64 * 10_000 + duration_ms,
        energy_db: -14.0,
        drop_strength: 0.0,
        transition_quality: 0.0,
        section_alignment: 0.5,
        waveform_dynamics: 1.0,
        beat_interval_ms: 500,
        bpm: 120.0,
        key_index: 0,
        key_scale: KeyScale::Major,
        key_confidence: 0.3,
    }
}

fn two_track_pools(per_track: usize, duration_ms: u64) -> Vec<Vec<SegmentCandidate>> {
    (0..2)
        .map(|track| (0..per_track).map(|rank| candidate(track, rank, duration_ms)).collect())
        .collect()
}

fn first_picks(count: usize) -> Selection {
    Selection {
        picks: vec![Some(0); count],
        strategy: SelectionStrategy::Optimized,
    }
}

// ===== Extension =====

#[test]
fn test_extends_toward_total_duration() {
    let pools = two_track_pools(3, 45_000);
    let plan = MixIntentPlan {
        target_total_duration_seconds: Some(480),
        ..MixIntentPlan::default_for(2)
    };
    let timeline = build_timeline(&pools, &first_picks(2), &plan);

    assert!(timeline.len() > 2);
    assert!(timeline.len() <= segment_cap(2));
    assert!(
        timeline_duration_ms(&timeline, &plan) >= 440_000,
        "effective duration {} ms",
        timeline_duration_ms(&timeline, &plan)
    );
    // Round-robin across tracks, rotating through each pool.
    let ids: Vec<&str> = timeline.iter().map(|s| s.candidate.candidate_id.as_str()).collect();
    assert_eq!(&ids[..6], &["t0c0", "t1c0", "t0c1", "t1c1", "t0c2", "t1c2"]);
    assert_eq!(ids[6], "t0c0");
    for (position, segment) in timeline.iter().enumerate() {
        assert_eq!(segment.position, position);
    }
}

#[test]
fn test_stops_once_target_is_met() {
    let pools = two_track_pools(3, 45_000);
    let plan = MixIntentPlan {
        target_total_duration_seconds: Some(480),
        global_crossfade_seconds: Some(2.0),
        ..MixIntentPlan::default_for(2)
    };
    let timeline = build_timeline(&pools, &first_picks(2), &plan);
    // 45 s clips overlapping by 2 s: twelve reach 518 s, eleven only 475 s.
    assert_eq!(timeline.len(), 12);
    assert_eq!(timeline_duration_ms(&timeline, &plan), 518_000);
}

#[test]
fn test_segment_cap_bounds_extension() {
    let pools = vec![vec![candidate(0, 0, 12_000)]];
    let plan = MixIntentPlan {
        target_total_duration_seconds: Some(3_600),
        ..MixIntentPlan::default_for(1)
    };
    let timeline = build_timeline(&pools, &first_picks(1), &plan);
    assert_eq!(timeline.len(), segment_cap(1));
    assert!(timeline.iter().all(|s| s.candidate.candidate_id == "t0c0"));
}

// ===== Layout =====

#[test]
fn test_crossfades_follow_plan() {
    let pools = two_track_pools(1, 30_000);
    let plan = MixIntentPlan {
        transition_crossfade_seconds: vec![3.5],
        ..MixIntentPlan::default_for(2)
    };
    let timeline = build_timeline(&pools, &first_picks(2), &plan);
    assert_eq!(timeline.len(), 2);
    assert_eq!(timeline[0].crossfade_to_next_ms, 3_500);
    assert_eq!(timeline[1].crossfade_to_next_ms, 0);
}

#[test]
fn test_empty_pools_are_skipped() {
    let mut pools = two_track_pools(2, 30_000);
    pools.push(Vec::new());
    let selection = Selection {
        picks: vec![Some(1), Some(0), None],
        strategy: SelectionStrategy::Greedy,
    };
    let timeline = build_timeline(&pools, &selection, &MixIntentPlan::default_for(3));
    let ids: Vec<&str> = timeline.iter().map(|s| s.candidate.candidate_id.as_str()).collect();
    assert_eq!(ids, vec!["t0c1", "t1c0"]);
}

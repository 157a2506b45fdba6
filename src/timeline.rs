//! Ordered output sequence and its extension toward a total duration.

use log::info;
use serde::Serialize;

use crate::candidates::SegmentCandidate;
use crate::optimizer::Selection;
use crate::plan::{estimated_crossfade_ms, MixIntentPlan, MAX_TOTAL_SECONDS, MIN_TOTAL_SECONDS};

const MIN_COUNTED_SEGMENT_MS: u64 = 1_000;
const CROSSFADE_SAFETY_MARGIN_MS: u64 = 200;

/// One position in the final sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineSegment {
    pub position: usize,
    pub candidate: SegmentCandidate,
    /// Overlap with the next segment, zero for the last one. Holds the plan's
    /// estimate until rendering replaces it with the overlap actually applied.
    pub crossfade_to_next_ms: u64,
}

/// Upper bound on the sequence length for `track_count` tracks.
pub fn segment_cap(track_count: usize) -> usize {
    (track_count * 60).max(20).min(260)
}

fn safe_overlap(plan: &MixIntentPlan, transition_index: usize, left_ms: u64, right_ms: u64) -> u64 {
    let max_safe = left_ms.min(right_ms).saturating_sub(CROSSFADE_SAFETY_MARGIN_MS);
    estimated_crossfade_ms(plan, transition_index).min(max_safe)
}

/// Playing time of `sequence` once the plan's crossfades are overlapped.
pub fn effective_duration_ms(sequence: &[&SegmentCandidate], plan: &MixIntentPlan) -> u64 {
    let mut total = 0;
    let mut previous_ms = 0;
    for (index, candidate) in sequence.iter().enumerate() {
        let duration = candidate.duration_ms().max(MIN_COUNTED_SEGMENT_MS);
        total += duration;
        if index > 0 {
            total -= safe_overlap(plan, index - 1, previous_ms, duration);
        }
        previous_ms = duration;
    }
    total
}

/// Lay out the selected candidates and extend them toward the plan's total.
///
/// Extension walks the tracks round-robin, taking each track's candidate at
/// `(selected + round) % pool_len`, and stops as soon as the target is met or
/// [`segment_cap`] is reached. An unmet target is not an error.
pub fn build_timeline(
    pools: &[Vec<SegmentCandidate>],
    selection: &Selection,
    plan: &MixIntentPlan,
) -> Vec<TimelineSegment> {
    let selected: Vec<(usize, usize)> = pools
        .iter()
        .enumerate()
        .filter(|(_, pool)| !pool.is_empty())
        .map(|(track_index, pool)| {
            let pick = selection
                .picks
                .get(track_index)
                .copied()
                .flatten()
                .filter(|&pick| pick < pool.len())
                .unwrap_or(0);
            (track_index, pick)
        })
        .collect();

    let mut sequence: Vec<&SegmentCandidate> = selected
        .iter()
        .map(|&(track_index, pick)| &pools[track_index][pick])
        .collect();
    let base_len = sequence.len();

    if let Some(total_seconds) = plan.target_total_duration_seconds {
        if !sequence.is_empty() {
            let target_ms = total_seconds.clamp(MIN_TOTAL_SECONDS, MAX_TOTAL_SECONDS) as u64 * 1000;
            let cap = segment_cap(pools.len());
            let mut round = 1;
            'extend: while sequence.len() < cap && effective_duration_ms(&sequence, plan) < target_ms {
                for &(track_index, pick) in &selected {
                    let pool = &pools[track_index];
                    sequence.push(&pool[(pick + round) % pool.len()]);
                    if sequence.len() >= cap || effective_duration_ms(&sequence, plan) >= target_ms {
                        break 'extend;
                    }
                }
                round += 1;
            }
            if sequence.len() > base_len {
                info!(
                    "Extended mix to {} segments to target ~{}s output ({} ms effective)",
                    sequence.len(),
                    total_seconds,
                    effective_duration_ms(&sequence, plan)
                );
            }
        }
    }

    let durations: Vec<u64> = sequence
        .iter()
        .map(|c| c.duration_ms().max(MIN_COUNTED_SEGMENT_MS))
        .collect();
    sequence
        .into_iter()
        .enumerate()
        .map(|(position, candidate)| TimelineSegment {
            position,
            candidate: candidate.clone(),
            crossfade_to_next_ms: durations
                .get(position + 1)
                .map(|&next| safe_overlap(plan, position, durations[position], next))
                .unwrap_or(0),
        })
        .collect()
}

/// Effective duration of an already built timeline.
pub fn timeline_duration_ms(timeline: &[TimelineSegment], plan: &MixIntentPlan) -> u64 {
    let candidates: Vec<&SegmentCandidate> = timeline.iter().map(|s| &s.candidate).collect();
    effective_duration_ms(&candidates, plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::KeyScale;
    use crate::optimizer::SelectionStrategy;

    fn candidate(track_index: usize, rank: usize, duration_ms: u64) -> SegmentCandidate {
        SegmentCandidate {
            candidate_id: format!("t{}c{}", track_index, rank),
            track_index,
            start_ms: 0,
            end_ms: duration_ms,
            energy_db: -14.0,
            drop_strength: 0.0,
            transition_quality: 0.0,
            section_alignment: 0.5,
            waveform_dynamics: 1.0,
            beat_interval_ms: 500,
            bpm: 120.0,
            key_index: -1,
            key_scale: KeyScale::Unknown,
            key_confidence: 0.0,
        }
    }

    #[test]
    fn test_effective_duration_subtracts_capped_overlap() {
        let mut plan = MixIntentPlan::default_for(2);
        plan.global_crossfade_seconds = Some(2.0);
        let a = candidate(0, 0, 30_000);
        let b = candidate(1, 0, 1_500);
        // overlap capped at min(30000, 1500) - 200 = 1300
        assert_eq!(effective_duration_ms(&[&a, &b], &plan), 30_000 + 1_500 - 1_300);
        assert_eq!(effective_duration_ms(&[], &plan), 0);
    }

    #[test]
    fn test_no_target_keeps_selection() {
        let pools = vec![vec![candidate(0, 0, 30_000), candidate(0, 1, 30_000)], vec![candidate(1, 0, 30_000)]];
        let selection = Selection { picks: vec![Some(1), Some(0)], strategy: SelectionStrategy::Optimized };
        let timeline = build_timeline(&pools, &selection, &MixIntentPlan::default_for(2));
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].candidate.candidate_id, "t0c1");
        assert_eq!(timeline[0].crossfade_to_next_ms, 2_000);
        assert_eq!(timeline[1].crossfade_to_next_ms, 0);
    }

    #[test]
    fn test_segment_cap() {
        assert_eq!(segment_cap(1), 60);
        assert_eq!(segment_cap(0), 20);
        assert_eq!(segment_cap(10), 260);
    }
}

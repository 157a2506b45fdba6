//! Structural boundary detection from the energy envelope.

use std::collections::BTreeSet;

const MIN_PHRASE_MS: u32 = 7_000;
const PHRASE_BEATS: u32 = 16;
const MAX_DELTA_BOUNDARIES: usize = 18;
const MIN_DELTA_BOUNDARIES: usize = 4;
const MIN_DELTA_DB: f32 = 0.45;
const MIN_GAP_FRACTION: f32 = 0.65;
const MIN_ALIGNMENT_TOLERANCE_MS: f32 = 600.0;

/// Length of one phrase: sixteen beats, never shorter than seven seconds.
pub fn phrase_ms(beat_interval_ms: u32) -> u32 {
    (beat_interval_ms * PHRASE_BEATS).max(MIN_PHRASE_MS)
}

/// Detect likely section boundaries.
///
/// Boundaries are seeded on every phrase marker and then refined with the
/// largest frame-to-frame energy jumps, spaced at least 65% of a phrase
/// apart. The result is sorted, deduplicated, and always contains both `0`
/// and `duration_ms`.
pub fn section_boundaries_ms(
    energies: &[f32],
    frame_ms: u32,
    beat_interval_ms: u32,
    duration_ms: u64,
) -> Vec<u64> {
    if duration_ms == 0 {
        return vec![0];
    }
    if energies.is_empty() || frame_ms == 0 {
        return vec![0, duration_ms];
    }

    let phrase = phrase_ms(beat_interval_ms);
    let mut boundaries: BTreeSet<u64> = BTreeSet::new();
    boundaries.insert(0);
    boundaries.extend((phrase as u64..duration_ms).step_by(phrase as usize));

    let mut deltas: Vec<(usize, f32)> = energies
        .windows(2)
        .enumerate()
        .map(|(index, pair)| (index + 1, (pair[1] - pair[0]).abs()))
        .collect();
    // Stable: equal jumps keep their chronological order.
    deltas.sort_by(|a, b| b.1.total_cmp(&a.1));

    let min_gap_frames = ((phrase as f32 / frame_ms as f32 * MIN_GAP_FRACTION) as usize).max(2);
    let max_boundaries = ((duration_ms / phrase as u64) as usize)
        .max(MIN_DELTA_BOUNDARIES)
        .min(MAX_DELTA_BOUNDARIES);

    let mut chosen: Vec<usize> = Vec::new();
    for (frame_index, delta) in deltas {
        if delta < MIN_DELTA_DB {
            // Sorted descending, nothing further qualifies.
            break;
        }
        if chosen.iter().any(|&c| c.abs_diff(frame_index) < min_gap_frames) {
            continue;
        }
        chosen.push(frame_index);
        boundaries.insert((frame_index as u64 * frame_ms as u64).min(duration_ms));
        if chosen.len() >= max_boundaries {
            break;
        }
    }

    boundaries.insert(duration_ms);
    boundaries.into_iter().collect()
}

/// How close `start_ms` lies to its nearest boundary, in `[0, 1]`.
///
/// A start exactly on a boundary scores 1.0; the score falls linearly to zero
/// at `max(1.5 beats, 600 ms)` away.
pub fn boundary_alignment(start_ms: u64, boundaries_ms: &[u64], beat_interval_ms: u32) -> f32 {
    let Some(closest_gap) = boundaries_ms.iter().map(|&b| b.abs_diff(start_ms)).min() else {
        return 0.0;
    };
    let tolerance = (beat_interval_ms as f32 * 1.5).max(MIN_ALIGNMENT_TOLERANCE_MS);
    1.0 - (closest_gap as f32 / tolerance).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_markers_without_jumps() {
        let energies = vec![-20.0; 120];
        let boundaries = section_boundaries_ms(&energies, 250, 500, 30_000);
        assert_eq!(boundaries, vec![0, 8_000, 16_000, 24_000, 30_000]);
    }

    #[test]
    fn test_energy_jump_adds_boundary() {
        let mut energies = vec![-30.0; 120];
        for value in energies.iter_mut().skip(50) {
            *value = -10.0;
        }
        let boundaries = section_boundaries_ms(&energies, 250, 500, 30_000);
        assert!(boundaries.contains(&12_500), "boundaries: {:?}", boundaries);
        assert_eq!(boundaries.first(), Some(&0));
        assert_eq!(boundaries.last(), Some(&30_000));
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(section_boundaries_ms(&[], 250, 500, 0), vec![0]);
        assert_eq!(section_boundaries_ms(&[], 250, 500, 9_000), vec![0, 9_000]);
    }

    #[test]
    fn test_alignment_falls_off_linearly() {
        let boundaries = [0, 10_000];
        assert_eq!(boundary_alignment(10_000, &boundaries, 500), 1.0);
        // tolerance = max(750, 600) = 750
        assert!((boundary_alignment(10_375, &boundaries, 500) - 0.5).abs() < 1e-6);
        assert_eq!(boundary_alignment(12_000, &boundaries, 500), 0.0);
        assert_eq!(boundary_alignment(5_000, &[], 500), 0.0);
    }
}

//! Pairwise compatibility between candidates of adjacent tracks.
//!
//! Everything here is a pure function of its arguments and safe to call from
//! any thread.

use serde::Serialize;

use crate::analysis::bpm_for_interval;
use crate::candidates::SegmentCandidate;

const TEMPO_WEIGHT: f32 = 1.1;
const HARMONIC_WEIGHT: f32 = 1.25;
const ENERGY_WEIGHT: f32 = 0.9;
const DROP_WEIGHT: f32 = 0.65;
const STRUCTURE_WEIGHT: f32 = 0.55;
const DYNAMICS_WEIGHT: f32 = 0.45;

/// Neutral score when either key is unknown.
pub const UNKNOWN_KEY_COMPATIBILITY: f32 = 0.62;

/// Interval-based compatibility of two keys.
pub fn harmonic_compatibility(left: &SegmentCandidate, right: &SegmentCandidate) -> f32 {
    if left.key_index < 0 || right.key_index < 0 {
        return UNKNOWN_KEY_COMPATIBILITY;
    }
    let (a, b) = (left.key_index as i32 % 12, right.key_index as i32 % 12);
    let interval = (a - b).rem_euclid(12).min((b - a).rem_euclid(12));
    let same_scale = left.key_scale == right.key_scale;

    match (interval, same_scale) {
        (0, true) => 1.0,
        (0, false) => 0.84,
        (5 | 7, true) => 0.9,
        (1 | 2 | 10 | 11, true) => 0.72,
        (1 | 2 | 10 | 11, false) => 0.66,
        (3 | 4 | 8 | 9, true) => 0.63,
        (3 | 4 | 8 | 9, false) => 0.55,
        _ => 0.5,
    }
}

fn gap_score(a: f32, b: f32, scale: f32) -> f32 {
    1.0 - ((a - b).abs() / scale).clamp(0.0, 1.0)
}

fn effective_bpm(candidate: &SegmentCandidate) -> f32 {
    if candidate.bpm > 0.0 {
        candidate.bpm
    } else {
        bpm_for_interval(candidate.beat_interval_ms)
    }
}

/// Individual components of a transition score, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransitionBreakdown {
    pub tempo: f32,
    pub harmonic: f32,
    pub energy: f32,
    pub drop: f32,
    pub structure: f32,
    pub dynamics: f32,
}

impl TransitionBreakdown {
    pub fn between(left: &SegmentCandidate, right: &SegmentCandidate) -> Self {
        let (left_bpm, right_bpm) = (effective_bpm(left), effective_bpm(right));
        Self {
            tempo: left_bpm.min(right_bpm) / left_bpm.max(right_bpm),
            harmonic: harmonic_compatibility(left, right),
            energy: gap_score(left.energy_db, right.energy_db, 9.0),
            drop: gap_score(left.drop_strength, right.drop_strength, 4.0),
            structure: (left.section_alignment + right.section_alignment) / 2.0,
            dynamics: gap_score(left.waveform_dynamics, right.waveform_dynamics, 8.0),
        }
    }

    /// Weighted sum of the components.
    pub fn total(&self) -> f32 {
        self.tempo * TEMPO_WEIGHT
            + self.harmonic * HARMONIC_WEIGHT
            + self.energy * ENERGY_WEIGHT
            + self.drop * DROP_WEIGHT
            + self.structure * STRUCTURE_WEIGHT
            + self.dynamics * DYNAMICS_WEIGHT
    }
}

/// How smoothly `left` hands over to `right`.
pub fn transition_score(left: &SegmentCandidate, right: &SegmentCandidate) -> f32 {
    TransitionBreakdown::between(left, right).total()
}

/// Best possible [`transition_score`].
pub const MAX_TRANSITION_SCORE: f32 =
    TEMPO_WEIGHT + HARMONIC_WEIGHT + ENERGY_WEIGHT + DROP_WEIGHT + STRUCTURE_WEIGHT + DYNAMICS_WEIGHT;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::KeyScale;

    fn keyed(index: i8, scale: KeyScale) -> SegmentCandidate {
        SegmentCandidate {
            candidate_id: "t0c0".into(),
            track_index: 0,
            start_ms: 0,
            end_ms: 30_000,
            energy_db: -12.0,
            drop_strength: 1.0,
            transition_quality: 0.0,
            section_alignment: 1.0,
            waveform_dynamics: 3.0,
            beat_interval_ms: 500,
            bpm: 120.0,
            key_index: index,
            key_scale: scale,
            key_confidence: 0.5,
        }
    }

    #[test]
    fn test_harmonic_table() {
        use KeyScale::*;
        let c_major = keyed(0, Major);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(0, Major)), 1.0);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(0, Minor)), 0.84);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(7, Major)), 0.9);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(5, Major)), 0.9);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(7, Minor)), 0.5);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(2, Major)), 0.72);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(11, Minor)), 0.66);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(9, Minor)), 0.55);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(4, Major)), 0.63);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(6, Major)), 0.5);
        assert_eq!(harmonic_compatibility(&c_major, &keyed(-1, Unknown)), UNKNOWN_KEY_COMPATIBILITY);
    }

    #[test]
    fn test_identical_candidates_score_maximum() {
        let c = keyed(3, KeyScale::Minor);
        assert!((transition_score(&c, &c) - MAX_TRANSITION_SCORE).abs() < 1e-5);
    }

    #[test]
    fn test_tempo_ratio() {
        let left = keyed(0, KeyScale::Major);
        let mut right = keyed(0, KeyScale::Major);
        right.bpm = 0.0;
        right.beat_interval_ms = 750;
        let breakdown = TransitionBreakdown::between(&left, &right);
        assert!((breakdown.tempo - 80.0 / 120.0).abs() < 1e-5);
    }
}

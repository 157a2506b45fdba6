//! Mix-level directives supplied by an external planner.
//!
//! A [`MixIntentPlan`] is an immutable value: recovery produces a new plan
//! rather than editing the old one.

use serde::{Deserialize, Serialize};

use crate::candidates::{TrackSource, WindowHint};
use crate::render::SegmentEffects;

pub const MIN_SEGMENT_SECONDS: u32 = 14;
pub const MAX_SEGMENT_SECONDS: u32 = 70;
pub const MIN_TOTAL_SECONDS: u32 = 60;
pub const MAX_TOTAL_SECONDS: u32 = 3_600;
pub const MAX_CROSSFADE_SECONDS: f32 = 8.0;
/// Crossfade assumed when a plan gives none.
pub const DEFAULT_ESTIMATED_CROSSFADE_MS: u64 = 1_800;

const MIN_FORCED_WINDOW_SECONDS: f32 = 8.0;
const MAX_REQUESTED_SECONDS: u32 = 84;
const SHAPE_PROFILE: [f32; 6] = [1.0, 1.15, 0.92, 1.22, 0.88, 1.05];

/// Explicit window for one track, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackWindow {
    pub track_index: usize,
    #[serde(default)]
    pub start_seconds: Option<f32>,
    #[serde(default)]
    pub end_seconds: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixIntentPlan {
    pub target_segment_duration_seconds: u32,
    pub target_total_duration_seconds: Option<u32>,
    pub global_crossfade_seconds: Option<f32>,
    /// Crossfade per transition; the last entry repeats for later transitions.
    pub transition_crossfade_seconds: Vec<f32>,
    pub track_windows: Vec<TrackWindow>,
    /// Effects per timeline position; positions without an entry stay dry.
    pub segment_effects: Vec<SegmentEffects>,
    /// Free-form provenance, e.g. `"heuristic|recovery"`.
    pub reason: String,
}

impl Default for MixIntentPlan {
    fn default() -> Self {
        Self::default_for(2)
    }
}

impl MixIntentPlan {
    /// Heuristic plan when no planner output is available.
    pub fn default_for(track_count: usize) -> Self {
        Self {
            target_segment_duration_seconds: if track_count <= 2 { 36 } else { 32 },
            target_total_duration_seconds: None,
            global_crossfade_seconds: Some(2.0),
            transition_crossfade_seconds: Vec::new(),
            track_windows: Vec::new(),
            segment_effects: Vec::new(),
            reason: "default".to_string(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(|plan| plan.sanitized())
    }

    /// Copy with every numeric directive clamped into its accepted range.
    pub fn sanitized(&self) -> Self {
        let clamp_crossfade = |s: f32| if s.is_finite() { s.clamp(0.0, MAX_CROSSFADE_SECONDS) } else { 0.0 };
        Self {
            target_segment_duration_seconds: self
                .target_segment_duration_seconds
                .clamp(MIN_SEGMENT_SECONDS, MAX_SEGMENT_SECONDS),
            target_total_duration_seconds: self
                .target_total_duration_seconds
                .map(|s| s.clamp(MIN_TOTAL_SECONDS, MAX_TOTAL_SECONDS)),
            global_crossfade_seconds: self.global_crossfade_seconds.map(clamp_crossfade),
            transition_crossfade_seconds: self
                .transition_crossfade_seconds
                .iter()
                .copied()
                .map(clamp_crossfade)
                .collect(),
            track_windows: self
                .track_windows
                .iter()
                .map(|w| TrackWindow {
                    track_index: w.track_index,
                    start_seconds: w.start_seconds.map(|s| s.max(0.0)),
                    end_seconds: w.end_seconds.map(|s| s.max(0.0)),
                })
                .collect(),
            segment_effects: self.segment_effects.iter().map(SegmentEffects::sanitized).collect(),
            reason: self.reason.clone(),
        }
    }

    pub fn effects_for(&self, position: usize) -> SegmentEffects {
        self.segment_effects.get(position).copied().unwrap_or_default()
    }

    fn window_for(&self, track_index: usize) -> Option<&TrackWindow> {
        // Later directives for the same track win.
        self.track_windows.iter().rev().find(|w| w.track_index == track_index)
    }
}

/// Crossfade the plan implies for transition `index`, in ms.
///
/// Per-transition list first (index capped at its last entry), then the
/// global value, then [`DEFAULT_ESTIMATED_CROSSFADE_MS`].
pub fn estimated_crossfade_ms(plan: &MixIntentPlan, transition_index: usize) -> u64 {
    let seconds = if let Some(&last) = plan.transition_crossfade_seconds.last() {
        plan.transition_crossfade_seconds
            .get(transition_index)
            .copied()
            .unwrap_or(last)
    } else if let Some(global) = plan.global_crossfade_seconds {
        global
    } else {
        return DEFAULT_ESTIMATED_CROSSFADE_MS;
    };
    (seconds.clamp(0.0, MAX_CROSSFADE_SECONDS) * 1000.0) as u64
}

/// Resolved window and length request for one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackDirective {
    pub window: WindowHint,
    pub requested_duration_s: u32,
}

/// Overlay the plan's per-track windows on the tracks' own hints.
///
/// Start and end make a forced window of at least 8 s. A lone start or a lone
/// end becomes a suggested window one target segment long. Directives for
/// unknown tracks are ignored.
pub fn resolve_track_directives(tracks: &[TrackSource], plan: &MixIntentPlan) -> Vec<TrackDirective> {
    let target_seconds = plan
        .target_segment_duration_seconds
        .clamp(MIN_SEGMENT_SECONDS, MAX_SEGMENT_SECONDS);
    let target_ms = target_seconds as u64 * 1000;

    tracks
        .iter()
        .enumerate()
        .map(|(track_index, track)| {
            let Some(directive) = plan.window_for(track_index) else {
                return TrackDirective {
                    window: track.window,
                    requested_duration_s: target_seconds,
                };
            };
            match (directive.start_seconds, directive.end_seconds) {
                (Some(start), Some(end)) => {
                    let start = start.max(0.0);
                    let end = end.max(start + MIN_FORCED_WINDOW_SECONDS);
                    let start_ms = (start * 1000.0) as u64;
                    let end_ms = (end * 1000.0) as u64;
                    let requested = ((end_ms - start_ms) / 1000) as u32;
                    TrackDirective {
                        window: WindowHint::Forced { start_ms, end_ms },
                        requested_duration_s: requested.clamp(8, MAX_REQUESTED_SECONDS),
                    }
                }
                (Some(start), None) => {
                    let start_ms = (start.max(0.0) as u64) * 1000;
                    TrackDirective {
                        window: WindowHint::Suggested {
                            start_ms,
                            end_ms: start_ms + target_ms,
                        },
                        requested_duration_s: target_seconds,
                    }
                }
                (None, Some(end)) => {
                    let end_ms = (end.max(1.0) as u64) * 1000;
                    TrackDirective {
                        window: WindowHint::Suggested {
                            start_ms: end_ms.saturating_sub(target_ms),
                            end_ms,
                        },
                        requested_duration_s: target_seconds,
                    }
                }
                (None, None) => TrackDirective {
                    window: track.window,
                    requested_duration_s: target_seconds,
                },
            }
        })
        .collect()
}

/// Per-track segment length, shaped so consecutive tracks vary.
///
/// The suggestion is clamped to 16..=52 s (28 s when absent), scaled by a
/// repeating shape profile, shortened for the opener and lengthened for the
/// closer of a multi-track mix, weighted by relevance, and finally kept
/// between 14 s and eight seconds short of the source.
pub fn derive_target_duration_ms(
    suggested_seconds: u32,
    index: usize,
    total_tracks: usize,
    source_ms: u64,
    prompt_relevance: f32,
) -> u64 {
    let base = if suggested_seconds > 0 { suggested_seconds } else { 28 };
    let mut seconds = base.clamp(16, 52);

    seconds = (seconds as f32 * SHAPE_PROFILE[index % SHAPE_PROFILE.len()]) as u32;
    if total_tracks > 1 && index == 0 {
        seconds = (seconds as f32 * 0.9) as u32;
    }
    if total_tracks > 1 && index == total_tracks - 1 {
        seconds = (seconds as f32 * 1.15) as u32;
    }
    let relevance_weight = (0.92 + prompt_relevance * 0.35).clamp(0.9, 1.25);
    seconds = (seconds as f32 * relevance_weight) as u32;

    let source_seconds = (source_ms / 1000).max(1) as u32;
    let max_allowed = source_seconds.saturating_sub(8).max(MIN_SEGMENT_SECONDS);
    seconds.clamp(MIN_SEGMENT_SECONDS, max_allowed) as u64 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;

    fn tracks(count: usize) -> Vec<TrackSource> {
        (0..count)
            .map(|i| TrackSource::new(format!("song {}", i), "artist", AudioBuffer::silent(1_000, 8000, 1)))
            .collect()
    }

    #[test]
    fn test_default_plan() {
        assert_eq!(MixIntentPlan::default_for(2).target_segment_duration_seconds, 36);
        assert_eq!(MixIntentPlan::default_for(3).target_segment_duration_seconds, 32);
        assert_eq!(MixIntentPlan::default_for(3).global_crossfade_seconds, Some(2.0));
    }

    #[test]
    fn test_sanitized_clamps() {
        let plan = MixIntentPlan {
            target_segment_duration_seconds: 5,
            target_total_duration_seconds: Some(10_000),
            global_crossfade_seconds: Some(12.0),
            transition_crossfade_seconds: vec![-1.0, 3.0, f32::NAN],
            ..MixIntentPlan::default()
        }
        .sanitized();
        assert_eq!(plan.target_segment_duration_seconds, 14);
        assert_eq!(plan.target_total_duration_seconds, Some(3_600));
        assert_eq!(plan.global_crossfade_seconds, Some(8.0));
        assert_eq!(plan.transition_crossfade_seconds, vec![0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_plan_from_json_uses_defaults() {
        let plan = MixIntentPlan::from_json(r#"{"target_total_duration_seconds": 480}"#).unwrap();
        assert_eq!(plan.target_total_duration_seconds, Some(480));
        assert_eq!(plan.target_segment_duration_seconds, 36);
        assert!(plan.effects_for(0).is_dry());
    }

    #[test]
    fn test_segment_effects_from_json() {
        let plan = MixIntentPlan::from_json(
            r#"{"segment_effects": [{}, {"eq": {"low_db": -3.0}, "reverb_amount": 1.5, "delay_ms": 180, "delay_feedback": 0.25}]}"#,
        )
        .unwrap();
        assert!(plan.effects_for(0).is_dry());
        let second = plan.effects_for(1);
        assert_eq!(second.eq.low_db, -3.0);
        assert_eq!(second.reverb_amount, 1.0);
        assert_eq!(second.delay_ms, 180);
        assert_eq!(second.delay_repeats, 3);
        assert!(plan.effects_for(5).is_dry());
    }

    #[test]
    fn test_estimated_crossfade_resolution() {
        let mut plan = MixIntentPlan::default_for(2);
        plan.global_crossfade_seconds = None;
        assert_eq!(estimated_crossfade_ms(&plan, 0), 1_800);
        plan.global_crossfade_seconds = Some(3.0);
        assert_eq!(estimated_crossfade_ms(&plan, 4), 3_000);
        plan.transition_crossfade_seconds = vec![1.0, 2.5];
        assert_eq!(estimated_crossfade_ms(&plan, 0), 1_000);
        assert_eq!(estimated_crossfade_ms(&plan, 7), 2_500);
    }

    #[test]
    fn test_track_directives() {
        let mut plan = MixIntentPlan::default_for(3);
        plan.track_windows = vec![
            TrackWindow { track_index: 0, start_seconds: Some(30.0), end_seconds: Some(33.0) },
            TrackWindow { track_index: 1, start_seconds: Some(40.0), end_seconds: None },
            TrackWindow { track_index: 2, start_seconds: None, end_seconds: Some(20.0) },
            TrackWindow { track_index: 9, start_seconds: Some(1.0), end_seconds: None },
        ];
        let directives = resolve_track_directives(&tracks(3), &plan);
        assert_eq!(directives.len(), 3);
        assert_eq!(directives[0].window, WindowHint::Forced { start_ms: 30_000, end_ms: 38_000 });
        assert_eq!(directives[0].requested_duration_s, 8);
        assert_eq!(directives[1].window, WindowHint::Suggested { start_ms: 40_000, end_ms: 72_000 });
        assert_eq!(directives[2].window, WindowHint::Suggested { start_ms: 0, end_ms: 20_000 });
        assert_eq!(directives[2].requested_duration_s, 32);
    }

    #[test]
    fn test_target_duration_shape() {
        // 36 * 1.0 * 0.9 = 32, relevance 0 -> *0.92 = 29
        assert_eq!(derive_target_duration_ms(36, 0, 3, 240_000, 0.0), 29_000);
        // 36 * 1.15 = 41, * 0.92 = 37
        assert_eq!(derive_target_duration_ms(36, 1, 3, 240_000, 0.0), 37_000);
        // capped by a short source: 30 s - 8 = 22
        assert_eq!(derive_target_duration_ms(36, 1, 3, 30_000, 1.0), 22_000);
        // missing suggestion defaults to 28
        assert_eq!(derive_target_duration_ms(0, 0, 1, 240_000, 0.0), 25_000);
    }
}

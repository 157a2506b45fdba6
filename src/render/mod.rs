//! Cutting, leveling and crossfading the timeline into the final mix.
//!
//! This module provides:
//! - [`render_timeline`]: one sequential pass that cuts, fades, runs the
//!   segment's effects and levels each clip (each clip's gain depends on the
//!   previous clip's tail), then merges the clips with per-transition
//!   crossfades
//! - [`resolve_crossfades`]: crossfade lengths from plan directives or a
//!   length-based heuristic
//! - [`SegmentEffects`]: 3-band EQ, tap reverb and feedback delay
//! - [`AudioSink`] implementations for WAV files and memory

pub mod effects;
pub mod sink;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::{AudioBuffer, AudioError};
use crate::candidates::TrackSource;
use crate::plan::{MixIntentPlan, MAX_CROSSFADE_SECONDS};
use crate::timeline::TimelineSegment;

pub use effects::{EqGains, SegmentEffects};
pub use sink::{AudioSink, MemorySink, SegmentHandle, SinkError, WavDirectorySink};

/// Name the merged output is written under.
pub const MERGED_NAME: &str = "mix";
const EMPTY_CUT_FALLBACK_MS: u64 = 12_000;
const MIN_HEURISTIC_CROSSFADE_MS: u64 = 1_200;
const MAX_HEURISTIC_CROSSFADE_MS: u64 = 4_500;
const HEURISTIC_CROSSFADE_RATIO: f64 = 0.18;

/// Loudness and fade parameters for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Level every clip is pulled toward, in dBFS.
    pub target_loudness_db: f32,
    /// Gain applied to one clip never exceeds this magnitude.
    pub max_gain_db: f32,
    /// Share of the level jump from the previous clip's tail that is undone.
    pub continuity_factor: f32,
    /// Clips longer than this get fade-in/out.
    pub fade_threshold_ms: u64,
    pub max_fade_ms: u64,
    /// Length of the tail measured for continuity.
    pub tail_window_ms: u64,
    /// Output format; `None` follows the first rendered track.
    pub output_sample_rate: Option<u32>,
    pub output_channels: Option<usize>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            target_loudness_db: -14.0,
            max_gain_db: 8.0,
            continuity_factor: 0.15,
            fade_threshold_ms: 3_200,
            max_fade_ms: 900,
            tail_window_ms: 2_000,
            output_sample_rate: None,
            output_channels: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Timeline produced no audible segments")]
    EmptyTimeline,

    #[error("Export failed: {0}")]
    Sink(#[from] SinkError),

    #[error("Audio conversion failed: {0}")]
    Audio(#[from] AudioError),
}

/// Output of one render attempt.
#[derive(Debug, Clone)]
pub struct RenderedMix {
    /// Segments that were actually rendered, renumbered in output order, with
    /// `crossfade_to_next_ms` set to the overlap that was applied.
    pub timeline: Vec<TimelineSegment>,
    pub segments: Vec<SegmentHandle>,
    pub merged: SegmentHandle,
    pub merged_audio: AudioBuffer,
    /// Crossfade applied at each transition, in order.
    pub crossfades_ms: Vec<u64>,
    pub clip_durations_ms: Vec<u64>,
}

/// Gain for a clip measured at `current_db`.
///
/// Pulls toward the target, then eases the jump from the previous clip's tail.
pub fn normalization_gain_db(current_db: f32, previous_tail_db: Option<f32>, settings: &RenderSettings) -> f32 {
    let limit = settings.max_gain_db.abs();
    let gain = (settings.target_loudness_db - current_db).clamp(-limit, limit);
    match previous_tail_db {
        Some(tail) => (gain - (current_db - tail) * settings.continuity_factor).clamp(-limit, limit),
        None => gain,
    }
}

/// Crossfade for each of the `clip_lengths_ms.len() - 1` transitions.
///
/// Per-transition directives win (the last one repeats), then the global
/// value, then 18% of the shorter neighbor clamped to 1.2..=4.5 s. Every
/// result is kept below the shorter neighbor by at least 1 ms.
pub fn resolve_crossfades(plan: &MixIntentPlan, clip_lengths_ms: &[u64]) -> Vec<u64> {
    let to_ms = |seconds: f32| (seconds.clamp(0.0, MAX_CROSSFADE_SECONDS) * 1000.0) as u64;
    clip_lengths_ms
        .windows(2)
        .enumerate()
        .map(|(index, pair)| {
            let shorter = pair[0].min(pair[1]);
            let requested = match (
                plan.transition_crossfade_seconds.get(index).or(plan.transition_crossfade_seconds.last()),
                plan.global_crossfade_seconds,
            ) {
                (Some(&seconds), _) => to_ms(seconds),
                (None, Some(seconds)) => to_ms(seconds),
                (None, None) => ((shorter as f64 * HEURISTIC_CROSSFADE_RATIO) as u64)
                    .clamp(MIN_HEURISTIC_CROSSFADE_MS, MAX_HEURISTIC_CROSSFADE_MS),
            };
            requested.min(shorter.saturating_sub(1))
        })
        .collect()
}

fn output_format(tracks: &[TrackSource], timeline: &[TimelineSegment], settings: &RenderSettings) -> (u32, usize) {
    let source = timeline
        .iter()
        .find_map(|segment| tracks.get(segment.candidate.track_index))
        .map(|track| (track.audio.sample_rate, track.audio.channels))
        .unwrap_or((44_100, 2));
    (
        settings.output_sample_rate.unwrap_or(source.0),
        settings.output_channels.unwrap_or(source.1),
    )
}

/// Render every timeline segment into `sink` and merge them.
///
/// Clips are written as `segment_<n>` and the merged result as
/// [`MERGED_NAME`]. Segments naming unknown tracks or cutting to nothing are
/// skipped with a warning; an export or conversion failure aborts the whole
/// render. Effects are looked up by timeline position.
pub fn render_timeline(
    tracks: &[TrackSource],
    timeline: &[TimelineSegment],
    plan: &MixIntentPlan,
    settings: &RenderSettings,
    sink: &mut dyn AudioSink,
) -> Result<RenderedMix, RenderError> {
    let (sample_rate, channels) = output_format(tracks, timeline, settings);
    let mut clips: Vec<AudioBuffer> = Vec::with_capacity(timeline.len());
    let mut rendered_timeline: Vec<TimelineSegment> = Vec::with_capacity(timeline.len());
    let mut segments = Vec::with_capacity(timeline.len());
    let mut previous_tail_db: Option<f32> = None;

    for segment in timeline {
        let candidate = &segment.candidate;
        let Some(track) = tracks.get(candidate.track_index) else {
            warn!(
                "Skipping {}: track {} does not exist",
                candidate.candidate_id, candidate.track_index
            );
            continue;
        };

        let track_ms = track.audio.duration_ms();
        let start_ms = candidate.start_ms.min(track_ms);
        let mut end_ms = candidate.end_ms.min(track_ms);
        if end_ms <= start_ms {
            end_ms = track_ms.min(start_ms + EMPTY_CUT_FALLBACK_MS);
            info!(
                "{} cuts to nothing at {}..{} ms, extending to {}..{} ms",
                candidate.candidate_id, candidate.start_ms, candidate.end_ms, start_ms, end_ms
            );
        }
        let mut clip = track.audio.slice_ms(start_ms, end_ms).conform_to(sample_rate, channels)?;
        if clip.is_empty() {
            warn!("Skipping {}: cut {}..{} ms is empty", candidate.candidate_id, start_ms, end_ms);
            continue;
        }

        let clip_ms = clip.duration_ms();
        if clip_ms > settings.fade_threshold_ms {
            let fade_ms = settings.max_fade_ms.min(clip_ms / 5);
            clip.fade_in_ms(fade_ms);
            clip.fade_out_ms(fade_ms);
        }
        plan.effects_for(segment.position).apply(&mut clip);

        let current_db = clip.dbfs();
        let gain_db = normalization_gain_db(current_db, previous_tail_db, settings);
        clip.apply_gain_db(gain_db);
        let tail_ms = settings.tail_window_ms.min(clip_ms);
        previous_tail_db = Some(clip.dbfs_range_ms(clip_ms - tail_ms, clip_ms));
        debug!(
            "Rendered {} ({} ms) at {:.1} dBFS with {:+.1} dB gain",
            candidate.candidate_id, clip_ms, current_db, gain_db
        );

        let handle = sink.write(&format!("segment_{}", clips.len()), &clip)?;
        segments.push(handle);
        rendered_timeline.push(TimelineSegment {
            position: clips.len(),
            candidate: candidate.clone(),
            crossfade_to_next_ms: 0,
        });
        clips.push(clip);
    }

    let mut clip_iter = clips.iter();
    let Some(first) = clip_iter.next() else {
        return Err(RenderError::EmptyTimeline);
    };
    let clip_durations_ms: Vec<u64> = clips.iter().map(AudioBuffer::duration_ms).collect();
    let crossfades_ms = resolve_crossfades(plan, &clip_durations_ms);
    for (segment, &crossfade_ms) in rendered_timeline.iter_mut().zip(&crossfades_ms) {
        segment.crossfade_to_next_ms = crossfade_ms;
    }

    let mut merged_audio = first.clone();
    for (clip, &crossfade_ms) in clip_iter.zip(&crossfades_ms) {
        merged_audio.append_crossfaded(clip, crossfade_ms);
    }
    let merged = sink.write(MERGED_NAME, &merged_audio)?;

    Ok(RenderedMix {
        timeline: rendered_timeline,
        segments,
        merged,
        merged_audio,
        crossfades_ms,
        clip_durations_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_is_clamped() {
        let settings = RenderSettings::default();
        assert_eq!(normalization_gain_db(-40.0, None, &settings), 8.0);
        assert_eq!(normalization_gain_db(-2.0, None, &settings), -8.0);
        assert!((normalization_gain_db(-16.0, None, &settings) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_continuity_nudge() {
        let settings = RenderSettings::default();
        // 2 dB gain, clip 6 dB louder than previous tail -> 2 - 0.9
        let gain = normalization_gain_db(-16.0, Some(-22.0), &settings);
        assert!((gain - 1.1).abs() < 1e-5, "gain={}", gain);
    }

    #[test]
    fn test_heuristic_crossfade() {
        let mut plan = MixIntentPlan::default_for(2);
        plan.global_crossfade_seconds = None;
        assert_eq!(resolve_crossfades(&plan, &[30_000, 20_000]), vec![3_600]);
        assert_eq!(resolve_crossfades(&plan, &[30_000, 5_000]), vec![1_200]);
        assert_eq!(resolve_crossfades(&plan, &[60_000, 60_000]), vec![4_500]);
        assert!(resolve_crossfades(&plan, &[60_000]).is_empty());
    }
}

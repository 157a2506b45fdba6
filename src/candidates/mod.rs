//! Candidate segment generation and per-track ranking.
//!
//! For each track the generator either reproduces a forced window exactly
//! (snapped to the beat grid) or searches a deterministic set of seed starts
//! crossed with three window lengths. Every surviving window is scored,
//! ranked by [`SegmentCandidate::priority`], and capped to the pool size.

pub mod scoring;
pub mod seeds;

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::{boundary_alignment, stddev, DspProfile, KeyScale};
use crate::audio::AudioBuffer;

pub use scoring::{drop_strength, transition_aware_score, waveform_dynamics, window_frames};
pub use seeds::{duration_variants, seed_starts, snap_to_beat_grid, top_drop_starts, top_energy_starts};

/// Tracks this short are used whole.
pub const SHORT_TRACK_MS: u64 = 10_000;
/// Shortest window the search path keeps.
pub const MIN_CANDIDATE_MS: u64 = 10_000;
const FORCED_MIN_MS: u64 = 7_000;
const FORCED_EXTEND_MS: u64 = 10_000;
const FORCED_START_HEADROOM_MS: u64 = 1_200;
const EXHAUSTED_MIN_MS: u64 = 12_000;

/// Where in a track the caller would like the segment to come from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowHint {
    /// No preference; the search anchors at the track start.
    #[default]
    Unspecified,
    /// Search around this window; the start becomes the anchor seed.
    Suggested { start_ms: u64, end_ms: u64 },
    /// Anchor the search at a fraction of the track, `0.0..=1.0`.
    Anchored { ratio: f32 },
    /// Use exactly this window, no search.
    Forced { start_ms: u64, end_ms: u64 },
}

impl WindowHint {
    /// Anchor point for the search path.
    pub fn suggestion_ms(&self, duration_ms: u64) -> u64 {
        match *self {
            WindowHint::Unspecified | WindowHint::Forced { .. } => 0,
            WindowHint::Suggested { start_ms, .. } => start_ms,
            WindowHint::Anchored { ratio } => {
                (ratio.clamp(0.0, 1.0) as f64 * duration_ms as f64) as u64
            }
        }
    }
}

/// One input song for a composition request.
#[derive(Debug, Clone)]
pub struct TrackSource {
    pub title: String,
    pub artist: String,
    pub audio: AudioBuffer,
    pub window: WindowHint,
    /// Weight in `[0, 1]` from an upstream relevance ranking.
    pub prompt_relevance: f32,
}

impl TrackSource {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, audio: AudioBuffer) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            audio,
            window: WindowHint::Unspecified,
            prompt_relevance: 0.0,
        }
    }

    pub fn with_window(mut self, window: WindowHint) -> Self {
        self.window = window;
        self
    }

    pub fn with_relevance(mut self, relevance: f32) -> Self {
        self.prompt_relevance = relevance.clamp(0.0, 1.0);
        self
    }

    /// `"title - artist"`, used in log lines.
    pub fn label(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

/// A scored, contiguous window of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCandidate {
    /// `t<track>c<rank>`.
    pub candidate_id: String,
    pub track_index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub energy_db: f32,
    pub drop_strength: f32,
    pub transition_quality: f32,
    pub section_alignment: f32,
    pub waveform_dynamics: f32,
    pub beat_interval_ms: u32,
    pub bpm: f32,
    pub key_index: i8,
    pub key_scale: KeyScale,
    pub key_confidence: f32,
}

impl SegmentCandidate {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }

    /// Composite single-track ranking score.
    pub fn priority(&self) -> f32 {
        self.transition_quality
            + self.drop_strength * 0.65
            + self.energy_db * 0.05
            + self.section_alignment * 0.9
            + (self.waveform_dynamics / 6.0).min(1.2) * 0.45
    }
}

/// Everything the generator needs for one track.
#[derive(Debug, Clone, Copy)]
pub struct CandidateRequest<'a> {
    pub track_index: usize,
    pub audio: &'a AudioBuffer,
    pub profile: &'a DspProfile,
    pub window: &'a WindowHint,
    pub target_duration_ms: u64,
    pub pool_size: usize,
}

impl CandidateRequest<'_> {
    fn candidate(&self, start_ms: u64, end_ms: u64) -> SegmentCandidate {
        let profile = self.profile;
        SegmentCandidate {
            candidate_id: String::new(),
            track_index: self.track_index,
            start_ms,
            end_ms,
            energy_db: self.audio.dbfs_range_ms(start_ms, end_ms),
            drop_strength: 0.0,
            transition_quality: 0.0,
            section_alignment: 0.0,
            waveform_dynamics: stddev(&profile.energy_frames),
            beat_interval_ms: profile.beat_interval_ms,
            bpm: profile.bpm,
            key_index: profile.key_index,
            key_scale: profile.key_scale,
            key_confidence: profile.key_confidence,
        }
    }

    fn single(&self, mut candidate: SegmentCandidate) -> Vec<SegmentCandidate> {
        candidate.candidate_id = candidate_id(self.track_index, 0);
        vec![candidate]
    }
}

pub fn candidate_id(track_index: usize, rank: usize) -> String {
    format!("t{}c{}", track_index, rank)
}

/// Produce the ranked candidate pool for one track.
///
/// Never returns an empty list: unusable audio, an out-of-bounds forced
/// window and an exhausted search all degrade to one fallback candidate.
pub fn generate_candidates(request: &CandidateRequest<'_>) -> Vec<SegmentCandidate> {
    let duration_ms = request.audio.duration_ms();
    if duration_ms == 0 || request.profile.energy_frames.is_empty() {
        warn!(
            "Track {} has no usable audio, emitting a placeholder candidate",
            request.track_index
        );
        let mut candidate = request.candidate(0, duration_ms.max(1));
        candidate.section_alignment = 1.0;
        return request.single(candidate);
    }

    if let WindowHint::Forced { start_ms, end_ms } = *request.window {
        if start_ms >= duration_ms {
            warn!(
                "Forced window {}..{} ms lies outside track {} ({} ms), using the full track",
                start_ms, end_ms, request.track_index, duration_ms
            );
            return request.single(full_track_candidate(request, duration_ms));
        }
        return request.single(forced_candidate(request, start_ms, end_ms, duration_ms));
    }

    if duration_ms <= SHORT_TRACK_MS {
        info!(
            "Track {} is only {} ms, using the whole track as its candidate",
            request.track_index, duration_ms
        );
        return request.single(full_track_candidate(request, duration_ms));
    }

    let mut candidates = search_candidates(request, duration_ms);
    if candidates.is_empty() {
        let end_ms = duration_ms.min(request.target_duration_ms.max(EXHAUSTED_MIN_MS));
        warn!(
            "Candidate search found no viable window for track {}, falling back to 0..{} ms",
            request.track_index, end_ms
        );
        let mut candidate = request.candidate(0, end_ms);
        candidate.section_alignment = 0.6;
        return request.single(candidate);
    }

    candidates.sort_by(|a, b| b.priority().total_cmp(&a.priority()));
    candidates.truncate(request.pool_size.max(1));
    for (rank, candidate) in candidates.iter_mut().enumerate() {
        candidate.candidate_id = candidate_id(request.track_index, rank);
        debug!(
            "{} {}..{} ms priority={:.2} tq={:.2} drop={:.2} align={:.2}",
            candidate.candidate_id,
            candidate.start_ms,
            candidate.end_ms,
            candidate.priority(),
            candidate.transition_quality,
            candidate.drop_strength,
            candidate.section_alignment
        );
    }
    candidates
}

fn full_track_candidate(request: &CandidateRequest<'_>, duration_ms: u64) -> SegmentCandidate {
    let mut candidate = request.candidate(0, duration_ms);
    candidate.section_alignment = 1.0;
    candidate
}

fn forced_candidate(
    request: &CandidateRequest<'_>,
    forced_start_ms: u64,
    forced_end_ms: u64,
    duration_ms: u64,
) -> SegmentCandidate {
    let profile = request.profile;
    let beat = profile.beat_interval_ms;
    let target = request.target_duration_ms;

    let mut start_ms = forced_start_ms.min(duration_ms.saturating_sub(FORCED_START_HEADROOM_MS));
    let mut end_ms = forced_end_ms.min(duration_ms);
    if end_ms <= start_ms {
        end_ms = duration_ms.min(start_ms + target.max(FORCED_EXTEND_MS));
    }
    if end_ms - start_ms < FORCED_MIN_MS {
        end_ms = duration_ms.min(start_ms + FORCED_EXTEND_MS);
    }
    start_ms = snap_to_beat_grid(start_ms, beat, duration_ms);
    end_ms = snap_to_beat_grid(end_ms, beat, duration_ms);
    if end_ms <= start_ms {
        end_ms = duration_ms.min(start_ms + (beat as u64 * 16).max(8_000));
    }
    if end_ms <= start_ms {
        start_ms = 0;
        end_ms = duration_ms.min(target.max(FORCED_EXTEND_MS));
    }

    let alignment = boundary_alignment(start_ms, &profile.section_boundaries_ms, beat);
    let mut candidate = request.candidate(start_ms, end_ms);
    candidate.section_alignment = alignment;
    candidate.transition_quality =
        transition_aware_score(request.audio, start_ms, end_ms, duration_ms) + alignment * 0.55;
    candidate
}

fn search_candidates(request: &CandidateRequest<'_>, duration_ms: u64) -> Vec<SegmentCandidate> {
    let profile = request.profile;
    let beat = profile.beat_interval_ms;
    let energies = &profile.energy_frames;

    let suggestion_ms = request.window.suggestion_ms(duration_ms);
    let seeds = seed_starts(profile, suggestion_ms, duration_ms);
    let variants = duration_variants(request.target_duration_ms, duration_ms);

    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut candidates = Vec::new();
    for seed in seeds {
        for length in variants {
            let start_ms = snap_to_beat_grid(seed, beat, duration_ms);
            let end_ms = snap_to_beat_grid(start_ms + length, beat, duration_ms);
            if end_ms <= start_ms || end_ms - start_ms < MIN_CANDIDATE_MS {
                continue;
            }
            if !seen.insert((start_ms, end_ms)) {
                continue;
            }

            let (start_frame, end_frame) =
                window_frames(energies.len(), start_ms, end_ms, profile.frame_size_ms);
            let dynamics = waveform_dynamics(energies, start_frame, end_frame);
            let alignment = boundary_alignment(start_ms, &profile.section_boundaries_ms, beat);

            let mut candidate = request.candidate(start_ms, end_ms);
            candidate.drop_strength = drop_strength(energies, start_frame);
            candidate.waveform_dynamics = dynamics;
            candidate.section_alignment = alignment;
            candidate.transition_quality = transition_aware_score(request.audio, start_ms, end_ms, duration_ms)
                + alignment * 0.65
                + (dynamics / 6.5).min(1.0) * 0.45;
            candidates.push(candidate);
        }
    }
    candidates
}

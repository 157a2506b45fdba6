//! End-to-end composition: analysis, selection, rendering and review.

use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::analysis::{analyze_track, fallback_profile, DspProfile};
use crate::candidates::{generate_candidates, CandidateRequest, SegmentCandidate, TrackSource};
use crate::config::ComposerConfig;
use crate::optimizer::{select_candidates, CandidatePreferenceHint, SelectionStrategy};
use crate::plan::{derive_target_duration_ms, resolve_track_directives, MixIntentPlan};
use crate::render::{render_timeline, AudioSink, RenderError, RenderSettings, RenderedMix, SegmentHandle};
use crate::review::{review_mix, GateDecision, MixReviewResult, QualityGate};
use crate::timeline::{build_timeline, TimelineSegment};

/// Errors that end a composition request.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("No tracks to compose")]
    NoTracks,

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Mix rejected after {attempts} attempt(s): {}", reasons.join(" "))]
    Rejected { reasons: Vec<String>, attempts: u32 },
}

/// DSP profiles for one request, indexed like the input tracks.
///
/// Built once per [`MixComposer::compose`] call and dropped with it.
#[derive(Debug, Clone, Default)]
pub struct AnalysisCache {
    profiles: Vec<DspProfile>,
}

impl AnalysisCache {
    pub fn build(tracks: &[TrackSource], config: &ComposerConfig) -> Self {
        let analyze = |track: &TrackSource| {
            if !config.analysis_enabled {
                info!("Analysis disabled, using fallback profile for {}", track.label());
                fallback_profile(&track.audio)
            } else if track.audio.is_empty() {
                warn!("{} has no audio, using fallback profile", track.label());
                fallback_profile(&track.audio)
            } else {
                analyze_track(&track.audio, &track.label())
            }
        };
        let profiles = if config.parallel_analysis {
            tracks.par_iter().map(analyze).collect()
        } else {
            tracks.iter().map(analyze).collect()
        };
        Self { profiles }
    }

    pub fn profile(&self, track_index: usize) -> Option<&DspProfile> {
        self.profiles.get(track_index)
    }

    pub fn profiles(&self) -> &[DspProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Result of a successful composition.
#[derive(Debug, Clone, Serialize)]
pub struct MixOutput {
    pub segments: Vec<SegmentHandle>,
    pub merged: SegmentHandle,
    pub review: MixReviewResult,
    /// Rendered sequence; each entry carries the crossfade that was applied.
    pub timeline: Vec<TimelineSegment>,
    /// Render attempts, 1 or 2.
    pub attempts: u32,
    pub crossfades_ms: Vec<u64>,
    pub selection_strategy: SelectionStrategy,
    /// Plan the approved attempt was rendered with.
    pub plan: MixIntentPlan,
}

struct Attempt {
    plan: MixIntentPlan,
    strategy: SelectionStrategy,
    rendered: RenderedMix,
    review: MixReviewResult,
}

impl Attempt {
    fn into_output(self, attempts: u32) -> MixOutput {
        MixOutput {
            segments: self.rendered.segments,
            merged: self.rendered.merged,
            review: self.review,
            timeline: self.rendered.timeline,
            attempts,
            crossfades_ms: self.rendered.crossfades_ms,
            selection_strategy: self.strategy,
            plan: self.plan,
        }
    }
}

/// Composes a mix from decoded tracks.
#[derive(Debug, Clone, Default)]
pub struct MixComposer {
    config: ComposerConfig,
    settings: RenderSettings,
}

impl MixComposer {
    pub fn new(config: ComposerConfig, settings: RenderSettings) -> Self {
        Self {
            config: config.sanitized(),
            settings,
        }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Candidate pools for every track under `plan`.
    pub fn candidate_pools(
        &self,
        tracks: &[TrackSource],
        cache: &AnalysisCache,
        plan: &MixIntentPlan,
    ) -> Vec<Vec<SegmentCandidate>> {
        let directives = resolve_track_directives(tracks, plan);
        let build = |track_index: usize| {
            let (Some(track), Some(profile)) = (tracks.get(track_index), cache.profile(track_index)) else {
                return Vec::new();
            };
            let directive = &directives[track_index];
            let target_duration_ms = derive_target_duration_ms(
                directive.requested_duration_s,
                track_index,
                tracks.len(),
                track.audio.duration_ms(),
                track.prompt_relevance,
            );
            generate_candidates(&CandidateRequest {
                track_index,
                audio: &track.audio,
                profile,
                window: &directive.window,
                target_duration_ms,
                pool_size: self.config.candidate_pool_size,
            })
        };
        if self.config.parallel_analysis {
            (0..tracks.len()).into_par_iter().map(build).collect()
        } else {
            (0..tracks.len()).map(build).collect()
        }
    }

    /// Analyze, select, render and review; retries once with a recovery plan.
    ///
    /// Segment clips and the merged mix are written to `sink` on every
    /// attempt.
    pub fn compose(
        &self,
        tracks: &[TrackSource],
        plan: &MixIntentPlan,
        hint: Option<&dyn CandidatePreferenceHint>,
        sink: &mut dyn AudioSink,
    ) -> Result<MixOutput, ComposeError> {
        if tracks.is_empty() {
            return Err(ComposeError::NoTracks);
        }
        info!(
            "Composing {} tracks: segment={}s total={:?}s",
            tracks.len(),
            plan.target_segment_duration_seconds,
            plan.target_total_duration_seconds
        );

        let cache = AnalysisCache::build(tracks, &self.config);
        let mut gate = QualityGate::new(self.config.auto_retry_enabled, tracks.len());

        let first = self.attempt(tracks, &cache, plan.sanitized(), hint, sink)?;
        let second = match gate.evaluate(&first.review, &first.plan) {
            GateDecision::Approve => return Ok(first.into_output(gate.attempts())),
            GateDecision::Fail(reasons) => {
                return Err(ComposeError::Rejected {
                    reasons,
                    attempts: gate.attempts(),
                })
            }
            GateDecision::Retry(recovery) => self.attempt(tracks, &cache, recovery, hint, sink)?,
        };
        gate.rendered();

        match gate.evaluate(&second.review, &second.plan) {
            GateDecision::Approve => Ok(second.into_output(gate.attempts())),
            _ => Err(ComposeError::Rejected {
                reasons: gate.reasons().to_vec(),
                attempts: gate.attempts(),
            }),
        }
    }

    fn attempt(
        &self,
        tracks: &[TrackSource],
        cache: &AnalysisCache,
        plan: MixIntentPlan,
        hint: Option<&dyn CandidatePreferenceHint>,
        sink: &mut dyn AudioSink,
    ) -> Result<Attempt, ComposeError> {
        let pools = self.candidate_pools(tracks, cache, &plan);
        let relevance: Vec<f32> = tracks.iter().map(|t| t.prompt_relevance).collect();
        let selection = select_candidates(
            &pools,
            &relevance,
            hint,
            &self.config.optimizer_settings(),
            self.config.optimizer_enabled,
        );
        let timeline = build_timeline(&pools, &selection, &plan);
        let rendered = render_timeline(tracks, &timeline, &plan, &self.settings, sink)?;
        let review = review_mix(
            &rendered.merged_audio,
            rendered.segments.len(),
            &plan,
            tracks.len(),
        );
        Ok(Attempt {
            plan,
            strategy: selection.strategy,
            rendered,
            review,
        })
    }
}

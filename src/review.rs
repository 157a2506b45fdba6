//! Quality review of a merged mix and the bounded recovery state machine.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;
use crate::plan::{
    MixIntentPlan, MAX_CROSSFADE_SECONDS, MAX_SEGMENT_SECONDS, MAX_TOTAL_SECONDS,
    MIN_SEGMENT_SECONDS, MIN_TOTAL_SECONDS,
};

/// Quietest acceptable merged output.
pub const MIN_LOUDNESS_DBFS: f32 = -32.0;
/// Re-renders allowed after the first rejection.
pub const MAX_RECOVERY_ATTEMPTS: u32 = 1;
const DURATION_TOLERANCE_S: f32 = 0.1;
const RECOVERY_HEADROOM_S: f32 = 60.0;
const RECOVERY_FLOOR_S: f32 = 180.0;
const RECOVERY_MIN_SEGMENT_S: u32 = 36;

/// Verdict on one render attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixReviewResult {
    pub approved: bool,
    pub reasons: Vec<String>,
    pub duration_seconds: f32,
    pub minimum_required_seconds: f32,
    pub segment_count: usize,
}

/// Shortest acceptable mix for this plan.
pub fn minimum_required_seconds(plan: &MixIntentPlan, track_count: usize) -> f32 {
    if let Some(total) = plan.target_total_duration_seconds.filter(|&t| t > 0) {
        return (total as f32 * 0.72).clamp(45.0, MAX_TOTAL_SECONDS as f32);
    }
    let baseline = if track_count <= 1 {
        24.0
    } else {
        32.0 + (track_count - 1) as f32 * 18.0
    };
    baseline.clamp(24.0, 240.0)
}

/// Check duration, segment count and loudness of a merged mix.
pub fn review_mix(
    merged: &AudioBuffer,
    segment_count: usize,
    plan: &MixIntentPlan,
    track_count: usize,
) -> MixReviewResult {
    let minimum = minimum_required_seconds(plan, track_count);
    let duration_seconds = merged.duration_ms() as f32 / 1000.0;
    let mut reasons = Vec::new();

    if duration_seconds + DURATION_TOLERANCE_S < minimum {
        reasons.push(format!(
            "Duration {:.1}s is below required {:.1}s.",
            duration_seconds, minimum
        ));
    }
    if track_count > 1 && segment_count < 2 {
        reasons.push(
            "Only one rendered segment was produced even though multiple tracks were selected."
                .to_string(),
        );
    }
    let loudness = merged.dbfs();
    if loudness < MIN_LOUDNESS_DBFS {
        reasons.push(format!("Output loudness is too low ({:.1} dBFS).", loudness));
    }

    MixReviewResult {
        approved: reasons.is_empty(),
        reasons,
        duration_seconds,
        minimum_required_seconds: minimum,
        segment_count,
    }
}

/// Relaxed plan for the single retry after a rejection.
///
/// Raises the total duration above the failed minimum, settles the crossfade
/// on one global value and lengthens segments to at least 36 s.
pub fn recovery_plan(plan: &MixIntentPlan, review: &MixReviewResult, track_count: usize) -> MixIntentPlan {
    let raised = review.minimum_required_seconds + RECOVERY_HEADROOM_S;
    let total = match plan.target_total_duration_seconds {
        Some(current) => (current as f32).max(raised),
        None => RECOVERY_FLOOR_S.max(raised),
    };
    let crossfade = plan
        .global_crossfade_seconds
        .unwrap_or(if track_count <= 2 { 2.0 } else { 2.4 });

    MixIntentPlan {
        target_segment_duration_seconds: plan
            .target_segment_duration_seconds
            .max(RECOVERY_MIN_SEGMENT_S)
            .clamp(MIN_SEGMENT_SECONDS, MAX_SEGMENT_SECONDS),
        target_total_duration_seconds: Some(
            (total.ceil() as u32).clamp(MIN_TOTAL_SECONDS, MAX_TOTAL_SECONDS),
        ),
        global_crossfade_seconds: Some(crossfade.clamp(0.0, MAX_CROSSFADE_SECONDS)),
        transition_crossfade_seconds: Vec::new(),
        track_windows: plan.track_windows.clone(),
        segment_effects: plan.segment_effects.clone(),
        reason: format!("{}|recovery", plan.reason),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Rendered,
    Approved,
    Rejected,
    RecoveryPlanned,
    Failed,
}

/// What the caller should do after a review.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Approve,
    /// Render once more with this plan.
    Retry(MixIntentPlan),
    /// Give up; every reason from every attempt.
    Fail(Vec<String>),
}

/// `Rendered -> Approved | Rejected -> RecoveryPlanned -> Rendered -> ... | Failed`.
///
/// At most [`MAX_RECOVERY_ATTEMPTS`] retries are granted, and only when
/// auto-retry is on and more than one track takes part.
#[derive(Debug, Clone)]
pub struct QualityGate {
    state: ReviewState,
    retries_used: u32,
    auto_retry: bool,
    track_count: usize,
    history: Vec<String>,
}

impl QualityGate {
    pub fn new(auto_retry: bool, track_count: usize) -> Self {
        Self {
            state: ReviewState::Rendered,
            retries_used: 0,
            auto_retry,
            track_count,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> ReviewState {
        self.state
    }

    /// Render attempts so far, counting the current one.
    pub fn attempts(&self) -> u32 {
        self.retries_used + 1
    }

    /// Rejection reasons from every attempt, prefixed with `attempt N: `.
    pub fn reasons(&self) -> &[String] {
        &self.history
    }

    /// Feed the review of the attempt just rendered.
    pub fn evaluate(&mut self, review: &MixReviewResult, plan: &MixIntentPlan) -> GateDecision {
        debug_assert_eq!(self.state, ReviewState::Rendered);
        if review.approved {
            self.state = ReviewState::Approved;
            info!(
                "Mix approved on attempt {}: {:.1}s, {} segments",
                self.attempts(),
                review.duration_seconds,
                review.segment_count
            );
            return GateDecision::Approve;
        }

        self.state = ReviewState::Rejected;
        let attempt = self.attempts();
        self.history
            .extend(review.reasons.iter().map(|r| format!("attempt {}: {}", attempt, r)));
        warn!("Mix rejected on attempt {}: {}", attempt, review.reasons.join(" "));

        if self.auto_retry && self.track_count > 1 && self.retries_used < MAX_RECOVERY_ATTEMPTS {
            self.retries_used += 1;
            self.state = ReviewState::RecoveryPlanned;
            let next = recovery_plan(plan, review, self.track_count);
            info!(
                "Recovery plan: total={:?}s segment={}s crossfade={:?}s",
                next.target_total_duration_seconds,
                next.target_segment_duration_seconds,
                next.global_crossfade_seconds
            );
            return GateDecision::Retry(next);
        }

        self.state = ReviewState::Failed;
        GateDecision::Fail(self.history.clone())
    }

    /// Mark the recovery render as done so it can be evaluated.
    pub fn rendered(&mut self) {
        debug_assert_eq!(self.state, ReviewState::RecoveryPlanned);
        self.state = ReviewState::Rendered;
    }
}

//! Cross-track candidate selection.
//!
//! Tracks are visited in input order and exactly one candidate is chosen per
//! track so that the sum of unary desirability and weighted transition scores
//! along the path is maximal. When that is impossible (a track without
//! candidates) selection degrades to the best candidate per track.

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidates::SegmentCandidate;
use crate::transition::transition_score;

const RELEVANCE_WEIGHT: f32 = 2.1;
const KEY_CONFIDENCE_WEIGHT: f32 = 0.2;
const SHORT_SEGMENT_MS: u64 = 15_000;
const LONG_SEGMENT_MS: u64 = 58_000;
const SHORT_SEGMENT_PENALTY: f32 = 0.7;
const LONG_SEGMENT_PENALTY: f32 = 0.5;

/// Optional upstream preference for one candidate per track.
///
/// Only nudges the unary score; selection is fully determined without it.
pub trait CandidatePreferenceHint: Sync {
    fn preferred_candidate(&self, track_index: usize) -> Option<&str>;
}

impl CandidatePreferenceHint for HashMap<usize, String> {
    fn preferred_candidate(&self, track_index: usize) -> Option<&str> {
        self.get(&track_index).map(String::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptimizerError {
    #[error("No tracks to optimize")]
    NoTracks,

    #[error("Track {track_index} has no candidates")]
    EmptyPool { track_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Multiplier on every pairwise transition score.
    pub pair_weight: f32,
    /// Penalty for deviating from a hinted candidate.
    pub stickiness: f32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            pair_weight: 1.35,
            stickiness: 0.75,
        }
    }
}

/// Desirability of a candidate on its own.
pub fn unary_score(
    candidate: &SegmentCandidate,
    prompt_relevance: f32,
    preferred_id: Option<&str>,
    stickiness: f32,
) -> f32 {
    let mut score = candidate.priority() + prompt_relevance * RELEVANCE_WEIGHT;
    let duration_ms = candidate.duration_ms();
    if duration_ms < SHORT_SEGMENT_MS {
        score -= SHORT_SEGMENT_PENALTY;
    } else if duration_ms > LONG_SEGMENT_MS {
        score -= LONG_SEGMENT_PENALTY;
    }
    score += candidate.key_confidence * KEY_CONFIDENCE_WEIGHT;
    if let Some(preferred) = preferred_id {
        if candidate.candidate_id != preferred {
            score -= stickiness;
        }
    }
    score
}

fn preferred_for<'a>(hint: Option<&'a dyn CandidatePreferenceHint>, track_index: usize) -> Option<&'a str> {
    hint.and_then(|h| h.preferred_candidate(track_index))
}

fn relevance_for(relevance: &[f32], track_index: usize) -> f32 {
    relevance.get(track_index).copied().unwrap_or(0.0)
}

fn first_max(scores: impl IntoIterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, score) in scores.into_iter().enumerate() {
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}

/// Pick one candidate index per track maximizing the total path score.
///
/// Ties keep the earliest candidate.
pub fn optimize_sequence(
    pools: &[Vec<SegmentCandidate>],
    relevance: &[f32],
    hint: Option<&dyn CandidatePreferenceHint>,
    settings: &OptimizerSettings,
) -> Result<Vec<usize>, OptimizerError> {
    if pools.is_empty() {
        return Err(OptimizerError::NoTracks);
    }
    if let Some(track_index) = pools.iter().position(Vec::is_empty) {
        return Err(OptimizerError::EmptyPool { track_index });
    }

    let unary: Vec<Vec<f32>> = pools
        .iter()
        .enumerate()
        .map(|(track_index, pool)| {
            let preferred = preferred_for(hint, track_index);
            let weight = relevance_for(relevance, track_index);
            pool.iter()
                .map(|c| unary_score(c, weight, preferred, settings.stickiness))
                .collect()
        })
        .collect();

    let mut best: Vec<f32> = unary[0].clone();
    let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(pools.len());
    backpointers.push(vec![0; pools[0].len()]);

    for track_index in 1..pools.len() {
        let previous = &pools[track_index - 1];
        let mut row = Vec::with_capacity(pools[track_index].len());
        let mut pointers = Vec::with_capacity(pools[track_index].len());
        for (candidate, &own) in pools[track_index].iter().zip(&unary[track_index]) {
            let arrivals = previous
                .iter()
                .zip(&best)
                .map(|(prev, &prev_score)| prev_score + settings.pair_weight * transition_score(prev, candidate));
            let arrivals: Vec<f32> = arrivals.collect();
            let from = first_max(arrivals.iter().copied()).unwrap_or(0);
            row.push(own + arrivals[from]);
            pointers.push(from);
        }
        best = row;
        backpointers.push(pointers);
    }

    let mut picks = vec![0; pools.len()];
    picks[pools.len() - 1] = first_max(best.iter().copied()).unwrap_or(0);
    for track_index in (1..pools.len()).rev() {
        picks[track_index - 1] = backpointers[track_index][picks[track_index]];
    }
    Ok(picks)
}

/// Objective value of a concrete path, as maximized by [`optimize_sequence`].
pub fn path_score(
    pools: &[Vec<SegmentCandidate>],
    picks: &[usize],
    relevance: &[f32],
    hint: Option<&dyn CandidatePreferenceHint>,
    settings: &OptimizerSettings,
) -> f32 {
    let chosen: Vec<&SegmentCandidate> = picks
        .iter()
        .enumerate()
        .map(|(track_index, &pick)| &pools[track_index][pick])
        .collect();
    let unary: f32 = chosen
        .iter()
        .enumerate()
        .map(|(track_index, c)| {
            unary_score(
                c,
                relevance_for(relevance, track_index),
                preferred_for(hint, track_index),
                settings.stickiness,
            )
        })
        .sum();
    let pairs: f32 = chosen
        .windows(2)
        .map(|pair| settings.pair_weight * transition_score(pair[0], pair[1]))
        .sum();
    unary + pairs
}

/// Independent per-track choice: the hinted candidate when it exists,
/// otherwise the highest priority. Empty pools yield `None`.
pub fn greedy_selection(
    pools: &[Vec<SegmentCandidate>],
    hint: Option<&dyn CandidatePreferenceHint>,
) -> Vec<Option<usize>> {
    pools
        .iter()
        .enumerate()
        .map(|(track_index, pool)| {
            preferred_for(hint, track_index)
                .and_then(|id| pool.iter().position(|c| c.candidate_id == id))
                .or_else(|| first_max(pool.iter().map(SegmentCandidate::priority)))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Dynamic-programming path over all tracks.
    Optimized,
    /// Per-track best candidate, no cross-track optimization.
    Greedy,
}

/// Chosen candidate index per track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub picks: Vec<Option<usize>>,
    pub strategy: SelectionStrategy,
}

/// Run the optimizer, degrading to [`greedy_selection`] when it is disabled
/// or infeasible.
pub fn select_candidates(
    pools: &[Vec<SegmentCandidate>],
    relevance: &[f32],
    hint: Option<&dyn CandidatePreferenceHint>,
    settings: &OptimizerSettings,
    optimizer_enabled: bool,
) -> Selection {
    let greedy = greedy_selection(pools, hint);
    if !optimizer_enabled {
        return Selection {
            picks: greedy,
            strategy: SelectionStrategy::Greedy,
        };
    }

    match optimize_sequence(pools, relevance, hint, settings) {
        Ok(path) => {
            let changes = path
                .iter()
                .zip(&greedy)
                .filter(|(pick, baseline)| Some(**pick) != **baseline)
                .count();
            if changes > 0 {
                info!(
                    "Transition optimizer adjusted {}/{} track selections for smoother flow",
                    changes,
                    pools.len()
                );
            }
            Selection {
                picks: path.into_iter().map(Some).collect(),
                strategy: SelectionStrategy::Optimized,
            }
        }
        Err(err) => {
            warn!("{}, falling back to per-track selection", err);
            Selection {
                picks: greedy,
                strategy: SelectionStrategy::Greedy,
            }
        }
    }
}

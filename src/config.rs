//! Engine configuration with environment overrides.

use std::env;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::optimizer::OptimizerSettings;

pub const ENV_CANDIDATE_POOL_SIZE: &str = "MIX_CANDIDATE_POOL_SIZE";
pub const ENV_PAIR_TRANSITION_WEIGHT: &str = "MIX_PAIR_TRANSITION_WEIGHT";
pub const ENV_SELECTION_STICKINESS: &str = "MIX_SELECTION_STICKINESS";
pub const ENV_ENABLE_DSP_ANALYSIS: &str = "MIX_ENABLE_DSP_ANALYSIS";
pub const ENV_ENABLE_TRANSITION_OPTIMIZER: &str = "MIX_ENABLE_TRANSITION_OPTIMIZER";
pub const ENV_ENABLE_AUTO_RETRY: &str = "MIX_ENABLE_AUTO_RETRY";
pub const ENV_PARALLEL_ANALYSIS: &str = "MIX_PARALLEL_ANALYSIS";

/// Tunables for one [`crate::MixComposer`].
///
/// The weights are empirically tuned defaults, not derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Candidates kept per track, 4..=14.
    pub candidate_pool_size: usize,
    /// Weight of pairwise transition scores, 0.5..=3.5.
    pub pair_transition_weight: f32,
    /// Penalty for leaving a hinted candidate, 0..=3.
    pub selection_stickiness: f32,
    /// Full DSP analysis; `false` uses the cheap fallback profile.
    pub analysis_enabled: bool,
    pub optimizer_enabled: bool,
    pub auto_retry_enabled: bool,
    /// Analyze tracks on the rayon pool.
    pub parallel_analysis: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            candidate_pool_size: 8,
            pair_transition_weight: 1.35,
            selection_stickiness: 0.75,
            analysis_enabled: true,
            optimizer_enabled: true,
            auto_retry_enabled: true,
            parallel_analysis: true,
        }
    }
}

impl ComposerConfig {
    /// Defaults overlaid with any `MIX_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Overlay values from `lookup`; unparseable values keep the current one.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = read_parsed(&lookup, ENV_CANDIDATE_POOL_SIZE) {
            self.candidate_pool_size = value;
        }
        if let Some(value) = read_parsed(&lookup, ENV_PAIR_TRANSITION_WEIGHT) {
            self.pair_transition_weight = value;
        }
        if let Some(value) = read_parsed(&lookup, ENV_SELECTION_STICKINESS) {
            self.selection_stickiness = value;
        }
        if let Some(value) = read_bool(&lookup, ENV_ENABLE_DSP_ANALYSIS) {
            self.analysis_enabled = value;
        }
        if let Some(value) = read_bool(&lookup, ENV_ENABLE_TRANSITION_OPTIMIZER) {
            self.optimizer_enabled = value;
        }
        if let Some(value) = read_bool(&lookup, ENV_ENABLE_AUTO_RETRY) {
            self.auto_retry_enabled = value;
        }
        if let Some(value) = read_bool(&lookup, ENV_PARALLEL_ANALYSIS) {
            self.parallel_analysis = value;
        }
        self.sanitized()
    }

    /// Copy with every numeric field clamped into range.
    pub fn sanitized(&self) -> Self {
        let clamp_finite = |value: f32, low: f32, high: f32, fallback: f32| {
            if value.is_finite() {
                value.clamp(low, high)
            } else {
                fallback
            }
        };
        Self {
            candidate_pool_size: self.candidate_pool_size.clamp(4, 14),
            pair_transition_weight: clamp_finite(self.pair_transition_weight, 0.5, 3.5, 1.35),
            selection_stickiness: clamp_finite(self.selection_stickiness, 0.0, 3.0, 0.75),
            ..self.clone()
        }
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            pair_weight: self.pair_transition_weight,
            stickiness: self.selection_stickiness,
        }
    }
}

fn read_parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("Ignoring {}={:?}: not a boolean", key, raw);
            None
        }
    }
}

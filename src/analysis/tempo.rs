//! Beat-interval estimation from the frame energy envelope.

use serde::{Deserialize, Serialize};

use super::energy::{mean, median, positive_flux, stddev};

pub const MIN_BEAT_INTERVAL_MS: u32 = 260;
pub const MAX_BEAT_INTERVAL_MS: u32 = 760;
/// Used when neither strategy finds a usable pulse (120 BPM).
pub const DEFAULT_BEAT_INTERVAL_MS: u32 = 500;

/// Peak-picking strategy over the energy envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoStrategy {
    /// Peaks of the positive frame-to-frame energy change.
    SpectralFlux,
    /// Peaks of the raw frame energy.
    EnergyPeaks,
}

impl TempoStrategy {
    fn threshold_factor(self) -> f32 {
        match self {
            TempoStrategy::SpectralFlux => 0.55,
            TempoStrategy::EnergyPeaks => 0.35,
        }
    }

    /// Accepted inter-peak gap in ms, inclusive.
    fn gap_range(self) -> (u32, u32) {
        match self {
            TempoStrategy::SpectralFlux => (250, 1_000),
            TempoStrategy::EnergyPeaks => (240, 850),
        }
    }

    fn min_frames(self) -> usize {
        match self {
            TempoStrategy::SpectralFlux => 8,
            TempoStrategy::EnergyPeaks => 6,
        }
    }

    /// Estimate the beat interval, or `None` when no regular peaks exist.
    ///
    /// The result is always clamped to
    /// [`MIN_BEAT_INTERVAL_MS`]..=[`MAX_BEAT_INTERVAL_MS`].
    pub fn estimate(self, energies: &[f32], frame_ms: u32) -> Option<u32> {
        if frame_ms == 0 {
            return None;
        }
        let envelope = match self {
            TempoStrategy::SpectralFlux => positive_flux(energies),
            TempoStrategy::EnergyPeaks => energies.to_vec(),
        };
        if envelope.len() < self.min_frames() {
            return None;
        }

        let threshold = mean(&envelope) + stddev(&envelope) * self.threshold_factor();
        let peaks: Vec<usize> = (1..envelope.len() - 1)
            .filter(|&i| {
                let value = envelope[i];
                let above = match self {
                    // A flat flux envelope carries no onsets at all.
                    TempoStrategy::SpectralFlux => value >= threshold && value > 0.0,
                    TempoStrategy::EnergyPeaks => value > threshold,
                };
                above && value >= envelope[i - 1] && value >= envelope[i + 1]
            })
            .collect();

        let (low, high) = self.gap_range();
        let gaps: Vec<u32> = peaks
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) as u32 * frame_ms)
            .filter(|gap| (low..=high).contains(gap))
            .collect();

        median(&gaps).map(|m| clamp_beat_interval(m.round() as u32))
    }
}

pub fn clamp_beat_interval(interval_ms: u32) -> u32 {
    interval_ms.clamp(MIN_BEAT_INTERVAL_MS, MAX_BEAT_INTERVAL_MS)
}

/// Try each strategy in order and fall back to the default interval.
///
/// Returns the interval together with the strategy that produced it, or
/// `None` as the source when the default was used.
pub fn estimate_beat_interval(
    strategies: &[(TempoStrategy, &[f32], u32)],
) -> (u32, Option<TempoStrategy>) {
    for &(strategy, energies, frame_ms) in strategies {
        if let Some(interval) = strategy.estimate(energies, frame_ms) {
            return (interval, Some(strategy));
        }
    }
    (DEFAULT_BEAT_INTERVAL_MS, None)
}

/// BPM for a beat interval.
pub fn bpm_for_interval(beat_interval_ms: u32) -> f32 {
    60_000.0 / beat_interval_ms.max(1) as f32
}

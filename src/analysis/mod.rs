//! Per-track DSP profiling: energy envelope, tempo, key and section structure.
//!
//! [`analyze_track`] is the primary path. [`fallback_profile`] is the cheap
//! degraded path used when DSP analysis is disabled or a track carries no
//! usable audio.

pub mod energy;
pub mod key;
pub mod sections;
pub mod tempo;

use log::info;
use serde::{Deserialize, Serialize};

use crate::audio::AudioBuffer;

pub use energy::{energy_frames, mean, stddev, DEFAULT_FRAME_MS, FALLBACK_FRAME_MS};
pub use key::{estimate_key, key_name, KeyEstimate, KeyScale, PITCH_CLASS_NAMES};
pub use sections::{boundary_alignment, phrase_ms, section_boundaries_ms};
pub use tempo::{
    bpm_for_interval, estimate_beat_interval, TempoStrategy, DEFAULT_BEAT_INTERVAL_MS,
    MAX_BEAT_INTERVAL_MS, MIN_BEAT_INTERVAL_MS,
};

/// Derived musical features of one track.
///
/// Computed once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DspProfile {
    /// Beat interval in ms, always within 260..=760.
    pub beat_interval_ms: u32,
    /// Exactly `60000 / beat_interval_ms`.
    pub bpm: f32,
    /// Root pitch class 0..=11, or -1 when unknown.
    pub key_index: i8,
    pub key_scale: KeyScale,
    pub key_confidence: f32,
    /// Frame size the energy envelope was computed with.
    pub frame_size_ms: u32,
    /// Per-frame loudness in dBFS.
    pub energy_frames: Vec<f32>,
    /// Sorted, bounded by `[0, duration_ms]`, includes both ends.
    pub section_boundaries_ms: Vec<u64>,
    pub duration_ms: u64,
    /// Strategy that produced the beat interval, `None` for the default.
    pub tempo_source: Option<TempoStrategy>,
}

impl DspProfile {
    /// Key as text, e.g. `"F# minor"`.
    pub fn key_name(&self) -> String {
        key_name(self.key_index, self.key_scale)
    }

    pub fn key(&self) -> KeyEstimate {
        KeyEstimate {
            index: self.key_index,
            scale: self.key_scale,
            confidence: self.key_confidence,
        }
    }

    pub fn has_known_key(&self) -> bool {
        self.key().is_known()
    }
}

/// Full DSP analysis of one track.
///
/// `label` only appears in the log line.
pub fn analyze_track(audio: &AudioBuffer, label: &str) -> DspProfile {
    let frame_ms = DEFAULT_FRAME_MS;
    let energies = energy_frames(audio, frame_ms);
    let (beat_interval_ms, tempo_source) = estimate_beat_interval(&[
        (TempoStrategy::SpectralFlux, energies.as_slice(), frame_ms),
        (TempoStrategy::EnergyPeaks, energies.as_slice(), frame_ms),
    ]);
    let key = estimate_key(audio);
    let duration_ms = audio.duration_ms();
    let boundaries = section_boundaries_ms(&energies, frame_ms, beat_interval_ms, duration_ms);

    let profile = DspProfile {
        beat_interval_ms,
        bpm: bpm_for_interval(beat_interval_ms),
        key_index: key.index,
        key_scale: key.scale,
        key_confidence: key.confidence,
        frame_size_ms: frame_ms,
        energy_frames: energies,
        section_boundaries_ms: boundaries,
        duration_ms,
        tempo_source,
    };

    info!(
        "DSP analysis for {}: bpm={:.1} key={} confidence={:.2} sections={}",
        label,
        profile.bpm,
        profile.key_name(),
        profile.key_confidence,
        profile.section_boundaries_ms.len()
    );
    profile
}

/// Cheap profile without key detection.
///
/// The envelope uses 400 ms frames; tempo comes from energy peaks over a
/// separate 250 ms envelope.
pub fn fallback_profile(audio: &AudioBuffer) -> DspProfile {
    let frame_ms = FALLBACK_FRAME_MS;
    let energies = energy_frames(audio, frame_ms);
    let tempo_energies = energy_frames(audio, DEFAULT_FRAME_MS);
    let (beat_interval_ms, tempo_source) = estimate_beat_interval(&[(
        TempoStrategy::EnergyPeaks,
        tempo_energies.as_slice(),
        DEFAULT_FRAME_MS,
    )]);
    let duration_ms = audio.duration_ms();
    let boundaries = section_boundaries_ms(&energies, frame_ms, beat_interval_ms, duration_ms);

    DspProfile {
        beat_interval_ms,
        bpm: bpm_for_interval(beat_interval_ms),
        key_index: KeyEstimate::UNKNOWN.index,
        key_scale: KeyScale::Unknown,
        key_confidence: 0.0,
        frame_size_ms: frame_ms,
        energy_frames: energies,
        section_boundaries_ms: boundaries,
        duration_ms,
        tempo_source,
    }
}

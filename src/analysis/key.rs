//! Key-signature estimation from a Goertzel chroma vector.
//!
//! The track is mixed to mono and decimated, a fixed number of Hann-windowed
//! frames are measured at every pitch class in octaves 2-5, and the resulting
//! chroma vector is correlated against Krumhansl-style major and minor
//! profiles in all twelve rotations.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::audio::AudioBuffer;

pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Analysis sample-rate ceiling.
pub const KEY_ANALYSIS_RATE: u32 = 11_025;
/// Maximum mono points fed to the estimator.
pub const KEY_MAX_POINTS: usize = 220_000;

const FRAME_SIZE: usize = 1024;
const MAX_FRAMES: usize = 48;
const MIN_SAMPLES: usize = 4096;
const MIN_FRAME_RMS: f64 = 0.01;
const MIN_CONFIDENCE: f32 = 0.02;
const OCTAVES: [i32; 4] = [2, 3, 4, 5];

const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScale {
    Major,
    Minor,
    Unknown,
}

impl fmt::Display for KeyScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyScale::Major => "major",
            KeyScale::Minor => "minor",
            KeyScale::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Result of key estimation. `index` is -1 when the key is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyEstimate {
    pub index: i8,
    pub scale: KeyScale,
    pub confidence: f32,
}

impl KeyEstimate {
    pub const UNKNOWN: KeyEstimate = KeyEstimate {
        index: -1,
        scale: KeyScale::Unknown,
        confidence: 0.0,
    };

    pub fn is_known(&self) -> bool {
        self.index >= 0 && self.scale != KeyScale::Unknown
    }

    /// Human-readable name such as `"A minor"`, or `"unknown"`.
    pub fn name(&self) -> String {
        key_name(self.index, self.scale)
    }
}

pub fn key_name(index: i8, scale: KeyScale) -> String {
    match usize::try_from(index).ok().and_then(|i| PITCH_CLASS_NAMES.get(i)) {
        Some(note) if scale != KeyScale::Unknown => format!("{} {}", note, scale),
        _ => "unknown".to_string(),
    }
}

/// Hann window of `size` points.
pub fn hann_window(size: usize) -> Vec<f64> {
    if size <= 1 {
        return vec![1.0];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f64) / (size - 1) as f64).cos())
        .collect()
}

/// Power of the DFT bin nearest `target_hz` via the Goertzel recurrence.
pub fn goertzel_power(frame: &[f64], sample_rate: u32, target_hz: f64) -> f64 {
    let n = frame.len();
    if n <= 2 || target_hz <= 0.0 || sample_rate == 0 {
        return 0.0;
    }
    let k = ((n as f64 * target_hz) / sample_rate as f64).round() as i64;
    if k <= 0 || k >= n as i64 {
        return 0.0;
    }

    let omega = 2.0 * PI * k as f64 / n as f64;
    let coeff = 2.0 * omega.cos();
    let (mut q1, mut q2) = (0.0, 0.0);
    for &sample in frame {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }
    (q1 * q1 + q2 * q2 - coeff * q1 * q2).max(0.0)
}

fn pitch_frequency(pitch_class: usize, octave: i32) -> f64 {
    let midi_note = (octave + 1) * 12 + pitch_class as i32;
    440.0 * 2.0_f64.powf((midi_note - 69) as f64 / 12.0)
}

/// Accumulate per-pitch-class energy over up to 48 analysis frames.
///
/// Returns `None` when there are too few samples to analyze.
pub fn chroma_vector(samples: &[f32], sample_rate: u32) -> Option<[f64; 12]> {
    if samples.len() < MIN_SAMPLES || sample_rate == 0 {
        return None;
    }
    let step = FRAME_SIZE.max((samples.len() - FRAME_SIZE) / MAX_FRAMES);
    let window = hann_window(FRAME_SIZE);
    let nyquist_guard = sample_rate as f64 * 0.48;

    let mut chroma = [1e-9_f64; 12];
    let mut windowed = vec![0.0_f64; FRAME_SIZE];
    for start in (0..samples.len() - FRAME_SIZE).step_by(step).take(MAX_FRAMES) {
        let frame = &samples[start..start + FRAME_SIZE];
        let rms = (frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / FRAME_SIZE as f64).sqrt();
        if rms < MIN_FRAME_RMS {
            continue;
        }
        for (dst, (&s, &w)) in windowed.iter_mut().zip(frame.iter().zip(&window)) {
            *dst = s as f64 * w;
        }
        for (pitch_class, bin) in chroma.iter_mut().enumerate() {
            *bin += OCTAVES
                .iter()
                .map(|&octave| pitch_frequency(pitch_class, octave))
                .filter(|&hz| hz < nyquist_guard)
                .map(|hz| goertzel_power(&windowed, sample_rate, hz))
                .sum::<f64>();
        }
    }
    Some(chroma)
}

/// Pick the best (root, scale) for a chroma vector.
pub fn key_from_chroma(chroma: &[f64; 12]) -> KeyEstimate {
    let total: f64 = chroma.iter().sum();
    if total <= 1e-6 {
        return KeyEstimate::UNKNOWN;
    }
    let normalized: Vec<f64> = chroma.iter().map(|v| v / total).collect();

    let mut scored: Vec<(f64, i8, KeyScale)> = Vec::with_capacity(24);
    for root in 0..12 {
        let (mut major, mut minor) = (0.0, 0.0);
        for degree in 0..12 {
            let value = normalized[(root + degree) % 12];
            major += value * MAJOR_PROFILE[degree];
            minor += value * MINOR_PROFILE[degree];
        }
        scored.push((major, root as i8, KeyScale::Major));
        scored.push((minor, root as i8, KeyScale::Minor));
    }
    // Stable sort keeps the lower root / major first on exact ties.
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (best, root, scale) = scored[0];
    let second = scored[1].0;
    let confidence = ((best - second) / best.max(1e-9)).clamp(0.0, 1.0) as f32;
    if confidence < MIN_CONFIDENCE {
        return KeyEstimate {
            confidence,
            ..KeyEstimate::UNKNOWN
        };
    }
    KeyEstimate {
        index: root,
        scale,
        confidence,
    }
}

/// Estimate the key of a decoded buffer.
pub fn estimate_key(audio: &AudioBuffer) -> KeyEstimate {
    let (samples, sample_rate) = audio.mono_samples(KEY_ANALYSIS_RATE, KEY_MAX_POINTS);
    chroma_vector(&samples, sample_rate)
        .map(|chroma| key_from_chroma(&chroma))
        .unwrap_or(KeyEstimate::UNKNOWN)
}

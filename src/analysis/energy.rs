//! Frame-level loudness envelope and small statistics helpers.

use crate::audio::AudioBuffer;

/// Frame size for the primary analysis path.
pub const DEFAULT_FRAME_MS: u32 = 250;
/// Frame size for the degraded analysis path.
pub const FALLBACK_FRAME_MS: u32 = 400;

/// Split the buffer into fixed frames and measure each one in dBFS.
///
/// The final frame may be shorter than `frame_ms`. Silence is floored at
/// -80 dBFS by [`AudioBuffer::dbfs_range_ms`].
pub fn energy_frames(audio: &AudioBuffer, frame_ms: u32) -> Vec<f32> {
    let duration_ms = audio.duration_ms();
    if frame_ms == 0 || duration_ms == 0 {
        return Vec::new();
    }
    (0..duration_ms)
        .step_by(frame_ms as usize)
        .map(|start| audio.dbfs_range_ms(start, start + frame_ms as u64))
        .collect()
}

/// Frame-to-frame positive energy change. The first entry is always zero.
pub fn positive_flux(energies: &[f32]) -> Vec<f32> {
    if energies.len() < 2 {
        return Vec::new();
    }
    let mut flux = Vec::with_capacity(energies.len());
    flux.push(0.0);
    flux.extend(energies.windows(2).map(|w| (w[1] - w[0]).max(0.0)));
    flux
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32
}

/// Population standard deviation; zero for fewer than two values.
pub fn stddev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values) as f64;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - avg).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt() as f32
}

/// Median of integer values; even counts average the middle pair.
pub fn median(values: &[u32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] as f32 + sorted[mid] as f32) / 2.0)
    } else {
        Some(sorted[mid] as f32)
    }
}

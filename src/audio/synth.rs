//! Synthetic signals for tests, benches, and the demo.
//!
//! Everything here is deterministic: the same arguments always produce the
//! same samples.

use std::f32::consts::PI;

/// Generate a sine wave.
///
/// # Arguments
/// * `frequency` - Frequency in Hz
/// * `sample_rate` - Sample rate in Hz
/// * `duration` - Duration in seconds
/// * `amplitude` - Peak amplitude (0.0 to 1.0)
pub fn generate_sine(frequency: f32, sample_rate: u32, duration: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    (0..num_samples)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// Sum of equal-amplitude sines, scaled so the peak stays at `amplitude`.
pub fn generate_chord(frequencies: &[f32], sample_rate: u32, duration: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    if frequencies.is_empty() {
        return vec![0.0; num_samples];
    }
    let per_voice = amplitude / frequencies.len() as f32;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            frequencies
                .iter()
                .map(|&f| per_voice * (2.0 * PI * f * t).sin())
                .sum()
        })
        .collect()
}

/// Tone bursts on every beat with silence in between.
///
/// Each beat starts with `pulse_ms` of a sine at `tone_hz`; the remainder of
/// the beat is digital silence. Beat positions are exact sample multiples so
/// frame-based analysis sees a perfectly regular pulse.
pub fn generate_pulse_train(
    bpm: f32,
    sample_rate: u32,
    duration: f32,
    tone_hz: f32,
    pulse_ms: u32,
    amplitude: f32,
) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    let samples_per_beat = ((60.0 / bpm) * sample_rate as f32).round() as usize;
    let pulse_samples = (pulse_ms as usize * sample_rate as usize / 1000).min(samples_per_beat);

    let mut samples = vec![0.0; num_samples];
    if samples_per_beat == 0 {
        return samples;
    }
    for beat_start in (0..num_samples).step_by(samples_per_beat) {
        let end = (beat_start + pulse_samples).min(num_samples);
        for (offset, sample) in samples[beat_start..end].iter_mut().enumerate() {
            let t = offset as f32 / sample_rate as f32;
            *sample = amplitude * (2.0 * PI * tone_hz * t).sin();
        }
    }
    samples
}

/// A tone whose level changes in blocks, e.g. `[(20.0, 0.1), (20.0, 0.6)]`.
///
/// Useful for exercising section and drop detection.
pub fn generate_stepped_levels(levels: &[(f32, f32)], tone_hz: f32, sample_rate: u32) -> Vec<f32> {
    let mut samples = Vec::new();
    for &(seconds, amplitude) in levels {
        let count = (seconds * sample_rate as f32) as usize;
        let offset = samples.len();
        samples.extend((0..count).map(|i| {
            let t = (offset + i) as f32 / sample_rate as f32;
            amplitude * (2.0 * PI * tone_hz * t).sin()
        }));
    }
    samples
}

/// Surround `samples` with digital silence.
pub fn pad_with_silence(samples: &[f32], sample_rate: u32, lead_seconds: f32, tail_seconds: f32) -> Vec<f32> {
    let lead = (lead_seconds * sample_rate as f32) as usize;
    let tail = (tail_seconds * sample_rate as f32) as usize;
    let mut padded = Vec::with_capacity(lead + samples.len() + tail);
    padded.resize(lead, 0.0);
    padded.extend_from_slice(samples);
    padded.resize(lead + samples.len() + tail, 0.0);
    padded
}

/// Generate white noise.
///
/// Uses a linear congruential generator so runs are reproducible.
pub fn generate_white_noise(sample_rate: u32, duration: f32, amplitude: f32, seed: u64) -> Vec<f32> {
    let num_samples = (duration * sample_rate as f32) as usize;
    let mut state = seed;
    (0..num_samples)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let normalized = ((state >> 11) as f64 / (1u64 << 53) as f64) as f32 * 2.0 - 1.0;
            amplitude * normalized
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_sine() {
        let samples = generate_sine(440.0, 8000, 1.0, 0.5);
        assert_eq!(samples.len(), 8000);
        let max = samples.iter().cloned().fold(0.0f32, f32::max);
        assert!((max - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_pulse_train_is_silent_between_pulses() {
        let samples = generate_pulse_train(120.0, 8000, 2.0, 440.0, 100, 0.8);
        assert_eq!(samples.len(), 16000);
        // 100 ms pulse, 500 ms beat: samples 800..4000 are silent
        assert!(samples[1000..3900].iter().all(|&s| s == 0.0));
        assert!(samples[4000..4800].iter().any(|&s| s.abs() > 0.1));
    }

    #[test]
    fn test_chord_peak_bounded() {
        let samples = generate_chord(&[261.63, 329.63, 392.0], 8000, 0.5, 0.9);
        assert!(samples.iter().all(|s| s.abs() <= 0.9 + 1e-4));
    }

    #[test]
    fn test_stepped_levels_length() {
        let samples = generate_stepped_levels(&[(1.0, 0.1), (2.0, 0.5)], 220.0, 8000);
        assert_eq!(samples.len(), 24000);
    }

    #[test]
    fn test_padding() {
        let padded = pad_with_silence(&[1.0; 10], 1000, 0.5, 0.25);
        assert_eq!(padded.len(), 500 + 10 + 250);
        assert_eq!(padded[500], 1.0);
        assert_eq!(padded[0], 0.0);
    }

    #[test]
    fn test_white_noise_is_reproducible() {
        let a = generate_white_noise(8000, 0.5, 1.0, 7);
        let b = generate_white_noise(8000, 0.5, 1.0, 7);
        assert_eq!(a, b);
        assert!(a.iter().any(|&s| s > 0.0) && a.iter().any(|&s| s < 0.0));
    }
}

//! Per-segment effects chain: 3-band EQ, tap reverb and feedback delay.
//!
//! Effects run on a clip after it is cut and faded and before it is leveled,
//! so the loudness pass also absorbs whatever gain the chain adds. Delayed
//! material never extends the clip; anything past its end is dropped.

use std::f32::consts::{FRAC_1_SQRT_2, PI};

use serde::{Deserialize, Serialize};

use crate::audio::{db_to_linear, AudioBuffer};

/// Crossover between the low and mid bands.
pub const LOW_SPLIT_HZ: f32 = 220.0;
/// Crossover between the mid and high bands.
pub const HIGH_SPLIT_HZ: f32 = 4_000.0;
const REVERB_TAPS_MS: [u64; 4] = [70, 130, 190, 260];
const REVERB_DAMPING_HZ: f32 = 6_200.0;
const MIN_TAP_GAIN: f32 = 0.01;
const MAX_EQ_GAIN_DB: f32 = 24.0;
const MAX_DELAY_MS: u64 = 1_200;
const MAX_DELAY_FEEDBACK: f32 = 0.95;
const MAX_DELAY_REPEATS: u32 = 8;
const DEFAULT_DELAY_REPEATS: u32 = 3;
/// Band gains this close to 0 dB are treated as flat.
const FLAT_EQ_DB: f32 = 0.1;

/// Gain per EQ band, in dB.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EqGains {
    pub low_db: f32,
    pub mid_db: f32,
    pub high_db: f32,
}

impl EqGains {
    pub fn is_flat(&self) -> bool {
        [self.low_db, self.mid_db, self.high_db]
            .iter()
            .all(|db| db.abs() <= FLAT_EQ_DB)
    }
}

/// Effects for one rendered segment. The default is completely dry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentEffects {
    pub eq: EqGains,
    /// Wet level of the reverb taps, `0.0..=1.0`.
    pub reverb_amount: f32,
    /// Spacing of the delay repeats; zero disables the delay.
    pub delay_ms: u64,
    /// Level of repeat `n` is `feedback^n`, `0.0..=0.95`.
    pub delay_feedback: f32,
    pub delay_repeats: u32,
}

impl Default for SegmentEffects {
    fn default() -> Self {
        Self {
            eq: EqGains::default(),
            reverb_amount: 0.0,
            delay_ms: 0,
            delay_feedback: 0.0,
            delay_repeats: DEFAULT_DELAY_REPEATS,
        }
    }
}

impl SegmentEffects {
    /// Copy with every parameter clamped into its accepted range.
    pub fn sanitized(&self) -> Self {
        let clamp_db = |db: f32| if db.is_finite() { db.clamp(-MAX_EQ_GAIN_DB, MAX_EQ_GAIN_DB) } else { 0.0 };
        let clamp_unit = |v: f32, max: f32| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
        Self {
            eq: EqGains {
                low_db: clamp_db(self.eq.low_db),
                mid_db: clamp_db(self.eq.mid_db),
                high_db: clamp_db(self.eq.high_db),
            },
            reverb_amount: clamp_unit(self.reverb_amount, 1.0),
            delay_ms: self.delay_ms.min(MAX_DELAY_MS),
            delay_feedback: clamp_unit(self.delay_feedback, MAX_DELAY_FEEDBACK),
            delay_repeats: self.delay_repeats.min(MAX_DELAY_REPEATS),
        }
    }

    fn has_delay(&self) -> bool {
        self.delay_ms > 0 && self.delay_feedback > 0.0 && self.delay_repeats > 0
    }

    pub fn is_dry(&self) -> bool {
        self.eq.is_flat() && self.reverb_amount <= 0.0 && !self.has_delay()
    }

    /// Run EQ, then reverb, then delay over `clip` in place.
    pub fn apply(&self, clip: &mut AudioBuffer) {
        let effects = self.sanitized();
        if effects.is_dry() || clip.is_empty() {
            return;
        }
        if !effects.eq.is_flat() {
            apply_eq(clip, &effects.eq);
        }
        if effects.reverb_amount > 0.0 {
            apply_reverb(clip, effects.reverb_amount);
        }
        if effects.has_delay() {
            apply_delay(clip, effects.delay_ms, effects.delay_feedback, effects.delay_repeats);
        }
    }
}

/// Biquad coefficients, normalized by `a0`.
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl BiquadCoeffs {
    /// Second-order Butterworth low-pass.
    fn low_pass(freq: f32, sample_rate: u32) -> Self {
        let (cos_w0, alpha) = Self::prewarp(freq, sample_rate);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Second-order Butterworth high-pass.
    fn high_pass(freq: f32, sample_rate: u32) -> Self {
        let (cos_w0, alpha) = Self::prewarp(freq, sample_rate);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn prewarp(freq: f32, sample_rate: u32) -> (f32, f32) {
        let sample_rate = sample_rate.max(1) as f32;
        // Keep the corner below Nyquist for low-rate material.
        let freq = freq.min(sample_rate * 0.45);
        let w0 = 2.0 * PI * freq / sample_rate;
        (w0.cos(), w0.sin() / (2.0 * FRAC_1_SQRT_2))
    }
}

/// Runs one biquad over interleaved samples, one state per channel.
fn filter(samples: &mut [f32], channels: usize, coeffs: &BiquadCoeffs) {
    let mut state = vec![[0.0_f32; 4]; channels];
    for frame in samples.chunks_mut(channels) {
        for (sample, [x1, x2, y1, y2]) in frame.iter_mut().zip(state.iter_mut()) {
            let input = *sample;
            let output = coeffs.b0 * input + coeffs.b1 * *x1 + coeffs.b2 * *x2
                - coeffs.a1 * *y1
                - coeffs.a2 * *y2;
            *x2 = *x1;
            *x1 = input;
            *y2 = *y1;
            *y1 = output;
            *sample = output;
        }
    }
}

/// Fourth-order Linkwitz-Riley section: the same Butterworth stage twice.
fn linkwitz_riley(samples: &[f32], channels: usize, coeffs: BiquadCoeffs) -> Vec<f32> {
    let mut out = samples.to_vec();
    filter(&mut out, channels, &coeffs);
    filter(&mut out, channels, &coeffs);
    out
}

fn apply_eq(clip: &mut AudioBuffer, gains: &EqGains) {
    let rate = clip.sample_rate;
    let channels = clip.channels;
    let low = linkwitz_riley(&clip.samples, channels, BiquadCoeffs::low_pass(LOW_SPLIT_HZ, rate));
    let above_low = linkwitz_riley(&clip.samples, channels, BiquadCoeffs::high_pass(LOW_SPLIT_HZ, rate));
    let mid = linkwitz_riley(&above_low, channels, BiquadCoeffs::low_pass(HIGH_SPLIT_HZ, rate));
    let high = linkwitz_riley(&clip.samples, channels, BiquadCoeffs::high_pass(HIGH_SPLIT_HZ, rate));

    let (low_gain, mid_gain, high_gain) = (
        db_to_linear(gains.low_db),
        db_to_linear(gains.mid_db),
        db_to_linear(gains.high_db),
    );
    for (index, sample) in clip.samples.iter_mut().enumerate() {
        *sample = low[index] * low_gain + mid[index] * mid_gain + high[index] * high_gain;
    }
}

/// Mix `source * gain` into `target`, starting `offset_frames` in.
fn overlay(target: &mut [f32], source: &[f32], offset_frames: usize, channels: usize, gain: f32) {
    let offset = offset_frames * channels;
    if offset >= target.len() {
        return;
    }
    for (dst, src) in target[offset..].iter_mut().zip(source) {
        *dst += src * gain;
    }
}

fn frames_for_ms(clip: &AudioBuffer, ms: u64) -> usize {
    (ms as u128 * clip.sample_rate as u128 / 1000) as usize
}

fn apply_reverb(clip: &mut AudioBuffer, amount: f32) {
    let mut wet = clip.samples.clone();
    filter(&mut wet, clip.channels, &BiquadCoeffs::low_pass(REVERB_DAMPING_HZ, clip.sample_rate));
    for (index, &tap_ms) in REVERB_TAPS_MS.iter().enumerate() {
        let gain = (amount / (index + 1) as f32).max(MIN_TAP_GAIN);
        let offset = frames_for_ms(clip, tap_ms);
        overlay(&mut clip.samples, &wet, offset, clip.channels, gain);
    }
}

fn apply_delay(clip: &mut AudioBuffer, delay_ms: u64, feedback: f32, repeats: u32) {
    let dry = clip.samples.clone();
    for repeat in 1..=repeats {
        let gain = feedback.powi(repeat as i32).max(MIN_TAP_GAIN);
        let offset = frames_for_ms(clip, delay_ms * repeat as u64);
        overlay(&mut clip.samples, &dry, offset, clip.channels, gain);
    }
}

//! In-memory PCM buffer and the sample-level operations used by analysis and rendering.
//!
//! All positions are expressed in milliseconds and converted to frame indices
//! against the buffer's own sample rate. Out-of-range positions are clamped,
//! never rejected.

use super::loader::AudioError;
use super::resample::resample_interleaved;

/// Loudness floor applied to silent or empty material.
pub const SILENCE_FLOOR_DB: f32 = -80.0;

/// Lowest sample rate `mono_samples` will report after decimation.
const MIN_ANALYSIS_RATE: u32 = 2_000;

/// Decoded audio owned by one track or one rendered clip.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Interleaved samples normalized to -1.0..1.0.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: usize,
}

/// Calculate RMS (Root Mean Square) energy of a slice of samples.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Convert a linear RMS value to dBFS, floored at [`SILENCE_FLOOR_DB`].
pub fn rms_to_dbfs(rms: f32) -> f32 {
    if rms <= 0.0 || !rms.is_finite() {
        return SILENCE_FLOOR_DB;
    }
    (20.0 * rms.log10()).max(SILENCE_FLOOR_DB)
}

/// Convert a gain in decibels to a linear multiplier.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Wrap single-channel samples.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Digital silence of the given length.
    pub fn silent(duration_ms: u64, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = (duration_ms as u128 * sample_rate as u128 / 1000) as usize;
        Self::new(vec![0.0; frames * channels], sample_rate, channels)
    }

    /// Number of frames (samples per channel).
    pub fn num_frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Duration in whole milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.num_frames() as u128 * 1000 / self.sample_rate as u128) as u64
    }

    fn frame_at_ms(&self, ms: u64) -> usize {
        let frame = (ms as u128 * self.sample_rate as u128 / 1000) as usize;
        frame.min(self.num_frames())
    }

    fn frames_for_ms(&self, ms: u64) -> usize {
        (ms as u128 * self.sample_rate as u128 / 1000) as usize
    }

    fn sample_range_ms(&self, start_ms: u64, end_ms: u64) -> &[f32] {
        let start = self.frame_at_ms(start_ms);
        let end = self.frame_at_ms(end_ms).max(start);
        &self.samples[start * self.channels..end * self.channels]
    }

    /// Copy out `[start_ms, end_ms)`, clamped to the buffer bounds.
    pub fn slice_ms(&self, start_ms: u64, end_ms: u64) -> AudioBuffer {
        AudioBuffer {
            samples: self.sample_range_ms(start_ms, end_ms).to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Overall loudness of the buffer in dBFS.
    pub fn dbfs(&self) -> f32 {
        rms_to_dbfs(calculate_rms(&self.samples))
    }

    /// Loudness of `[start_ms, end_ms)` without copying.
    pub fn dbfs_range_ms(&self, start_ms: u64, end_ms: u64) -> f32 {
        rms_to_dbfs(calculate_rms(self.sample_range_ms(start_ms, end_ms)))
    }

    /// Average all channels into one.
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks(self.channels)
            .map(|frame| frame.iter().sum::<f32>() / self.channels as f32)
            .collect()
    }

    /// Mono samples reduced toward `target_rate` and capped at `max_points`.
    ///
    /// Decimation averages blocks of samples, then a plain stride caps the
    /// point count. Returns the samples together with their effective rate.
    pub fn mono_samples(&self, target_rate: u32, max_points: usize) -> (Vec<f32>, u32) {
        let mono = self.to_mono();
        if mono.is_empty() || self.sample_rate == 0 {
            return (Vec::new(), self.sample_rate.max(MIN_ANALYSIS_RATE));
        }

        let factor = if target_rate > 0 && self.sample_rate > target_rate {
            self.sample_rate.div_ceil(target_rate) as usize
        } else {
            1
        };
        let decimated: Vec<f32> = if factor > 1 {
            mono.chunks(factor)
                .map(|block| block.iter().sum::<f32>() / block.len() as f32)
                .collect()
        } else {
            mono
        };
        let rate = (self.sample_rate / factor as u32).max(MIN_ANALYSIS_RATE);

        let max_points = max_points.max(1);
        let stride = decimated.len().div_ceil(max_points).max(1);
        if stride == 1 {
            return (decimated, rate);
        }
        let strided = decimated.iter().step_by(stride).copied().collect();
        (strided, (rate / stride as u32).max(MIN_ANALYSIS_RATE))
    }

    pub fn apply_gain_db(&mut self, gain_db: f32) {
        if gain_db == 0.0 {
            return;
        }
        let gain = db_to_linear(gain_db);
        for sample in &mut self.samples {
            *sample *= gain;
        }
    }

    /// Linear fade from silence over the first `duration_ms`.
    pub fn fade_in_ms(&mut self, duration_ms: u64) {
        let frames = self.frames_for_ms(duration_ms).min(self.num_frames());
        if frames == 0 {
            return;
        }
        for (index, frame) in self.samples.chunks_mut(self.channels).take(frames).enumerate() {
            let gain = index as f32 / frames as f32;
            frame.iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Linear fade to silence over the last `duration_ms`.
    pub fn fade_out_ms(&mut self, duration_ms: u64) {
        let total = self.num_frames();
        let frames = self.frames_for_ms(duration_ms).min(total);
        if frames == 0 {
            return;
        }
        let start = total - frames;
        for (offset, frame) in self.samples.chunks_mut(self.channels).skip(start).enumerate() {
            let gain = 1.0 - (offset + 1) as f32 / frames as f32;
            frame.iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Convert to another channel layout and sample rate.
    ///
    /// Downmixing folds input channel `i` into output channel `i % channels`
    /// and averages each group; upmixing repeats the last input channel.
    /// Rate changes go through [`resample_interleaved`].
    pub fn conform_to(&self, sample_rate: u32, channels: usize) -> Result<AudioBuffer, AudioError> {
        let channels = channels.max(1);
        if self.sample_rate == sample_rate && self.channels == channels {
            return Ok(self.clone());
        }

        let remixed: Vec<f32> = if self.channels == channels {
            self.samples.clone()
        } else if channels < self.channels {
            let mut out = Vec::with_capacity(self.num_frames() * channels);
            for frame in self.samples.chunks(self.channels) {
                for channel in 0..channels {
                    let group = frame.iter().skip(channel).step_by(channels);
                    let count = group.clone().count().max(1);
                    out.push(group.sum::<f32>() / count as f32);
                }
            }
            out
        } else {
            let mut out = Vec::with_capacity(self.num_frames() * channels);
            for frame in self.samples.chunks(self.channels) {
                for channel in 0..channels {
                    out.push(frame[channel.min(self.channels - 1)]);
                }
            }
            out
        };

        if self.sample_rate == sample_rate || self.sample_rate == 0 || sample_rate == 0 {
            return Ok(AudioBuffer::new(remixed, self.sample_rate, channels));
        }
        let resampled = resample_interleaved(&remixed, self.sample_rate, sample_rate, channels)?;
        Ok(AudioBuffer::new(resampled, sample_rate, channels))
    }

    /// Append `other`, overlapping the two by `crossfade_ms`.
    ///
    /// Both buffers must share sample rate and channel layout. The overlap is
    /// clamped to the shorter of the two buffers.
    pub fn append_crossfaded(&mut self, other: &AudioBuffer, crossfade_ms: u64) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        debug_assert_eq!(self.channels, other.channels);

        let overlap = self
            .frames_for_ms(crossfade_ms)
            .min(self.num_frames())
            .min(other.num_frames());
        let channels = self.channels;
        let tail_start = (self.num_frames() - overlap) * channels;

        for index in 0..overlap {
            let fade_in = (index + 1) as f32 / (overlap + 1) as f32;
            let fade_out = 1.0 - fade_in;
            for channel in 0..channels {
                let dst = tail_start + index * channels + channel;
                let src = other.samples[index * channels + channel];
                self.samples[dst] = self.samples[dst] * fade_out + src * fade_in;
            }
        }
        self.samples
            .extend_from_slice(&other.samples[overlap * channels..]);
    }
}

//! Band-limited sample-rate conversion using rubato.
//!
//! Clips cut from tracks at different rates are brought to one output rate
//! before they are merged. A windowed-sinc resampler is used so material above
//! the new Nyquist frequency is filtered out instead of folding back.

use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::loader::AudioError;

/// Input frames handed to the resampler per call.
const CHUNK_FRAMES: usize = 4096;
const SINC_LEN: usize = 256;
const F_CUTOFF: f32 = 0.95;
const OVERSAMPLING: usize = 256;

/// Resample interleaved `input` from `input_rate` to `output_rate`.
///
/// The output holds exactly `round(frames * output_rate / input_rate)` frames
/// and is aligned with the input: the resampler's delay is trimmed from the
/// front and its tail is flushed.
pub fn resample_interleaved(
    input: &[f32],
    input_rate: u32,
    output_rate: u32,
    channels: usize,
) -> Result<Vec<f32>, AudioError> {
    let channels = channels.max(1);
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if input_rate == 0 || output_rate == 0 {
        return Err(AudioError::Resample(format!(
            "invalid rates {} -> {}",
            input_rate, output_rate
        )));
    }

    let planar = deinterleave(input, channels);
    let input_frames = planar[0].len();
    let ratio = output_rate as f64 / input_rate as f64;
    let expected_frames = (input_frames as f64 * ratio).round() as usize;

    let params = SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: F_CUTOFF,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: OVERSAMPLING,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, CHUNK_FRAMES, channels)
        .map_err(|e| AudioError::Resample(format!("failed to create resampler: {}", e)))?;
    let delay = resampler.output_delay();
    let wanted = expected_frames + delay;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channels];
    let mut position = 0;
    while position + resampler.input_frames_next() <= input_frames {
        let end = position + resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..end]).collect();
        let produced = resampler
            .process(chunk.as_slice(), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        append_planar(&mut output, produced);
        position = end;
    }
    if position < input_frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|ch| &ch[position..]).collect();
        let produced = resampler
            .process_partial(Some(chunk.as_slice()), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        append_planar(&mut output, produced);
    }
    // Flush the filter tail with silence until the delayed output is complete.
    while output[0].len() < wanted {
        let produced = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        if produced.first().map_or(true, Vec::is_empty) {
            break;
        }
        append_planar(&mut output, produced);
    }

    for channel in &mut output {
        channel.drain(..delay.min(channel.len()));
        channel.resize(expected_frames, 0.0);
    }
    debug!(
        "Resampled {} frames at {} Hz to {} frames at {} Hz ({} channels)",
        input_frames, input_rate, expected_frames, output_rate, channels
    );
    Ok(interleave(&output))
}

fn append_planar(output: &mut [Vec<f32>], produced: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(produced) {
        channel.extend(samples);
    }
}

/// `[L, R, L, R, ...]` to `[[L, L, ...], [R, R, ...]]`.
fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
    let frames = samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (channel, &sample) in planar.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    planar
}

fn interleave(planar: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = planar.first() else {
        return Vec::new();
    };
    let mut interleaved = Vec::with_capacity(first.len() * planar.len());
    for index in 0..first.len() {
        interleaved.extend(planar.iter().map(|channel| channel[index]));
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_and_interleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = deinterleave(&interleaved, 2);
        assert_eq!(planar, vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]]);
        assert_eq!(interleave(&planar), interleaved);
        assert!(interleave(&[]).is_empty());
    }

    #[test]
    fn test_same_rate_is_a_copy() {
        let input = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_interleaved(&input, 44_100, 44_100, 2).unwrap(), input);
    }

    #[test]
    fn test_output_length_is_exact() {
        let input = vec![0.25; 48_000 * 2];
        let output = resample_interleaved(&input, 48_000, 44_100, 2).unwrap();
        assert_eq!(output.len(), 44_100 * 2);

        let short = vec![0.25; 1_000];
        let output = resample_interleaved(&short, 8_000, 22_050, 1).unwrap();
        assert_eq!(output.len(), 2_756);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(matches!(
            resample_interleaved(&[0.5; 8], 0, 8_000, 1),
            Err(AudioError::Resample(_))
        ));
    }
}

//! Decoding of source files into [`AudioBuffer`]s using Symphonia.
//!
//! The composition engine only ever sees decoded buffers; this module is the
//! convenience codec boundary for callers that start from files on disk.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::buffer::AudioBuffer;

/// Errors raised while decoding or converting audio.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode audio: {0}")]
    Decode(#[from] SymphoniaError),

    #[error("No decodable audio track in {0}")]
    NoAudioTrack(String),

    #[error("Source does not declare a sample rate")]
    UnknownSampleRate,

    #[error("Resampling failed: {0}")]
    Resample(String),
}

/// Decode every packet of the first audio track in `path`.
///
/// Corrupt packets are skipped; the decoder is reset when the stream asks
/// for it. Channel count falls back to stereo when the container omits it.
pub fn decode_file(path: &Path) -> Result<AudioBuffer, AudioError> {
    let source = MediaSourceStream::new(Box::new(File::open(path)?), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let (track_id, sample_rate, channels) = {
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::NoAudioTrack(path.display().to_string()))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(AudioError::UnknownSampleRate)?;
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
        (track.id, sample_rate, channels)
    };

    let codec_params = format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .map(|t| t.codec_params.clone())
        .ok_or_else(|| AudioError::NoAudioTrack(path.display().to_string()))?;
    let mut decoder = symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let samples = drain_track(format.as_mut(), decoder.as_mut(), track_id)?;
    log::debug!(
        "Decoded {} ({} Hz, {} ch, {} samples)",
        path.display(),
        sample_rate,
        channels,
        samples.len()
    );

    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

fn drain_track(
    format: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Vec<f32>, AudioError> {
    let mut samples = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(reason)) => {
                log::debug!("Skipping undecodable packet: {}", reason);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let buffer = scratch.get_or_insert_with(|| {
            SampleBuffer::new(decoded.capacity() as u64, *decoded.spec())
        });
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    Ok(samples)
}

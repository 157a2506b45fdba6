//! Destinations for rendered audio.

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::Serialize;
use thiserror::Error;

use crate::audio::AudioBuffer;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio has {0} channels, WAV supports at most 65535")]
    TooManyChannels(usize),
}

/// Reference to one exported clip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentHandle {
    pub name: String,
    /// File location, `None` for in-memory sinks.
    pub path: Option<PathBuf>,
    pub duration_ms: u64,
}

/// Where rendered segments and the merged mix are written.
pub trait AudioSink {
    fn write(&mut self, name: &str, audio: &AudioBuffer) -> Result<SegmentHandle, SinkError>;
}

/// Writes `<name>.wav` files (16-bit PCM) into one directory.
#[derive(Debug, Clone)]
pub struct WavDirectorySink {
    dir: PathBuf,
}

impl WavDirectorySink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl AudioSink for WavDirectorySink {
    fn write(&mut self, name: &str, audio: &AudioBuffer) -> Result<SegmentHandle, SinkError> {
        let channels =
            u16::try_from(audio.channels).map_err(|_| SinkError::TooManyChannels(audio.channels))?;
        let spec = WavSpec {
            channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let path = self.dir.join(format!("{}.wav", name));
        let file = fs::File::create(&path)?;
        let mut writer = WavWriter::new(BufWriter::new(file), spec)?;
        for &sample in &audio.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * 32767.0) as i16)?;
        }
        writer.finalize()?;

        Ok(SegmentHandle {
            name: name.to_string(),
            path: Some(path),
            duration_ms: audio.duration_ms(),
        })
    }
}

/// Keeps every written buffer in order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    writes: Vec<(String, AudioBuffer)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent buffer written under `name`.
    pub fn get(&self, name: &str) -> Option<&AudioBuffer> {
        self.writes
            .iter()
            .rev()
            .find(|(written, _)| written == name)
            .map(|(_, audio)| audio)
    }

    /// How many times `name` was written.
    pub fn count_named(&self, name: &str) -> usize {
        self.writes.iter().filter(|(written, _)| written == name).count()
    }

    /// Every write, oldest first.
    pub fn writes(&self) -> &[(String, AudioBuffer)] {
        &self.writes
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

impl AudioSink for MemorySink {
    fn write(&mut self, name: &str, audio: &AudioBuffer) -> Result<SegmentHandle, SinkError> {
        self.writes.push((name.to_string(), audio.clone()));
        Ok(SegmentHandle {
            name: name.to_string(),
            path: None,
            duration_ms: audio.duration_ms(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_tracks_rewrites() {
        let mut sink = MemorySink::new();
        sink.write("mix", &AudioBuffer::silent(500, 8000, 1)).unwrap();
        let handle = sink.write("mix", &AudioBuffer::silent(1_000, 8000, 1)).unwrap();
        assert_eq!(handle.duration_ms, 1_000);
        assert_eq!(handle.path, None);
        assert_eq!(sink.count_named("mix"), 2);
        assert_eq!(sink.get("mix").map(AudioBuffer::duration_ms), Some(1_000));
        assert!(sink.get("segment_0").is_none());
    }
}

//! Audio buffers, decoding, and synthetic test signals.
//!
//! This module provides:
//! - [`AudioBuffer`]: decoded PCM with the slicing, loudness, fade, and
//!   crossfade operations the engine needs
//! - File decoding via Symphonia (WAV, MP3, FLAC, AAC)
//! - Band-limited sample-rate conversion via rubato
//! - Deterministic signal generators for tests and demos

pub mod buffer;
pub mod loader;
pub mod resample;
pub mod synth;

pub use buffer::{calculate_rms, db_to_linear, rms_to_dbfs, AudioBuffer, SILENCE_FLOOR_DB};
pub use loader::{decode_file, AudioError};
pub use resample::resample_interleaved;
pub use synth::{
    generate_chord, generate_pulse_train, generate_sine, generate_stepped_levels,
    generate_white_noise, pad_with_silence,
};

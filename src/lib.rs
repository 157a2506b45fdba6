//! Mix Composer Core
//!
//! Offline mix composition engine: turns a handful of decoded songs into one
//! continuous, beat-aware, crossfaded mix.
//!
//! # Features
//!
//! - Audio decoding (WAV, MP3, FLAC, AAC) via Symphonia
//! - Tempo, key and section analysis per track
//! - Beat-snapped candidate windows ranked by energy and structure
//! - Transition-optimal selection across tracks (dynamic programming)
//! - Loudness-continuous rendering with per-transition crossfades
//! - Optional per-segment EQ, reverb and delay
//! - Quality review with a single automatic recovery attempt

pub mod analysis;
pub mod audio;
pub mod candidates;
pub mod config;
pub mod optimizer;
pub mod pipeline;
pub mod plan;
pub mod render;
pub mod review;
pub mod timeline;
pub mod transition;

// Re-export commonly used types
pub use analysis::{analyze_track, fallback_profile, DspProfile, KeyScale, TempoStrategy};
pub use audio::{decode_file, AudioBuffer, AudioError};
pub use candidates::{generate_candidates, CandidateRequest, SegmentCandidate, TrackSource, WindowHint};
pub use config::ComposerConfig;
pub use optimizer::{
    optimize_sequence, select_candidates, CandidatePreferenceHint, OptimizerError,
    OptimizerSettings, Selection, SelectionStrategy,
};
pub use pipeline::{AnalysisCache, ComposeError, MixComposer, MixOutput};
pub use plan::{MixIntentPlan, TrackWindow};
pub use render::{
    render_timeline, AudioSink, EqGains, MemorySink, RenderError, RenderSettings, SegmentEffects,
    SegmentHandle, WavDirectorySink,
};
pub use review::{review_mix, MixReviewResult, QualityGate};
pub use timeline::{build_timeline, TimelineSegment};
pub use transition::{harmonic_compatibility, transition_score, TransitionBreakdown};

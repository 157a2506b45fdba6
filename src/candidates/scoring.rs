//! Per-window measurements used to rank candidates within one track.

use crate::analysis::{mean, stddev};
use crate::audio::AudioBuffer;

const EDGE_WINDOW_MS: u64 = 1_200;
const EDGE_PROXIMITY_MS: u64 = 4_000;
const EDGE_PENALTY: f32 = 1.5;
const DROP_FRAMES: usize = 4;
const MAX_DROP_DB: f32 = 6.0;

/// Seam-aware loudness score for `[start_ms, end_ms)` of `audio`.
///
/// Rewards overall and mid-window loudness, penalizes a head/tail level
/// mismatch, and subtracts 1.5 for each end lying within 4 s of the track's
/// own edges.
pub fn transition_aware_score(audio: &AudioBuffer, start_ms: u64, end_ms: u64, source_len_ms: u64) -> f32 {
    let end_ms = end_ms.max(start_ms);
    let len = end_ms - start_ms;
    let edge = EDGE_WINDOW_MS.min(len);

    let avg_db = audio.dbfs_range_ms(start_ms, end_ms);
    let mid_db = audio.dbfs_range_ms(start_ms + len / 4, start_ms + len * 3 / 4);
    let head_db = audio.dbfs_range_ms(start_ms, start_ms + edge);
    let tail_db = audio.dbfs_range_ms(end_ms - edge, end_ms);

    let mut edge_penalty = 0.0;
    if start_ms < EDGE_PROXIMITY_MS {
        edge_penalty += EDGE_PENALTY;
    }
    if source_len_ms.saturating_sub(end_ms) < EDGE_PROXIMITY_MS {
        edge_penalty += EDGE_PENALTY;
    }

    avg_db * 1.1 + mid_db * 0.8 - (head_db - tail_db).abs() * 0.5 - edge_penalty
}

/// Energy-frame span `[start, end)` covered by a window, at least one frame.
///
/// `frame_count` must be non-zero.
pub fn window_frames(frame_count: usize, start_ms: u64, end_ms: u64, frame_ms: u32) -> (usize, usize) {
    let frame_ms = frame_ms.max(1) as u64;
    let start = ((start_ms / frame_ms) as usize).min(frame_count - 1);
    let end = ((end_ms / frame_ms) as usize).max(start + 1).min(frame_count);
    (start, end)
}

/// Mean of the four frames from `start_frame` minus the mean of the four before.
pub fn drop_strength(energies: &[f32], start_frame: usize) -> f32 {
    let pre = &energies[start_frame.saturating_sub(DROP_FRAMES)..start_frame];
    let post = &energies[start_frame..(start_frame + DROP_FRAMES).min(energies.len())];
    (mean(post) - mean(pre)).clamp(-MAX_DROP_DB, MAX_DROP_DB)
}

/// Spread of loudness inside the window.
pub fn waveform_dynamics(energies: &[f32], start_frame: usize, end_frame: usize) -> f32 {
    stddev(&energies[start_frame..end_frame])
}

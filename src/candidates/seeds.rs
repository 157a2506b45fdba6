//! Start-point seeding for the candidate search.
//!
//! Every function here is a pure, order-preserving function of its inputs so
//! the same profile and target always yield the same seed list.

use crate::analysis::{mean, DspProfile};

const MAX_SECTION_SEEDS: usize = 18;
const ENERGY_SEED_COUNT: usize = 6;
const DROP_SEED_COUNT: usize = 6;
const ENERGY_SEED_GAP_MS: u32 = 2_200;
const DROP_SEED_GAP_MS: u32 = 1_800;
const DROP_WINDOW_FRAMES: usize = 3;
const MIN_DROP_RISE_DB: f32 = 0.6;
const TRACK_RATIOS: [f64; 4] = [0.15, 0.35, 0.55, 0.75];

/// Shortest candidate the search path will produce.
pub const MIN_SEARCH_DURATION_MS: u64 = 12_000;
const DURATION_SCALES: [f64; 3] = [0.88, 1.0, 1.12];

/// Round `value_ms` to the nearest beat multiple, clamped to `[0, max_ms]`.
pub fn snap_to_beat_grid(value_ms: u64, beat_interval_ms: u32, max_ms: u64) -> u64 {
    if beat_interval_ms == 0 {
        return value_ms.min(max_ms);
    }
    let beat = beat_interval_ms as u64;
    let snapped = (value_ms + beat / 2) / beat * beat;
    snapped.min(max_ms)
}

fn pick_spaced(ranked: impl IntoIterator<Item = usize>, min_gap: usize, count: usize) -> Vec<usize> {
    let mut chosen: Vec<usize> = Vec::with_capacity(count);
    for index in ranked {
        if chosen.iter().any(|&c| c.abs_diff(index) < min_gap) {
            continue;
        }
        chosen.push(index);
        if chosen.len() >= count {
            break;
        }
    }
    chosen
}

/// Starts of the loudest frames, spaced at least ~2.2 s apart.
pub fn top_energy_starts(energies: &[f32], frame_ms: u32, count: usize) -> Vec<u64> {
    if frame_ms == 0 {
        return Vec::new();
    }
    let mut ranked: Vec<usize> = (0..energies.len()).collect();
    ranked.sort_by(|&a, &b| energies[b].total_cmp(&energies[a]));
    let min_gap = ((ENERGY_SEED_GAP_MS / frame_ms) as usize).max(2);
    pick_spaced(ranked, min_gap, count)
        .into_iter()
        .map(|index| index as u64 * frame_ms as u64)
        .collect()
}

/// Starts where the following frames are clearly louder than the preceding ones.
pub fn top_drop_starts(energies: &[f32], frame_ms: u32, count: usize) -> Vec<u64> {
    if energies.len() < 4 || frame_ms == 0 {
        return Vec::new();
    }
    let mut rises: Vec<(usize, f32)> = (2..energies.len() - 2)
        .map(|index| {
            let pre = mean(&energies[index.saturating_sub(DROP_WINDOW_FRAMES)..index]);
            let post = mean(&energies[index..(index + DROP_WINDOW_FRAMES).min(energies.len())]);
            (index, post - pre)
        })
        .collect();
    rises.sort_by(|a, b| b.1.total_cmp(&a.1));

    let min_gap = ((DROP_SEED_GAP_MS / frame_ms) as usize).max(2);
    let qualifying = rises
        .into_iter()
        .take_while(|&(_, rise)| rise >= MIN_DROP_RISE_DB)
        .map(|(index, _)| index);
    pick_spaced(qualifying, min_gap, count)
        .into_iter()
        .map(|index| index as u64 * frame_ms as u64)
        .collect()
}

/// Ordered seed start points for one track.
///
/// Duplicates are allowed here; the generator dedupes whole windows.
pub fn seed_starts(profile: &DspProfile, suggestion_ms: u64, duration_ms: u64) -> Vec<u64> {
    let beat = profile.beat_interval_ms as u64;
    let frame_ms = profile.frame_size_ms;

    let mut seeds = vec![0, suggestion_ms];
    seeds.extend(profile.section_boundaries_ms.iter().take(MAX_SECTION_SEEDS));
    seeds.extend([
        suggestion_ms.saturating_sub(beat * 8),
        suggestion_ms.saturating_sub(beat * 4),
        suggestion_ms + beat * 4,
        suggestion_ms + beat * 8,
    ]);
    seeds.extend(top_energy_starts(&profile.energy_frames, frame_ms, ENERGY_SEED_COUNT));
    seeds.extend(top_drop_starts(&profile.energy_frames, frame_ms, DROP_SEED_COUNT));
    seeds.extend(
        TRACK_RATIOS
            .iter()
            .map(|ratio| (duration_ms as f64 * ratio) as u64),
    );
    seeds
}

/// Short, nominal and long window lengths around the target.
pub fn duration_variants(target_ms: u64, track_ms: u64) -> [u64; 3] {
    DURATION_SCALES.map(|scale| {
        ((target_ms as f64 * scale) as u64)
            .max(MIN_SEARCH_DURATION_MS)
            .min(track_ms)
    })
}

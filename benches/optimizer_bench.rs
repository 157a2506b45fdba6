//! Benchmarks for cross-track selection and timeline extension.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mix_composer::analysis::KeyScale;
use mix_composer::candidates::SegmentCandidate;
use mix_composer::optimizer::{optimize_sequence, select_candidates, OptimizerSettings};
use mix_composer::plan::MixIntentPlan;
use mix_composer::timeline::build_timeline;

fn pools(tracks: usize, pool_size: usize) -> Vec<Vec<SegmentCandidate>> {
    (0..tracks)
        .map(|track_index| {
            (0..pool_size)
                .map(|rank| {
                    let seed = (track_index * 31 + rank * 17) as u32;
                    SegmentCandidate {
                        candidate_id: format!("t{}c{}", track_index, rank),
                        track_index,
                        start_ms: rank as u64 * 4_000,
                        end_ms: rank as u64 * 4_000 + 24_000 + (seed % 7) as u64 * 3_000,
                        energy_db: -20.0 + (seed % 9) as f32,
                        drop_strength: (seed % 5) as f32 - 2.0,
                        transition_quality: -18.0 + (seed % 4) as f32,
                        section_alignment: (seed % 10) as f32 / 10.0,
                        waveform_dynamics: (seed % 6) as f32,
                        beat_interval_ms: 400 + (seed % 5) * 40,
                        bpm: 0.0,
                        key_index: (seed % 12) as i8,
                        key_scale: if seed % 3 == 0 { KeyScale::Minor } else { KeyScale::Major },
                        key_confidence: 0.3,
                    }
                })
                .collect()
        })
        .collect()
}

fn bench_optimizer(c: &mut Criterion) {
    let mut group = c.benchmark_group("Transition Optimizer");
    let settings = OptimizerSettings::default();

    for tracks in [2, 8, 24] {
        for pool_size in [4, 8, 14] {
            let pools = pools(tracks, pool_size);
            group.bench_with_input(
                BenchmarkId::new(format!("{}_tracks", tracks), pool_size),
                &pools,
                |b, pools| {
                    b.iter(|| black_box(optimize_sequence(pools, &[], None, &settings)));
                },
            );
        }
    }

    group.finish();
}

fn bench_timeline(c: &mut Criterion) {
    let pools = pools(6, 8);
    let settings = OptimizerSettings::default();
    let selection = select_candidates(&pools, &[], None, &settings, true);
    let plan = MixIntentPlan {
        target_total_duration_seconds: Some(1_800),
        ..MixIntentPlan::default_for(6)
    };

    c.bench_function("build_timeline_30min", |b| {
        b.iter(|| black_box(build_timeline(&pools, &selection, &plan)));
    });
}

criterion_group!(benches, bench_optimizer, bench_timeline);
criterion_main!(benches);

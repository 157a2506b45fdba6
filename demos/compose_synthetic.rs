//! Example: Compose a mix from synthetic tracks (or files given on the command line).
//!
//! Run with:
//!     cargo run --example compose_synthetic
//!     cargo run --example compose_synthetic -- a.mp3 b.flac c.wav
//!
//! Set `RUST_LOG=info` to follow the pipeline and `MIX_*` variables to
//! override the engine configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use mix_composer::audio::{decode_file, generate_pulse_train, generate_stepped_levels, AudioBuffer};
use mix_composer::{ComposeError, ComposerConfig, MixComposer, MixIntentPlan, RenderSettings, TrackSource, WavDirectorySink};

const SAMPLE_RATE: u32 = 22050;

fn synthetic_tracks() -> Vec<TrackSource> {
    let mut layered = generate_stepped_levels(
        &[(30.0, 0.15), (45.0, 0.55), (20.0, 0.25), (40.0, 0.5)],
        196.0,
        SAMPLE_RATE,
    );
    let pulse = generate_pulse_train(126.0, SAMPLE_RATE, 135.0, 880.0, 60, 0.3);
    for (sample, beat) in layered.iter_mut().zip(&pulse) {
        *sample += beat;
    }

    vec![
        TrackSource::new(
            "Pulse 120",
            "Synth",
            AudioBuffer::mono(generate_pulse_train(120.0, SAMPLE_RATE, 150.0, 440.0, 100, 0.8), SAMPLE_RATE),
        )
        .with_relevance(0.6),
        TrackSource::new("Layered 126", "Synth", AudioBuffer::mono(layered, SAMPLE_RATE)).with_relevance(0.9),
        TrackSource::new(
            "Steps",
            "Synth",
            AudioBuffer::mono(
                generate_stepped_levels(&[(40.0, 0.3), (40.0, 0.7), (40.0, 0.4)], 293.66, SAMPLE_RATE),
                SAMPLE_RATE,
            ),
        ),
    ]
}

fn file_tracks(paths: &[String]) -> Result<Vec<TrackSource>> {
    paths
        .iter()
        .map(|path| {
            let audio = decode_file(Path::new(path)).with_context(|| format!("Failed to decode {}", path))?;
            let title = Path::new(path)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            Ok(TrackSource::new(title, "unknown", audio))
        })
        .collect()
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Mix Composer - Synthetic Mix Example");
    println!("====================================\n");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let tracks = if args.is_empty() {
        println!("Generating synthetic tracks...");
        synthetic_tracks()
    } else {
        println!("Decoding {} files...", args.len());
        file_tracks(&args)?
    };
    if tracks.is_empty() {
        bail!("No tracks to compose");
    }
    for track in &tracks {
        println!(
            "  {} ({:.1}s, {} Hz, {} ch)",
            track.label(),
            track.audio.duration_ms() as f32 / 1000.0,
            track.audio.sample_rate,
            track.audio.channels
        );
    }
    println!();

    let output_dir = std::env::temp_dir().join("mix_composer_demo");
    let mut sink = WavDirectorySink::new(&output_dir).context("Failed to create output directory")?;

    let plan = MixIntentPlan {
        target_total_duration_seconds: Some(180),
        ..MixIntentPlan::default_for(tracks.len())
    };
    let composer = MixComposer::new(ComposerConfig::from_env(), RenderSettings::default());

    match composer.compose(&tracks, &plan, None, &mut sink) {
        Ok(output) => {
            println!("\nTimeline ({:?} selection):", output.selection_strategy);
            for segment in &output.timeline {
                let candidate = &segment.candidate;
                println!(
                    "  #{:<2} {} {:>6.1}s..{:>6.1}s  {:.1} BPM  fade {:.1}s",
                    segment.position,
                    candidate.candidate_id,
                    candidate.start_ms as f32 / 1000.0,
                    candidate.end_ms as f32 / 1000.0,
                    candidate.bpm,
                    segment.crossfade_to_next_ms as f32 / 1000.0
                );
            }
            println!(
                "\nApproved after {} attempt(s): {:.1}s (minimum {:.1}s)",
                output.attempts, output.review.duration_seconds, output.review.minimum_required_seconds
            );
            if let Some(path) = &output.merged.path {
                println!("Output: {}", path.display());
            }
            Ok(())
        }
        Err(ComposeError::Rejected { reasons, attempts }) => {
            println!("\nMix rejected after {} attempt(s):", attempts);
            for reason in &reasons {
                println!("  - {}", reason);
            }
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

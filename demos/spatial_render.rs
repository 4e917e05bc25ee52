//! # Spatial Render
//!
//! Circle a tone around a 21-speaker dome while a second thread renders it
//! block by block, then print the speaker meters.
//!
//! **Concepts:** Spatializer/renderer split, lock-free updates, metering
//!
//! ```bash
//! RUST_LOG=sfera=debug cargo run --example spatial_render
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sfera::prelude::*;
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 256;

fn dome() -> sfera::Result<SpeakerLayout> {
    let mut speakers = Vec::new();
    for (count, elevation) in [(8usize, 0.0f32), (8, 30.0), (4, 60.0), (1, 90.0)] {
        for i in 0..count {
            let patch = OutputPatch::new(speakers.len() as u16 + 1)?;
            let azimuth = -180.0 + 360.0 * i as f32 / count as f32;
            speakers.push(SpeakerDescriptor::new(
                patch,
                Position::from_degrees(azimuth, elevation, 1.0),
            ));
        }
    }
    Ok(SpeakerLayout::new(speakers)?)
}

fn main() -> sfera::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (spatializer, mut renderer) = Spatializer::builder()
        .sample_rate(SAMPLE_RATE)
        .max_block_size(BLOCK)
        .speaker_layout(dome()?)
        .spat_mode(SpatMode::Hybrid)
        .build()?;
    println!(
        "{}: {} triplets, {} layers",
        spatializer.algorithm_name().unwrap_or("none"),
        spatializer.triplet_count(),
        spatializer.layer_count()
    );

    let tone = SourceIndex::new(1)?;
    spatializer.add_source(SourceDescriptor::new(tone).with_spread(SpreadParams::new(0.2, 0.1)))?;

    let running = Arc::new(AtomicBool::new(true));
    let audio = thread::spawn({
        let running = Arc::clone(&running);
        move || {
            let mut phase = 0.0f64;
            let mut input = vec![0.0f32; BLOCK];
            while running.load(Ordering::Acquire) {
                for sample in input.iter_mut() {
                    *sample = (phase * std::f64::consts::TAU).sin() as f32 * 0.5;
                    phase = (phase + 440.0 / SAMPLE_RATE).fract();
                }
                renderer.process(&[&input], BLOCK);
                // Pace roughly like a real callback.
                thread::sleep(Duration::from_secs_f64(BLOCK as f64 / SAMPLE_RATE));
            }
        }
    });

    for step in 0..=36 {
        let azimuth = -180.0 + 10.0 * step as f32;
        let elevation = 45.0 * (step as f32 / 36.0);
        spatializer.set_source_position(tone, Position::from_degrees(azimuth, elevation, 1.0))?;
        thread::sleep(Duration::from_millis(50));

        if step % 6 == 0 {
            let loudest = spatializer
                .output_patches()
                .iter()
                .map(|patch| (patch, spatializer.speaker_level_db(patch)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((patch, level)) = loudest {
                println!("az {azimuth:6.1}° el {elevation:4.1}°  loudest {patch} at {level:5.1} dB");
            }
        }
    }

    running.store(false, Ordering::Release);
    let _ = audio.join();
    println!("Rendered {} blocks", spatializer.blocks_rendered());
    Ok(())
}

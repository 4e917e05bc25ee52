//! Test helpers and fixtures for sfera integration tests
//!
//! Every test drives the renderer by hand, one block at a time, so results
//! are deterministic and independent of any audio device.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (unity routing)
//! - `GAIN_EPSILON` (1e-4): Panning gains
//! - `PERCEPTUAL_EPSILON` (0.001): Perceptual equivalence (-60dB)
//! - `SILENCE_THRESHOLD` (0.0001): Silence detection (-80dB)

#![allow(dead_code)]

pub mod tolerances;

use sfera::prelude::*;
use sfera::CartesianVector;
use tracing_subscriber::EnvFilter;

/// Default test sample rate
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Standard block size for deterministic testing
pub const TEST_BLOCK_SIZE: usize = 256;

/// Routes engine logs to the test harness. Set `RUST_LOG=sfera=debug` to
/// see layout rebuilds.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn patch(n: u16) -> OutputPatch {
    OutputPatch::new(n).expect("valid output patch")
}

pub fn source(n: u16) -> SourceIndex {
    SourceIndex::new(n).expect("valid source index")
}

/// Speakers numbered from 1 in the order given, at `(azimuth, elevation)`
/// in degrees on the unit sphere.
pub fn layout_from_degrees(positions: &[(f32, f32)]) -> SpeakerLayout {
    let speakers = positions
        .iter()
        .enumerate()
        .map(|(i, &(az, el))| {
            SpeakerDescriptor::new(patch(i as u16 + 1), Position::from_degrees(az, el, 1.0))
        })
        .collect();
    SpeakerLayout::new(speakers).expect("valid layout")
}

/// Eight speakers on the corners of a cube.
pub fn cube_layout() -> SpeakerLayout {
    let mut speakers = Vec::new();
    for z in [1.0f32, -1.0] {
        for (x, y) in [(-1.0f32, 1.0f32), (1.0, 1.0), (1.0, -1.0), (-1.0, -1.0)] {
            let n = speakers.len() as u16 + 1;
            speakers.push(SpeakerDescriptor::new(
                patch(n),
                Position::from_cartesian(CartesianVector::new(x, y, z)),
            ));
        }
    }
    SpeakerLayout::new(speakers).expect("valid cube")
}

/// `count` speakers evenly spaced on the horizontal plane, the first at
/// front.
pub fn ring_layout(count: usize) -> SpeakerLayout {
    let positions: Vec<(f32, f32)> = (0..count)
        .map(|i| (360.0 * i as f32 / count as f32, 0.0))
        .collect();
    layout_from_degrees(&positions)
}

/// 8 + 8 + 4 + 1 dome.
pub fn dome_layout() -> SpeakerLayout {
    let mut positions = Vec::new();
    for (count, elevation) in [(8usize, 0.0f32), (8, 30.0), (4, 60.0), (1, 90.0)] {
        for i in 0..count {
            positions.push((-180.0 + 360.0 * i as f32 / count as f32, elevation));
        }
    }
    layout_from_degrees(&positions)
}

/// Engine with instant gain changes, so the second block after any change
/// already carries the final gains.
pub fn test_engine(layout: SpeakerLayout) -> (Spatializer, AudioRenderer) {
    test_builder()
        .speaker_layout(layout)
        .build()
        .expect("Failed to create test engine")
}

pub fn test_builder() -> SpatializerBuilder {
    init_tracing();
    Spatializer::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .max_block_size(TEST_BLOCK_SIZE)
        .gain_smoothing_secs(0.0)
}

/// Runs `blocks` blocks with the same input for every source.
pub fn render_blocks(renderer: &mut AudioRenderer, inputs: &[&[f32]], blocks: usize) {
    for _ in 0..blocks {
        renderer.process(inputs, TEST_BLOCK_SIZE);
    }
}

/// Last sample written to `patch` in the most recent block.
pub fn last_sample(renderer: &AudioRenderer, patch: OutputPatch) -> f32 {
    renderer.output(patch).last().copied().unwrap_or(0.0)
}

/// Sum of squared last samples over `patches`. With a DC input of 1.0 this
/// is the total panning power.
pub fn output_power(renderer: &AudioRenderer, patches: impl IntoIterator<Item = u16>) -> f32 {
    patches
        .into_iter()
        .map(|n| last_sample(renderer, patch(n)).powi(2))
        .sum()
}

/// Generate a DC offset signal (constant value).
pub fn generate_dc(value: f32, num_samples: usize) -> Vec<f32> {
    vec![value; num_samples]
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Calculate RMS of a signal.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Calculate peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .map(|s| s.abs())
        .fold(0.0_f32, |a, b| a.max(b))
}

/// Assert that a signal is approximately silent (all values near zero).
pub fn assert_silence(samples: &[f32], tolerance: f32) {
    let max = peak(samples);
    assert!(
        max <= tolerance,
        "Expected silence, but peak amplitude was {}",
        max
    );
}

/// Assert that a signal has content (not silent).
pub fn assert_has_audio(samples: &[f32], min_rms: f32) {
    let r = rms(samples);
    assert!(
        r >= min_rms,
        "Expected audio content with RMS >= {}, but RMS was {}",
        min_rms,
        r
    );
}

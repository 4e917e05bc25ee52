//! End-to-end rendering on reference layouts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use sfera::prelude::*;
use sfera::CartesianVector;

use crate::helpers::tolerances::*;
use crate::helpers::*;

/// Polls `condition` for up to five seconds.
fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    false
}

/// A source exactly on a cube corner plays from that corner alone.
#[test]
fn test_cube_corner_source_hits_one_speaker() {
    let (spatializer, mut renderer) = test_engine(cube_layout());
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 3-D"));
    assert!(spatializer.triplet_count() > 0);

    // Speaker 2 sits on the front-right-top corner.
    let corner = Position::from_cartesian(CartesianVector::new(1.0, 1.0, 1.0));
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(corner)).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);

    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = PERCEPTUAL_EPSILON);
    for n in (1..=8).filter(|&n| n != 2) {
        assert_silence(renderer.output(patch(n)), PERCEPTUAL_EPSILON);
    }
}

/// Above a single ring the layered-matrix panner fades toward silence
/// instead of producing garbage.
#[test]
fn test_single_ring_source_above_fades() {
    let (spatializer, mut renderer) = test_builder()
        .speaker_layout(ring_layout(6))
        .spat_mode(SpatMode::Mbap)
        .build()
        .unwrap();
    assert_eq!(spatializer.layer_count(), 1);

    spatializer
        .add_source(
            SourceDescriptor::new(source(1)).with_position(Position::from_degrees(0.0, 45.0, 1.0)),
        )
        .unwrap();
    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);

    for n in 1..=6 {
        assert!(renderer.output(patch(n)).iter().all(|s| s.is_finite()));
    }
    assert_relative_eq!(output_power(&renderer, 1..=6), 0.25, epsilon = PERCEPTUAL_EPSILON);

    // Straight overhead there is nothing left to fade to.
    spatializer.set_source_position(source(1), Position::from_degrees(0.0, 90.0, 1.0)).unwrap();
    render_blocks(&mut renderer, &[&input], 2);
    assert!(output_power(&renderer, 1..=6) < SILENCE_THRESHOLD);
}

/// Renders DC blocks on its own thread until `stop` is set. Returns the
/// renderer, the generation of every block and whether all output stayed
/// finite.
fn spawn_audio_thread(
    renderer: AudioRenderer,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<(AudioRenderer, Vec<u64>, bool)> {
    thread::spawn(move || {
        let mut renderer = renderer;
        let input = generate_dc(1.0, TEST_BLOCK_SIZE);
        let mut generations = Vec::new();
        let mut finite = true;
        while !stop.load(Ordering::Acquire) {
            renderer.process(&[&input], TEST_BLOCK_SIZE);
            generations.push(renderer.generation());
            finite &= renderer
                .outputs()
                .all(|(_, block)| block.iter().all(|s| s.is_finite()));
            thread::yield_now();
        }
        (renderer, generations, finite)
    })
}

/// Swaps in `layout` while the audio thread renders, waits until the new
/// generation has been heard for a few blocks, then stops the thread.
fn swap_while_rendering(
    spatializer: &Spatializer,
    renderer: AudioRenderer,
    layout: SpeakerLayout,
) -> AudioRenderer {
    let stop = Arc::new(AtomicBool::new(false));
    let audio = spawn_audio_thread(renderer, Arc::clone(&stop));

    assert!(wait_until(|| spatializer.rendered_generation() == 1));
    spatializer.set_speaker_layout(layout).unwrap();

    let target = spatializer.layout_generation();
    assert!(wait_until(|| spatializer.rendered_generation() == target));
    let settled = spatializer.blocks_rendered() + 4;
    assert!(wait_until(|| spatializer.blocks_rendered() >= settled));

    stop.store(true, Ordering::Release);
    let (renderer, generations, finite) = audio.join().unwrap();

    assert!(finite);
    assert!(generations.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(generations.first(), Some(&1));
    assert_eq!(generations.last(), Some(&target));
    renderer
}

/// The layout shrinks from eight speakers to three on the horizon while the
/// audio thread keeps rendering.
#[test]
fn test_layout_swap_while_rendering() {
    let (spatializer, renderer) = test_engine(cube_layout());
    spatializer
        .add_source(
            SourceDescriptor::new(source(1)).with_position(Position::from_degrees(0.0, 0.0, 1.0)),
        )
        .unwrap();

    let ring = layout_from_degrees(&[(-60.0, 0.0), (60.0, 0.0), (180.0, 0.0)]);
    let renderer = swap_while_rendering(&spatializer, renderer, ring);
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 2-D"));

    // Front now sits halfway between speakers 1 and 2.
    let half = std::f32::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(last_sample(&renderer, patch(1)), half, epsilon = PERCEPTUAL_EPSILON);
    assert_relative_eq!(last_sample(&renderer, patch(2)), half, epsilon = PERCEPTUAL_EPSILON);
    for n in 3..=8 {
        assert_silence(renderer.output(patch(n)), SILENCE_THRESHOLD);
    }
}

/// The cube shrinks to a single triplet of three speakers mid-stream.
#[test]
fn test_layout_swap_to_single_triplet() {
    let (spatializer, renderer) = test_engine(cube_layout());
    spatializer
        .add_source(
            SourceDescriptor::new(source(1)).with_position(Position::from_degrees(0.0, 60.0, 1.0)),
        )
        .unwrap();
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 3-D"));

    let triplet = layout_from_degrees(&[(-30.0, 0.0), (30.0, 0.0), (0.0, 60.0)]);
    let renderer = swap_while_rendering(&spatializer, renderer, triplet);
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 3-D"));
    assert_eq!(spatializer.triplet_count(), 1);
    assert_eq!(spatializer.output_patches().len(), 3);

    // The source sits on the top speaker of the triplet.
    assert_relative_eq!(last_sample(&renderer, patch(3)), 1.0, epsilon = PERCEPTUAL_EPSILON);
    for n in [1, 2, 4, 5, 6, 7, 8] {
        assert_silence(renderer.output(patch(n)), SILENCE_THRESHOLD);
    }
}

/// Hybrid mode pans each source with its own algorithm over one layout.
#[test]
fn test_hybrid_mixes_algorithms() {
    let (spatializer, mut renderer) = test_builder()
        .speaker_layout(dome_layout())
        .spat_mode(SpatMode::Hybrid)
        .build()
        .unwrap();
    assert_eq!(spatializer.algorithm_name(), Some("Hybrid"));
    assert!(spatializer.triplet_count() > 0);
    assert_eq!(spatializer.layer_count(), 4);

    let position = Position::from_degrees(20.0, 15.0, 1.0);
    spatializer
        .add_source(
            SourceDescriptor::new(source(1))
                .with_position(position)
                .with_spat_mode(SourceSpatMode::Vbap),
        )
        .unwrap();
    spatializer
        .add_source(
            SourceDescriptor::new(source(2))
                .with_position(position)
                .with_spat_mode(SourceSpatMode::Mbap),
        )
        .unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    let silence = generate_dc(0.0, TEST_BLOCK_SIZE);

    render_blocks(&mut renderer, &[&input, &silence], 2);
    let vbap_power = output_power(&renderer, 1..=21);
    let vbap_speakers = (1..=21)
        .filter(|&n| last_sample(&renderer, patch(n)).abs() > SILENCE_THRESHOLD)
        .count();

    render_blocks(&mut renderer, &[&silence, &input], 2);
    let mbap_power = output_power(&renderer, 1..=21);
    let mbap_speakers = (1..=21)
        .filter(|&n| last_sample(&renderer, patch(n)).abs() > SILENCE_THRESHOLD)
        .count();

    assert_relative_eq!(vbap_power, 1.0, epsilon = PERCEPTUAL_EPSILON);
    assert!(vbap_speakers <= 3);
    assert!(mbap_power > 0.1 && mbap_power <= 1.0 + PERCEPTUAL_EPSILON);
    assert!(mbap_speakers > vbap_speakers);
}

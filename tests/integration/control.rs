//! Configuration-thread API: rebuilds, rejected setups and source lifecycle.

use approx::assert_relative_eq;
use proptest::prelude::*;
use sfera::prelude::*;
use sfera::{AttenuationSettings, Error, HrirSet};

use crate::helpers::tolerances::*;
use crate::helpers::*;

#[test]
fn test_rejected_layout_keeps_previous() {
    let (spatializer, mut renderer) = test_engine(cube_layout());
    let corner = Position::from_cartesian(sfera::CartesianVector::new(1.0, 1.0, 1.0));
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(corner)).unwrap();
    let generation = spatializer.layout_generation();

    // Two opposite speakers leave a 180° gap.
    let result = spatializer.set_speaker_layout(layout_from_degrees(&[(0.0, 0.0), (180.0, 0.0)]));
    assert!(matches!(
        result,
        Err(Error::Dsp(sfera::dsp::Error::DegenerateLayout(_)))
    ));

    let result = spatializer.set_speaker_layout(layout_from_degrees(&[(0.0, 0.0)]));
    assert!(matches!(
        result,
        Err(Error::Dsp(sfera::dsp::Error::NotEnoughSpeakers { found: 1, .. }))
    ));

    assert_eq!(spatializer.layout_generation(), generation);
    assert_eq!(spatializer.speaker_layout(), cube_layout());
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 3-D"));

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = PERCEPTUAL_EPSILON);
}

#[test]
fn test_mode_switch_rebuilds() {
    let (spatializer, _renderer) = test_engine(dome_layout());
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 3-D"));
    assert_eq!(spatializer.layer_count(), 0);
    let first = spatializer.layout_generation();

    spatializer.set_spat_mode(SpatMode::Mbap).unwrap();
    assert_eq!(spatializer.spat_mode(), SpatMode::Mbap);
    assert_eq!(spatializer.algorithm_name(), Some("MBAP"));
    assert_eq!(spatializer.layer_count(), 4);
    assert_eq!(spatializer.triplet_count(), 0);
    assert!(spatializer.layout_generation() > first);

    spatializer.set_spat_mode(SpatMode::Hybrid).unwrap();
    assert_eq!(spatializer.algorithm_name(), Some("Hybrid"));
    assert!(spatializer.triplet_count() > 0);
}

#[test]
fn test_planar_layout_uses_pairs() {
    let (spatializer, _renderer) = test_engine(ring_layout(5));
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 2-D"));
    assert_eq!(spatializer.pair_count(), 5);
    assert_eq!(spatializer.triplet_count(), 0);
    assert_eq!(spatializer.output_patches().len(), 5);
}

#[test]
fn test_empty_engine_renders_silence() {
    let (spatializer, mut renderer) = test_builder().build().unwrap();
    assert_eq!(spatializer.algorithm_name(), None);
    spatializer.add_source(SourceDescriptor::new(source(1))).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    assert!(renderer.active_outputs().is_empty());
    assert_silence(renderer.output(patch(1)), FLOAT_EPSILON);

    // Direct outs work before any layout is loaded.
    spatializer.set_source_direct_out(source(1), Some(patch(3)));
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(3)), 1.0, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_source_parameters_round_trip() {
    let (spatializer, _renderer) = test_engine(quad_layout());
    assert!(!spatializer.is_source_enabled(source(4)));

    let spread = SpreadParams::new(0.5, 0.25);
    spatializer.add_source(SourceDescriptor::new(source(4))).unwrap();
    spatializer.set_source_spread(source(4), spread);
    spatializer.set_source_spat_mode(source(4), SourceSpatMode::Mbap);
    spatializer.set_source_position(source(4), Position::from_degrees(-30.0, 10.0, 1.5)).unwrap();

    let descriptor = spatializer.source(source(4));
    assert!(spatializer.is_source_enabled(source(4)));
    assert_eq!(descriptor.index, source(4));
    assert_eq!(descriptor.spread, spread);
    assert_eq!(descriptor.spat_mode, SourceSpatMode::Mbap);
    assert_relative_eq!(descriptor.position.radius(), 1.5, epsilon = 1e-5);

    spatializer.set_source(SourceDescriptor::new(source(4))).unwrap();
    assert_eq!(spatializer.source(source(4)).spread, SpreadParams::default());
}

#[test]
fn test_invalid_parameters_rejected() {
    let (spatializer, _renderer) = test_engine(quad_layout());

    let loud = AttenuationSettings {
        attenuation_db: 6.0,
        cutoff_hz: 2000.0,
    };
    assert!(spatializer.set_attenuation(loud).is_err());
    assert_eq!(spatializer.attenuation(), AttenuationSettings::default());

    assert!(matches!(
        spatializer.set_hrirs(HrirSet::synthetic(44100.0, 16)),
        Err(Error::Dsp(sfera::dsp::Error::InvalidHrir(_)))
    ));
    assert!(spatializer
        .set_hrirs(HrirSet::synthetic(TEST_SAMPLE_RATE as f32, 16))
        .is_ok());
}

#[test]
fn test_reduction_routing_defines_outputs() {
    let (spatializer, _renderer) = test_engine(quad_layout());
    let routing = StereoRouting {
        left: patch(5),
        right: patch(6),
    };
    spatializer
        .set_stereo_reduction(Some(StereoReduction {
            mode: StereoMode::Binaural,
            routing,
        }))
        .unwrap();
    assert_eq!(spatializer.stereo_reduction().map(|r| r.routing), Some(routing));
    assert_eq!(spatializer.algorithm_name(), Some("Binaural"));
    let outputs = spatializer.output_patches();
    assert!(outputs.contains(patch(5)) && outputs.contains(patch(6)));
    assert_eq!(outputs.len(), 2);
}

fn quad_layout() -> SpeakerLayout {
    ring_layout(4)
}

fn mode_strategy() -> impl Strategy<Value = SpatMode> {
    prop_oneof![
        Just(SpatMode::Vbap),
        Just(SpatMode::Mbap),
        Just(SpatMode::Hybrid),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Any source placement renders finite audio with at most unit power.
    #[test]
    fn prop_outputs_finite_and_bounded(
        mode in mode_strategy(),
        azimuth in -180.0f32..180.0,
        elevation in -90.0f32..90.0,
        radius in 0.0f32..3.0,
        azimuth_span in 0.0f32..1.0,
        elevation_span in 0.0f32..1.0,
    ) {
        let (spatializer, mut renderer) = test_builder()
            .speaker_layout(dome_layout())
            .spat_mode(mode)
            .build()
            .unwrap();
        spatializer
            .add_source(
                SourceDescriptor::new(source(1))
                    .with_position(Position::from_degrees(azimuth, elevation, radius))
                    .with_spread(SpreadParams::new(azimuth_span, elevation_span))
                    .with_spat_mode(SourceSpatMode::Mbap),
            )
            .unwrap();

        let input = generate_dc(1.0, TEST_BLOCK_SIZE);
        render_blocks(&mut renderer, &[&input], 2);

        for n in 1..=21 {
            prop_assert!(renderer.output(patch(n)).iter().all(|s| s.is_finite()));
        }
        prop_assert!(output_power(&renderer, 1..=21) <= 1.0 + PERCEPTUAL_EPSILON);
    }
}

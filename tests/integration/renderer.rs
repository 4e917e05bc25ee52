//! Block mixer behaviour: routing, gain staging, reductions and meters.

use approx::assert_relative_eq;
use sfera::prelude::*;
use sfera::{AttenuationSettings, HrirSet};

use crate::helpers::tolerances::*;
use crate::helpers::*;

fn front() -> Position {
    Position::from_degrees(0.0, 0.0, 1.0)
}

fn right() -> Position {
    Position::from_degrees(90.0, 0.0, 1.0)
}

/// Speakers at front, right, back and left on patches 1-4.
fn quad() -> SpeakerLayout {
    ring_layout(4)
}

#[test]
fn test_source_on_speaker_is_unity() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(right())).unwrap();

    let input = generate_dc(0.5, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);

    assert_relative_eq!(last_sample(&renderer, patch(2)), 0.5, epsilon = GAIN_EPSILON);
    for n in [1, 3, 4] {
        assert_silence(renderer.output(patch(n)), GAIN_EPSILON);
    }
}

#[test]
fn test_frames_clamped_to_max_block() {
    let (_spatializer, mut renderer) = test_engine(quad());
    let input = generate_dc(0.0, TEST_BLOCK_SIZE * 2);
    assert_eq!(renderer.process(&[&input], TEST_BLOCK_SIZE * 2), TEST_BLOCK_SIZE);
    assert_eq!(renderer.output(patch(1)).len(), TEST_BLOCK_SIZE);

    // Short inputs never read past their end.
    let short = generate_dc(1.0, 16);
    assert_eq!(renderer.process(&[&short], 64), 64);
}

#[test]
fn test_direct_out_bypasses_panning() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer
        .add_source(
            SourceDescriptor::new(source(1))
                .with_position(front())
                .with_direct_out(Some(patch(7))),
        )
        .unwrap();

    let input = generate_dc(0.5, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(7)), 0.5, epsilon = FLOAT_EPSILON);
    assert!(renderer.active_outputs().contains(patch(7)));
    for n in 1..=4 {
        assert_silence(renderer.output(patch(n)), SILENCE_THRESHOLD);
    }

    // Back to panning: the direct out fades away and the front speaker takes over.
    spatializer.set_source_direct_out(source(1), None);
    render_blocks(&mut renderer, &[&input], 3);
    assert_silence(renderer.output(patch(7)), SILENCE_THRESHOLD);
    assert_relative_eq!(last_sample(&renderer, patch(1)), 0.5, epsilon = GAIN_EPSILON);
}

#[test]
fn test_direct_out_only_speaker_never_panned() {
    let speakers = vec![
        SpeakerDescriptor::new(patch(1), Position::from_degrees(-30.0, 0.0, 1.0)),
        SpeakerDescriptor::new(patch(2), Position::from_degrees(30.0, 0.0, 1.0)),
        SpeakerDescriptor::new(patch(3), Position::from_degrees(180.0, 0.0, 1.0)),
        SpeakerDescriptor::new(patch(4), front()).with_direct_out_only(true),
    ];
    let (spatializer, mut renderer) = test_engine(SpeakerLayout::new(speakers).unwrap());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();
    spatializer
        .add_source(
            SourceDescriptor::new(source(2)).with_direct_out(Some(patch(4))),
        )
        .unwrap();

    let panned = generate_dc(1.0, TEST_BLOCK_SIZE);
    let direct = generate_dc(0.25, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&panned, &direct], 2);

    let half = std::f32::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(last_sample(&renderer, patch(1)), half, epsilon = GAIN_EPSILON);
    assert_relative_eq!(last_sample(&renderer, patch(2)), half, epsilon = GAIN_EPSILON);
    assert_relative_eq!(last_sample(&renderer, patch(4)), 0.25, epsilon = FLOAT_EPSILON);
}

#[test]
fn test_speaker_trim_applies() {
    let speakers = vec![
        SpeakerDescriptor::new(patch(1), Position::from_degrees(-90.0, 0.0, 1.0)),
        SpeakerDescriptor::new(patch(2), Position::from_degrees(90.0, 0.0, 1.0)).with_gain_db(-6.0),
        SpeakerDescriptor::new(patch(3), Position::from_degrees(180.0, 0.0, 1.0)),
        SpeakerDescriptor::new(patch(4), front()),
    ];
    let (spatializer, mut renderer) = test_engine(SpeakerLayout::new(speakers).unwrap());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(right())).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(2)), 0.501_187, epsilon = GAIN_EPSILON);
}

#[test]
fn test_source_mute_and_solo() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();
    spatializer.add_source(SourceDescriptor::new(source(2)).with_position(right())).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    let inputs: [&[f32]; 2] = [&input, &input];

    spatializer.set_source_mute(source(1), true);
    render_blocks(&mut renderer, &inputs, 2);
    assert_silence(renderer.output(patch(1)), SILENCE_THRESHOLD);
    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = GAIN_EPSILON);

    spatializer.set_source_mute(source(1), false);
    spatializer.set_source_solo(source(1), true);
    assert!(spatializer.is_source_soloed(source(1)));
    render_blocks(&mut renderer, &inputs, 2);
    assert_relative_eq!(last_sample(&renderer, patch(1)), 1.0, epsilon = GAIN_EPSILON);
    assert_silence(renderer.output(patch(2)), SILENCE_THRESHOLD);

    spatializer.set_source_solo(source(1), false);
    render_blocks(&mut renderer, &inputs, 2);
    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = GAIN_EPSILON);
}

#[test]
fn test_speaker_mute_and_solo() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();
    spatializer.add_source(SourceDescriptor::new(source(2)).with_position(right())).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    let inputs: [&[f32]; 2] = [&input, &input];

    spatializer.set_speaker_mute(patch(1), true);
    render_blocks(&mut renderer, &inputs, 2);
    assert_silence(renderer.output(patch(1)), SILENCE_THRESHOLD);
    assert!(spatializer.speaker_state(patch(1)).muted);

    spatializer.set_speaker_mute(patch(1), false);
    spatializer.set_speaker_solo(patch(1), true);
    render_blocks(&mut renderer, &inputs, 2);
    assert_relative_eq!(last_sample(&renderer, patch(1)), 1.0, epsilon = GAIN_EPSILON);
    assert_silence(renderer.output(patch(2)), SILENCE_THRESHOLD);
}

#[test]
fn test_disabled_source_goes_silent() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    assert_has_audio(renderer.output(patch(1)), 0.5);

    spatializer.disable_source(source(1));
    assert!(!spatializer.is_source_enabled(source(1)));
    render_blocks(&mut renderer, &[&input], 2);
    for n in 1..=4 {
        assert_silence(renderer.output(patch(n)), SILENCE_THRESHOLD);
    }

    spatializer.enable_source(source(1));
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(1)), 1.0, epsilon = GAIN_EPSILON);
}

/// A moving source never produces a step between consecutive samples.
#[test]
fn test_moving_source_is_continuous() {
    let (spatializer, mut renderer) = test_builder()
        .gain_smoothing_secs(0.02)
        .speaker_layout(quad())
        .build()
        .unwrap();
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 40);

    let mut previous = last_sample(&renderer, patch(1));
    spatializer.set_source_position(source(1), right()).unwrap();
    let mut max_step = 0.0f32;
    for _ in 0..40 {
        renderer.process(&[&input], TEST_BLOCK_SIZE);
        for &sample in renderer.output(patch(1)) {
            max_step = max_step.max((sample - previous).abs());
            previous = sample;
        }
    }
    assert!(max_step < 0.01, "largest step {max_step}");
    assert_silence(renderer.output(patch(1)), PERCEPTUAL_EPSILON);
}

#[test]
fn test_master_gain() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();
    spatializer.set_master_gain_db(-6.0).unwrap();
    assert_relative_eq!(spatializer.master_gain_db(), -6.0, epsilon = 1e-4);

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(1)), 0.501_187, epsilon = GAIN_EPSILON);

    assert!(spatializer.set_master_gain_db(f32::NAN).is_err());
}

#[test]
fn test_meters_follow_signal() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();

    let input = generate_dc(0.5, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);

    assert_relative_eq!(spatializer.source_level_db(source(1)), -6.0206, epsilon = 0.01);
    assert_relative_eq!(spatializer.speaker_level_db(patch(1)), -6.0206, epsilon = 0.01);
    let state = spatializer.speaker_state(patch(1));
    assert!(state.active && !state.muted && !state.soloed);
    assert!(!spatializer.speaker_state(patch(9)).active);

    spatializer.reset_meters();
    assert!(spatializer.speaker_level_db(patch(1)) <= -120.0);
}

#[test]
fn test_distance_attenuation_on_layered_sources() {
    let (spatializer, mut renderer) = test_builder()
        .speaker_layout(ring_layout(6))
        .spat_mode(SpatMode::Mbap)
        .attenuation(AttenuationSettings {
            attenuation_db: -12.0,
            cutoff_hz: 2000.0,
        })
        .build()
        .unwrap();
    spatializer
        .add_source(
            SourceDescriptor::new(source(1)).with_position(Position::from_degrees(0.0, 0.0, 2.0)),
        )
        .unwrap();

    // DC passes the lowpass untouched once it settles.
    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 4);
    let expected = 10.0f32.powf(-12.0 / 20.0);
    assert_relative_eq!(
        output_power(&renderer, 1..=6).sqrt(),
        expected,
        epsilon = PERCEPTUAL_EPSILON
    );

    // Attenuation off: full power again.
    spatializer
        .set_attenuation(AttenuationSettings {
            attenuation_db: 0.0,
            cutoff_hz: 20000.0,
        })
        .unwrap();
    render_blocks(&mut renderer, &[&input], 4);
    assert_relative_eq!(output_power(&renderer, 1..=6), 1.0, epsilon = PERCEPTUAL_EPSILON);
}

#[test]
fn test_stereo_reduction() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();
    spatializer
        .set_stereo_reduction(Some(StereoReduction {
            mode: StereoMode::Stereo,
            routing: StereoRouting::default(),
        }))
        .unwrap();
    assert_eq!(spatializer.algorithm_name(), Some("Stereo"));

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    let half = std::f32::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(last_sample(&renderer, patch(1)), half, epsilon = GAIN_EPSILON);
    assert_relative_eq!(last_sample(&renderer, patch(2)), half, epsilon = GAIN_EPSILON);
    assert_silence(renderer.output(patch(3)), SILENCE_THRESHOLD);
    assert_silence(renderer.output(patch(4)), SILENCE_THRESHOLD);

    spatializer.set_source_position(source(1), right()).unwrap();
    render_blocks(&mut renderer, &[&input], 2);
    assert_silence(renderer.output(patch(1)), GAIN_EPSILON);
    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = GAIN_EPSILON);

    // Back to the speakers.
    spatializer.set_stereo_reduction(None).unwrap();
    assert_eq!(spatializer.algorithm_name(), Some("VBAP 2-D"));
    render_blocks(&mut renderer, &[&input], 2);
    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = GAIN_EPSILON);
    assert_eq!(renderer.generation(), spatializer.layout_generation());
}

#[test]
fn test_non_finite_position_rejected() {
    let (spatializer, mut renderer) = test_engine(quad());
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(front())).unwrap();
    spatializer
        .set_stereo_reduction(Some(StereoReduction {
            mode: StereoMode::Stereo,
            routing: StereoRouting::default(),
        }))
        .unwrap();

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);

    let result =
        spatializer.set_source_position(source(1), Position::from_degrees(f32::NAN, 0.0, 0.0));
    assert!(matches!(
        result,
        Err(sfera::Error::Core(sfera::core::Error::InvalidParameter(_)))
    ));
    let far = sfera::CartesianVector::new(f32::INFINITY, 0.0, 0.0);
    let runaway = SourceDescriptor::new(source(1)).with_position(Position::from_cartesian(far));
    assert!(spatializer.set_source(runaway.clone()).is_err());
    assert!(spatializer.add_source(runaway.with_spat_mode(SourceSpatMode::Mbap)).is_err());

    // The previous position keeps sounding.
    let kept = spatializer.source(source(1)).position;
    assert_relative_eq!(kept.cartesian().y, 1.0, epsilon = FLOAT_EPSILON);
    render_blocks(&mut renderer, &[&input], 2);
    let half = std::f32::consts::FRAC_1_SQRT_2;
    assert_relative_eq!(last_sample(&renderer, patch(1)), half, epsilon = GAIN_EPSILON);

    spatializer.set_source_position(source(1), right()).unwrap();
    render_blocks(&mut renderer, &[&input], 20);
    for n in 1..=2 {
        assert!(renderer.output(patch(n)).iter().all(|s| s.is_finite()));
    }
    assert_relative_eq!(last_sample(&renderer, patch(2)), 1.0, epsilon = GAIN_EPSILON);
}

#[test]
fn test_extreme_spread_stays_finite() {
    let (spatializer, mut renderer) = test_builder()
        .speaker_layout(dome_layout())
        .spat_mode(SpatMode::Mbap)
        .build()
        .unwrap();
    spatializer
        .add_source(
            SourceDescriptor::new(source(1))
                .with_position(Position::from_degrees(30.0, 20.0, 1.0))
                .with_spread(SpreadParams::new(4.0, f32::NAN)),
        )
        .unwrap();
    assert_eq!(spatializer.source(source(1)).spread, SpreadParams::new(1.0, 0.0));

    let input = generate_dc(1.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 2);
    for n in 1..=21 {
        assert!(renderer.output(patch(n)).iter().all(|s| s.is_finite()));
    }
    assert!(output_power(&renderer, 1..=21) <= 1.0 + PERCEPTUAL_EPSILON);
}

#[test]
fn test_binaural_reduction() {
    let (spatializer, mut renderer) = test_builder()
        .hrirs(HrirSet::synthetic(TEST_SAMPLE_RATE as f32, 32))
        .stereo_reduction(StereoReduction {
            mode: StereoMode::Binaural,
            routing: StereoRouting::default(),
        })
        .build()
        .unwrap();
    assert_eq!(spatializer.algorithm_name(), Some("Binaural"));
    spatializer.add_source(SourceDescriptor::new(source(1)).with_position(right())).unwrap();

    let input = generate_sine(1000.0, TEST_SAMPLE_RATE, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&input], 4);

    let left = renderer.output(patch(1));
    let right_ear = renderer.output(patch(2));
    assert!(left.iter().chain(right_ear).all(|s| s.is_finite()));
    assert_has_audio(right_ear, 0.05);
    assert!(rms(right_ear) > rms(left) * 1.5);

    // Silence in, silence out once the filter tails have rung out.
    let silence = generate_dc(0.0, TEST_BLOCK_SIZE);
    render_blocks(&mut renderer, &[&silence], 2);
    assert_silence(renderer.output(patch(1)), SILENCE_THRESHOLD);
    assert_silence(renderer.output(patch(2)), SILENCE_THRESHOLD);
}

//! Panning solvers for the sfera spatialization engine.
//!
//! Everything here runs on the configuration thread except the streaming
//! stages ([`BinauralConvolver`], [`DistanceFilter`], [`Lr4State`]), which
//! are allocation-free once built.
//!
//! # Example
//!
//! ```
//! use sfera_core::{OutputPatch, Position, SpatConfig};
//! use sfera_dsp::{GainSet, SpeakerDescriptor, SpeakerLayout, VbapPanner};
//!
//! let speakers = [-30.0f32, 30.0, 110.0, -110.0]
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &az)| {
//!         SpeakerDescriptor::new(
//!             OutputPatch::new(i as u16 + 1).unwrap(),
//!             Position::from_degrees(az, 0.0, 1.0),
//!         )
//!     })
//!     .collect();
//! let layout = SpeakerLayout::new(speakers).unwrap();
//! let tolerance = SpatConfig::default().angle_tolerance().to_radians();
//! let panner = VbapPanner::new(&layout, tolerance).unwrap();
//!
//! let mut gains = GainSet::new();
//! panner.compute(&Position::from_degrees(0.0, 0.0, 1.0), &mut gains);
//! assert!((gains.power() - 1.0).abs() < 1e-4);
//! ```

mod error;
pub use error::{Error, Result};

pub mod crossover;
pub use crossover::{BiquadCoefficients, HighpassCoefficients, Lr4State};

pub mod spatial;
pub use spatial::{
    constant_power_gains, spread_ring_weight, virtual_layout, AttenuationSettings,
    AttenuationState, BinauralConvolver, BinauralPanner, DistanceFilter, GainSet, HrirEntry,
    HrirSet, HybridPanner, LayeredPanner, SourceDescriptor, SourceSpatData, SourceSpatMode,
    SpatAlgorithm, SpatMode, SpeakerDescriptor, SpeakerLayout, SpeakerPair, SpreadParams,
    StereoMode, StereoPanner, StereoReduction, StereoRouting, Triplet, VbapPanner,
    DEFAULT_ATTENUATION_DB, DEFAULT_CUTOFF_HZ, MAX_ATTENUATION_RADIUS, VIRTUAL_SPEAKER_COUNT,
};

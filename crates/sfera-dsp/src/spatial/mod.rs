//! Speaker-layout panning: VBAP, layered-matrix (MBAP), hybrid, stereo and
//! binaural reductions, plus distance attenuation.

pub mod types;
pub use types::{
    GainSet, SourceDescriptor, SourceSpatData, SourceSpatMode, SpatMode, SpeakerDescriptor,
    SpeakerLayout, SpreadParams, StereoMode, StereoReduction, StereoRouting, MAX_HIGHPASS_HZ,
    POWER_EPSILON,
};

mod utils;

mod algorithm;
mod attenuation;
mod binaural_panner;
mod hybrid;
mod layered_panner;
mod stereo_panner;
mod triangulation;
mod vbap_panner;

pub use algorithm::SpatAlgorithm;
pub use attenuation::{
    AttenuationSettings, AttenuationState, DistanceFilter, DEFAULT_ATTENUATION_DB,
    DEFAULT_CUTOFF_HZ, MAX_ATTENUATION_RADIUS,
};
pub use binaural_panner::{
    virtual_layout, BinauralConvolver, BinauralPanner, HrirEntry, HrirSet, VIRTUAL_SPEAKER_COUNT,
};
pub use hybrid::HybridPanner;
pub use layered_panner::LayeredPanner;
pub use stereo_panner::{constant_power_gains, StereoPanner};
pub use triangulation::{SpeakerPair, Triplet};
pub use vbap_panner::{spread_ring_weight, VbapPanner, SPREAD_RINGS};

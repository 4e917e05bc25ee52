//! # Sfera - Real-time Multi-Source Spatialization
//!
//! Places up to [`MAX_SOURCES`] mono sources around a listener and renders
//! them onto up to [`MAX_OUTPUT_PATCHES`] speaker outputs, or onto a stereo
//! or binaural pair.
//!
//! ## Architecture
//!
//! Sfera is an umbrella crate that coordinates:
//! - **sfera-core** - Geometry, strong identifiers, lock-free updaters,
//!   smoothing and metering
//! - **sfera-dsp** - Panners (VBAP, layered-matrix, hybrid, stereo,
//!   binaural), distance attenuation and crossover filters
//!
//! The engine is split in two halves:
//! - [`Spatializer`] lives on the configuration thread. It rebuilds
//!   triangulations and computes per-source gains.
//! - [`AudioRenderer`] lives on the audio thread. It picks up the latest
//!   gains once per block and mixes, without locking or allocating.
//!
//! ## Quick Start
//!
//! ```
//! use sfera::prelude::*;
//!
//! // Four speakers on the horizontal plane and one overhead
//! let positions = [(-45.0, 0.0), (45.0, 0.0), (135.0, 0.0), (-135.0, 0.0), (0.0, 90.0)];
//! let speakers = positions
//!     .iter()
//!     .enumerate()
//!     .map(|(i, &(az, el))| {
//!         SpeakerDescriptor::new(
//!             OutputPatch::new(i as u16 + 1).unwrap(),
//!             Position::from_degrees(az, el, 1.0),
//!         )
//!     })
//!     .collect();
//!
//! let (spatializer, mut renderer) = Spatializer::builder()
//!     .max_block_size(128)
//!     .speaker_layout(SpeakerLayout::new(speakers)?)
//!     .build()?;
//!
//! let source = SourceIndex::new(1)?;
//! spatializer
//!     .add_source(
//!         SourceDescriptor::new(source).with_position(Position::from_degrees(20.0, 30.0, 1.0)),
//!     )?;
//!
//! // Audio callback
//! let input = vec![0.25f32; 128];
//! renderer.process(&[&input], 128);
//! let front_left = renderer.output(OutputPatch::new(1)?);
//! assert_eq!(front_left.len(), 128);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Re-export of sfera-core for direct access
pub use sfera_core as core;

/// Re-export of sfera-dsp for direct access
pub use sfera_dsp as dsp;

pub use sfera_core::{
    // Geometry
    CartesianVector,
    Degrees,
    // Identifiers
    IndexSet,
    OutputPatch,
    PolarVector,
    Position,
    Radians,
    SourceIndex,
    // Configuration
    SpatConfig,
    StrongArray,
    StrongIndex,
    MAX_OUTPUT_PATCHES,
    MAX_SOURCES,
};

pub use sfera_dsp::{
    AttenuationSettings, GainSet, HrirEntry, HrirSet, SourceDescriptor, SourceSpatMode, SpatMode,
    SpeakerDescriptor, SpeakerLayout, SpreadParams, StereoMode, StereoReduction, StereoRouting,
};

mod builder;
mod engine;
mod error;
mod renderer;
mod state;

pub use builder::{SpatializerBuilder, DEFAULT_HRIR_LENGTH};
pub use engine::Spatializer;
pub use error::{Error, Result};
pub use renderer::AudioRenderer;
pub use state::SpeakerState;

/// Convenience prelude for common imports
pub mod prelude {
    // Engine halves
    pub use crate::{AudioRenderer, Spatializer, SpatializerBuilder};

    // Scene description
    pub use crate::{
        OutputPatch, Position, SourceDescriptor, SourceIndex, SourceSpatMode, SpatMode,
        SpeakerDescriptor, SpeakerLayout, SpreadParams,
    };

    // Reductions
    pub use crate::{StereoMode, StereoReduction, StereoRouting};
}

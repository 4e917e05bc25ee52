//! Real-time building blocks for the sfera spatialization engine.
//!
//! # Primary API
//!
//! - [`updater`] / [`Publisher`] / [`Subscriber`]: single-slot lock-free
//!   handoff from the configuration thread to the audio thread
//! - [`Position`], [`CartesianVector`], [`PolarVector`]: geometry primitives
//! - [`SourceIndex`], [`OutputPatch`], [`StrongArray`], [`IndexSet`]:
//!   strongly typed 1-based identifiers with fixed-capacity storage
//! - [`GainRamp`], [`SmoothedValue`]: gain smoothing
//! - [`LevelMeters`]: lock-free peak meters
//! - [`SpatConfig`]: engine configuration
//!
//! # Example
//!
//! ```
//! use sfera_core::{updater, Position};
//!
//! let (mut publisher, mut subscriber) = updater(Position::default());
//! publisher.publish_value(Position::from_degrees(45.0, 10.0, 1.0));
//!
//! // Audio thread, once per block
//! if subscriber.update() {
//!     let _direction = subscriber.current().direction();
//! }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::SpatConfig;

pub mod geometry;
pub use geometry::{
    CartesianVector, Degrees, PolarVector, Position, Radians, DEFAULT_ANGLE_TOLERANCE,
    LENGTH_EPSILON,
};

pub mod ids;
pub use ids::{
    IndexSet, OutputPatch, SourceIndex, StrongArray, StrongIndex, MAX_OUTPUT_PATCHES, MAX_SOURCES,
};

pub(crate) mod lockfree;
pub use lockfree::{AtomicFlag, AtomicFloat};

pub mod metering;
pub use metering::{block_peak, db_to_gain, gain_to_db, release_coefficient, LevelMeters};

pub mod smooth;
pub use smooth::{block_smoothing_coefficient, GainRamp, SmoothedValue};

pub mod updater;
pub use updater::{updater, Publisher, Subscriber};

pub use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
pub use std::sync::Arc;

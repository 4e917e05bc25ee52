//! Tolerance constants for rendering tests.
//!
//! Different operations require different precision levels.

/// Floating point rounding errors (unity routing, exact gains).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Panning solvers: matrix inversion and normalization in single precision.
pub const GAIN_EPSILON: f32 = 1e-4;

/// Audio perceptual tolerance (~-60dB, inaudible differences).
pub const PERCEPTUAL_EPSILON: f32 = 0.001;

/// Silence threshold (~-80dB).
/// Values below this are considered silent.
pub const SILENCE_THRESHOLD: f32 = 0.0001;

//! Spatialization engine configuration.

use serde::{Deserialize, Serialize};

use crate::geometry::Degrees;
use crate::{Error, Result};

/// Configuration for the spatialization engine.
///
/// Fixed for the lifetime of a renderer: the audio thread preallocates its
/// buffers from `max_block_size` and derives smoothing coefficients from
/// `sample_rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatConfig {
    pub sample_rate: f64,
    /// Largest number of frames the audio callback will pass in one block.
    pub max_block_size: usize,
    /// One-pole time constant applied to per-speaker gain changes.
    pub gain_smoothing_secs: f32,
    /// Tolerance for grouping speakers into elevation layers and for
    /// deciding whether a layout is planar.
    pub angle_tolerance_deg: f32,
    /// Side length of the square gain grid precomputed per speaker by the
    /// layered-matrix panner.
    pub lbap_grid_resolution: usize,
    /// Distance on the projection plane at which a grid cell reaches zero.
    pub lbap_falloff_radius: f32,
}

impl Default for SpatConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_size: 1024,
            gain_smoothing_secs: 0.02,
            angle_tolerance_deg: 5.0,
            lbap_grid_resolution: 64,
            lbap_falloff_radius: core::f32::consts::SQRT_2,
        }
    }
}

impl SpatConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000.0..=384000.0).contains(&self.sample_rate) {
            return Err(Error::InvalidConfig(format!(
                "sample_rate {} out of range (8000-384000 Hz)",
                self.sample_rate
            )));
        }
        if self.max_block_size == 0 || self.max_block_size > 16384 {
            return Err(Error::InvalidConfig(format!(
                "max_block_size {} out of range (1-16384)",
                self.max_block_size
            )));
        }
        if !self.gain_smoothing_secs.is_finite() || self.gain_smoothing_secs < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "gain_smoothing_secs must be a non-negative number, got {}",
                self.gain_smoothing_secs
            )));
        }
        if !(self.angle_tolerance_deg > 0.0 && self.angle_tolerance_deg <= 45.0) {
            return Err(Error::InvalidConfig(format!(
                "angle_tolerance_deg {} out of range (0-45)",
                self.angle_tolerance_deg
            )));
        }
        if !(2..=512).contains(&self.lbap_grid_resolution) {
            return Err(Error::InvalidConfig(format!(
                "lbap_grid_resolution {} out of range (2-512)",
                self.lbap_grid_resolution
            )));
        }
        if !(self.lbap_falloff_radius.is_finite() && self.lbap_falloff_radius > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "lbap_falloff_radius must be positive, got {}",
                self.lbap_falloff_radius
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn angle_tolerance(&self) -> Degrees {
        Degrees(self.angle_tolerance_deg)
    }
}

//! Distance attenuation: overall loudness and brightness falloff with radius.
//!
//! Independent of direction. A source at or inside radius 1 is untouched;
//! from radius 1 to [`MAX_ATTENUATION_RADIUS`] the gain moves linearly toward
//! the configured attenuation and a one-pole lowpass closes toward the
//! configured cutoff. Beyond that both hold.

use crate::{Error, Result};

/// Radius at which the full attenuation applies.
pub const MAX_ATTENUATION_RADIUS: f32 = 2.0;

/// Default attenuation at [`MAX_ATTENUATION_RADIUS`].
pub const DEFAULT_ATTENUATION_DB: f32 = -12.0;

/// Default lowpass cutoff at [`MAX_ATTENUATION_RADIUS`].
pub const DEFAULT_CUTOFF_HZ: f32 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationSettings {
    /// Level change at maximum distance, in dB (zero or negative).
    pub attenuation_db: f32,
    /// Lowpass cutoff at maximum distance.
    pub cutoff_hz: f32,
}

impl Default for AttenuationSettings {
    fn default() -> Self {
        Self {
            attenuation_db: DEFAULT_ATTENUATION_DB,
            cutoff_hz: DEFAULT_CUTOFF_HZ,
        }
    }
}

impl AttenuationSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.attenuation_db.is_finite() && self.attenuation_db <= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "attenuation {} dB must be zero or negative",
                self.attenuation_db
            )));
        }
        if !(self.cutoff_hz.is_finite() && self.cutoff_hz > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "cutoff {} Hz must be positive",
                self.cutoff_hz
            )));
        }
        Ok(())
    }

    /// Gain and filter coefficient for a source at `radius`.
    pub fn compute(&self, radius: f32, sample_rate: f32) -> AttenuationState {
        if !(radius > 1.0) {
            return AttenuationState::default();
        }
        let t = ((radius - 1.0) / (MAX_ATTENUATION_RADIUS - 1.0)).clamp(0.0, 1.0);
        let target_gain = 10.0_f32.powf(self.attenuation_db / 20.0);
        let nyquist = sample_rate * 0.5;
        let cutoff = self.cutoff_hz.min(nyquist);
        let target_coefficient = (-core::f32::consts::TAU * cutoff / sample_rate).exp();
        AttenuationState {
            gain: 1.0 + t * (target_gain - 1.0),
            coefficient: t * target_coefficient,
        }
    }
}

/// Per-source distance stage: a gain and a one-pole lowpass coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttenuationState {
    pub gain: f32,
    /// Feedback coefficient in `[0, 1)`; zero means no filtering.
    pub coefficient: f32,
}

impl Default for AttenuationState {
    fn default() -> Self {
        Self {
            gain: 1.0,
            coefficient: 0.0,
        }
    }
}

impl AttenuationState {
    #[inline]
    pub fn is_neutral(&self) -> bool {
        self.gain == 1.0 && self.coefficient == 0.0
    }
}

/// One-pole lowpass run on the audio thread: `y = (1 - c)·x + c·y₋₁`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceFilter {
    last: f32,
}

impl DistanceFilter {
    pub fn reset(&mut self) {
        self.last = 0.0;
    }

    /// Filters `input` into `output` (same length).
    #[inline]
    pub fn process(&mut self, coefficient: f32, input: &[f32], output: &mut [f32]) {
        if coefficient <= 0.0 {
            output.copy_from_slice(input);
            self.last = input.last().copied().unwrap_or(self.last);
            return;
        }
        let dry = 1.0 - coefficient;
        let mut last = self.last;
        for (out, &x) in output.iter_mut().zip(input) {
            last = dry * x + coefficient * last;
            *out = last;
        }
        // Flush denormals
        if last.abs() < 1e-20 {
            last = 0.0;
        }
        self.last = last;
    }
}

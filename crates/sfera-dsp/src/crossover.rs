//! Linkwitz–Riley speaker crossover (highpass side).
//!
//! A 4th-order LR highpass is two identical 2nd-order Butterworth highpass
//! biquads in series. Coefficients are computed once per layout change;
//! the per-speaker [`Lr4State`] lives with the audio thread.

use core::f32::consts::{FRAC_1_SQRT_2, TAU};

use crate::{Error, Result};

/// Normalized biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

impl BiquadCoefficients {
    /// RBJ cookbook highpass.
    pub fn highpass(cutoff_hz: f32, q: f32, sample_rate: f32) -> Result<Self> {
        let nyquist = sample_rate * 0.5;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(Error::InvalidParameter(format!(
                "highpass cutoff {cutoff_hz} Hz must be within (0, {nyquist}) Hz"
            )));
        }
        if !(q > 0.0 && q.is_finite()) {
            return Err(Error::InvalidParameter(format!("Q {q} must be positive")));
        }
        let omega = TAU * cutoff_hz / sample_rate;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * q);
        let a0 = 1.0 + alpha;
        Ok(Self {
            b0: (1.0 + cos) * 0.5 / a0,
            b1: -(1.0 + cos) / a0,
            b2: (1.0 + cos) * 0.5 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        })
    }
}

/// Transposed direct form II state.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    s1: f32,
    s2: f32,
}

impl BiquadState {
    #[inline]
    fn tick(&mut self, c: &BiquadCoefficients, x: f32) -> f32 {
        let y = c.b0 * x + self.s1;
        self.s1 = c.b1 * x - c.a1 * y + self.s2;
        self.s2 = c.b2 * x - c.a2 * y;
        y
    }
}

/// Coefficients of a 4th-order Linkwitz–Riley highpass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighpassCoefficients {
    pub cutoff_hz: f32,
    stage: BiquadCoefficients,
}

impl HighpassCoefficients {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Result<Self> {
        Ok(Self {
            cutoff_hz,
            stage: BiquadCoefficients::highpass(cutoff_hz, FRAC_1_SQRT_2, sample_rate)?,
        })
    }
}

/// Filter memory of one LR4 highpass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lr4State {
    stages: [BiquadState; 2],
}

impl Lr4State {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Filters `buffer` in place.
    pub fn process(&mut self, coefficients: &HighpassCoefficients, buffer: &mut [f32]) {
        let c = &coefficients.stage;
        let [first, second] = &mut self.stages;
        for sample in buffer.iter_mut() {
            *sample = second.tick(c, first.tick(c, *sample));
        }
        for stage in self.stages.iter_mut() {
            if stage.s1.abs() < 1e-20 {
                stage.s1 = 0.0;
            }
            if stage.s2.abs() < 1e-20 {
                stage.s2 = 0.0;
            }
        }
    }
}

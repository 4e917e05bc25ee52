//! Azimuth-only constant-power stereo reduction.

use core::f32::consts::FRAC_PI_2;

use sfera_core::Position;

use super::types::{GainSet, SpreadParams, StereoRouting};

/// Constant-power `(left, right)` gains for `pan` in `[-1, 1]` (-1 = left).
#[inline]
pub fn constant_power_gains(pan: f32) -> (f32, f32) {
    let theta = (pan.clamp(-1.0, 1.0) + 1.0) * 0.5 * FRAC_PI_2;
    (theta.cos(), theta.sin())
}

/// Collapses any source direction onto a `(left, right)` output pair.
///
/// Only the lateral component of the direction matters: a source straight
/// ahead, behind, above or below sits in the center. Azimuth spread pulls
/// the image toward the center.
#[derive(Debug, Clone, Copy, Default)]
pub struct StereoPanner {
    routing: StereoRouting,
}

impl StereoPanner {
    pub fn new(routing: StereoRouting) -> Self {
        Self { routing }
    }

    pub fn routing(&self) -> StereoRouting {
        self.routing
    }

    pub fn compute(&self, position: &Position, spread: SpreadParams, out: &mut GainSet) {
        out.clear();
        let pan = position.direction().x * (1.0 - spread.azimuth_span());
        let (left, right) = constant_power_gains(pan);
        if self.routing.left == self.routing.right {
            // Folded to mono: keep unit power.
            out.set(self.routing.left, (left * left + right * right).sqrt());
        } else {
            out.set(self.routing.left, left);
            out.set(self.routing.right, right);
        }
    }
}

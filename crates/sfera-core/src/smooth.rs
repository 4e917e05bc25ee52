//! Gain smoothing for zipper-free panning and level changes.
//!
//! Two flavours:
//! - [`SmoothedValue`]: per-sample linear ramp over a fixed time, used for
//!   the master gain.
//! - [`GainRamp`]: block-rate one-pole follower that expands each step into a
//!   linear per-sample ramp, used for the per-source, per-speaker gain matrix
//!   where one state value exists for every (source, output) pair.
//!
//! # Example
//!
//! ```
//! use sfera_core::{GainRamp, block_smoothing_coefficient};
//!
//! let alpha = block_smoothing_coefficient(0.02, 48000.0, 256);
//! let mut ramp = GainRamp::new(0.0);
//! let (start, step) = ramp.advance(1.0, alpha, 256);
//! assert_eq!(start, 0.0);
//! assert!(step > 0.0);
//! ```

/// Gains closer than this to their target snap onto it.
pub const SNAP_THRESHOLD: f32 = 1e-5;

/// One-pole coefficient for moving toward a target once per block of
/// `frames` samples with time constant `time_secs`. A zero time constant
/// jumps straight to the target.
pub fn block_smoothing_coefficient(time_secs: f32, sample_rate: f32, frames: usize) -> f32 {
    if time_secs <= 0.0 || sample_rate <= 0.0 {
        return 1.0;
    }
    let coeff = 1.0 - (-(frames as f32) / (time_secs * sample_rate)).exp();
    coeff.clamp(0.0, 1.0)
}

/// Running gain that follows a target one block at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GainRamp {
    current: f32,
}

impl GainRamp {
    pub const fn new(initial: f32) -> Self {
        Self { current: initial }
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn reset(&mut self, value: f32) {
        self.current = value;
    }

    /// True when the ramp sits at zero and the target is zero, so the block
    /// contributes nothing.
    #[inline]
    pub fn is_silent(&self, target: f32) -> bool {
        self.current == 0.0 && target == 0.0
    }

    /// Moves one block toward `target` and returns `(start, step)`: sample `i`
    /// of the block should use `start + step * i`.
    ///
    /// A non-finite target is treated as zero, and a non-finite running gain
    /// restarts from zero.
    #[inline]
    pub fn advance(&mut self, target: f32, coefficient: f32, frames: usize) -> (f32, f32) {
        let target = if target.is_finite() { target } else { 0.0 };
        if !self.current.is_finite() {
            self.current = 0.0;
        }
        let start = self.current;
        let mut end = start + coefficient * (target - start);
        if (end - target).abs() < SNAP_THRESHOLD {
            end = target;
        }
        self.current = end;
        if frames == 0 {
            return (start, 0.0);
        }
        (start, (end - start) / frames as f32)
    }
}

/// Master-gain style smoother: every retarget starts a fresh linear ramp
/// of fixed length from wherever the value currently is.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f32,
    target: f32,
    step: f32,
    remaining: usize,
    ramp_len: usize,
}

impl SmoothedValue {
    pub fn new(initial: f32, smooth_time_secs: f32, sample_rate: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            remaining: 0,
            ramp_len: ((smooth_time_secs * sample_rate) as usize).max(1),
        }
    }

    /// No-op when `target` is already the destination.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.ramp_len;
        self.step = (target - self.current) / self.ramp_len as f32;
    }

    #[inline]
    pub fn current(&self) -> f32 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.remaining > 0
    }

    /// Writes the next `gains.len()` values.
    pub fn fill(&mut self, gains: &mut [f32]) {
        let ramping = self.remaining.min(gains.len());
        for gain in &mut gains[..ramping] {
            self.current += self.step;
            *gain = self.current;
        }
        self.remaining -= ramping;
        if self.remaining == 0 && ramping > 0 {
            // Land exactly on the target.
            self.current = self.target;
            gains[ramping - 1] = self.target;
        }
        gains[ramping..].fill(self.current);
    }
}

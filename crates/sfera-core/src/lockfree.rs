//! Scalar cells written by one thread and read by another.
//!
//! These live in [`StrongArray`](crate::StrongArray)s with one cell per
//! source or output patch and are not padded to a cache line.

use atomic_float::AtomicF32;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared `f32`: meter levels, the master gain.
#[derive(Debug, Default)]
pub struct AtomicFloat(AtomicF32);

impl AtomicFloat {
    pub fn new(value: f32) -> Self {
        Self(AtomicF32::new(value))
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.0.load(Ordering::Acquire)
    }

    /// For the writer reading back its own value.
    #[inline]
    pub fn get_relaxed(&self) -> f32 {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value, Ordering::Release);
    }
}

/// Shared flag: mute and solo states.
#[derive(Debug, Default)]
pub struct AtomicFlag(AtomicBool);

impl AtomicFlag {
    pub fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }

    /// Stores `value` and returns what was there before.
    #[inline]
    pub fn swap(&self, value: bool) -> bool {
        self.0.swap(value, Ordering::AcqRel)
    }
}

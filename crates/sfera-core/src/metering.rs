//! Lock-free level metering for speakers and sources.
//!
//! The audio thread writes one smoothed peak per output patch and per source
//! each block; UI collaborators poll them at their own rate.

use crate::ids::{OutputPatch, SourceIndex, StrongArray};
use crate::AtomicFloat;

/// Level reported for silence.
pub const SILENCE_DB: f32 = -120.0;

/// Linear amplitude to decibels, floored at [`SILENCE_DB`].
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        return SILENCE_DB;
    }
    (20.0 * gain.log10()).max(SILENCE_DB)
}

/// Decibels to linear amplitude. Anything at or below [`SILENCE_DB`] is zero.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db <= SILENCE_DB {
        return 0.0;
    }
    10.0_f32.powf(db / 20.0)
}

/// Peak of the absolute sample values.
#[inline]
pub fn block_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Per-block release multiplier for a peak meter with the given release time.
pub fn release_coefficient(release_secs: f32, sample_rate: f32, frames: usize) -> f32 {
    if release_secs <= 0.0 || sample_rate <= 0.0 {
        return 0.0;
    }
    (-(frames as f32) / (release_secs * sample_rate)).exp()
}

/// Peak levels with instant attack and exponential release.
pub struct LevelMeters {
    outputs: StrongArray<OutputPatch, AtomicFloat>,
    sources: StrongArray<SourceIndex, AtomicFloat>,
}

impl Default for LevelMeters {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelMeters {
    pub fn new() -> Self {
        Self {
            outputs: StrongArray::default(),
            sources: StrongArray::default(),
        }
    }

    /// Audio thread: fold a block peak into the output meter.
    #[inline]
    pub fn update_output(&self, patch: OutputPatch, peak: f32, release: f32) {
        Self::fold(&self.outputs[patch], peak, release);
    }

    /// Audio thread: fold a block peak into the source meter.
    #[inline]
    pub fn update_source(&self, source: SourceIndex, peak: f32, release: f32) {
        Self::fold(&self.sources[source], peak, release);
    }

    #[inline]
    fn fold(meter: &AtomicFloat, peak: f32, release: f32) {
        let decayed = meter.get_relaxed() * release;
        meter.set(if peak > decayed { peak } else { decayed });
    }

    #[inline]
    pub fn output_peak(&self, patch: OutputPatch) -> f32 {
        self.outputs[patch].get()
    }

    #[inline]
    pub fn output_peak_db(&self, patch: OutputPatch) -> f32 {
        gain_to_db(self.output_peak(patch))
    }

    #[inline]
    pub fn source_peak(&self, source: SourceIndex) -> f32 {
        self.sources[source].get()
    }

    #[inline]
    pub fn source_peak_db(&self, source: SourceIndex) -> f32 {
        gain_to_db(self.source_peak(source))
    }

    pub fn reset(&self) {
        for (_, meter) in self.outputs.iter() {
            meter.set(0.0);
        }
        for (_, meter) in self.sources.iter() {
            meter.set(0.0);
        }
    }
}

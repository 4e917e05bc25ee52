//! Speaker, source and gain types shared by every panner.

use std::fmt;

use sfera_core::{
    IndexSet, OutputPatch, Position, Radians, SourceIndex, StrongArray, StrongIndex,
};

use super::attenuation::AttenuationState;
use crate::{Error, Result};

/// Highest accepted highpass crossover frequency.
pub const MAX_HIGHPASS_HZ: f32 = 20_000.0;

/// One loudspeaker of a layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerDescriptor {
    /// Physical output channel, unique within a layout.
    pub output_patch: OutputPatch,
    pub position: Position,
    /// Trim applied after panning.
    pub gain_db: f32,
    /// Highpass crossover frequency, if the speaker needs one.
    pub highpass_hz: Option<f32>,
    /// Excluded from panning; only receives explicit direct-out routing.
    pub direct_out_only: bool,
}

impl SpeakerDescriptor {
    pub fn new(output_patch: OutputPatch, position: Position) -> Self {
        Self {
            output_patch,
            position,
            gain_db: 0.0,
            highpass_hz: None,
            direct_out_only: false,
        }
    }

    pub fn with_gain_db(mut self, gain_db: f32) -> Self {
        self.gain_db = gain_db;
        self
    }

    pub fn with_highpass(mut self, cutoff_hz: f32) -> Self {
        self.highpass_hz = Some(cutoff_hz);
        self
    }

    pub fn with_direct_out_only(mut self, direct_out_only: bool) -> Self {
        self.direct_out_only = direct_out_only;
        self
    }
}

/// A validated set of speakers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeakerLayout {
    speakers: Vec<SpeakerDescriptor>,
}

impl SpeakerLayout {
    /// Rejects duplicate output patches and non-finite parameters.
    pub fn new(speakers: Vec<SpeakerDescriptor>) -> Result<Self> {
        let mut seen = IndexSet::<OutputPatch>::new();
        for speaker in &speakers {
            if !seen.insert(speaker.output_patch) {
                return Err(Error::DuplicateOutputPatch(speaker.output_patch));
            }
            let c = speaker.position.cartesian();
            if !(c.x.is_finite() && c.y.is_finite() && c.z.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "{} has a non-finite position",
                    speaker.output_patch
                )));
            }
            if !speaker.gain_db.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "{} has a non-finite gain",
                    speaker.output_patch
                )));
            }
            if let Some(hz) = speaker.highpass_hz {
                if !(hz > 0.0 && hz < MAX_HIGHPASS_HZ) {
                    return Err(Error::InvalidParameter(format!(
                        "{} highpass {} Hz out of range (0-{} Hz)",
                        speaker.output_patch, hz, MAX_HIGHPASS_HZ
                    )));
                }
            }
        }
        Ok(Self { speakers })
    }

    #[inline]
    pub fn speakers(&self) -> &[SpeakerDescriptor] {
        &self.speakers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    pub fn get(&self, patch: OutputPatch) -> Option<&SpeakerDescriptor> {
        self.speakers.iter().find(|s| s.output_patch == patch)
    }

    /// Speakers that take part in panning.
    pub fn panning_speakers(&self) -> impl Iterator<Item = &SpeakerDescriptor> {
        self.speakers.iter().filter(|s| !s.direct_out_only)
    }

    pub fn panning_count(&self) -> usize {
        self.panning_speakers().count()
    }

    pub fn output_patches(&self) -> IndexSet<OutputPatch> {
        self.speakers.iter().map(|s| s.output_patch).collect()
    }

    /// True when every panning speaker sits within `tolerance` of the
    /// horizontal plane, which selects pair-wise rather than triplet panning.
    pub fn is_planar(&self, tolerance: Radians) -> bool {
        self.panning_speakers()
            .all(|s| s.position.elevation().is_within(Radians::ZERO, tolerance))
    }
}

/// Global spatialization algorithm for speaker layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpatMode {
    /// Every source uses triplet/pair panning.
    #[default]
    Vbap,
    /// Every source uses layered-matrix panning.
    Mbap,
    /// Each source picks its own algorithm.
    Hybrid,
}

/// Per-source algorithm choice, honoured in [`SpatMode::Hybrid`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceSpatMode {
    #[default]
    Vbap,
    Mbap,
}

/// Two-channel reduction replacing the speaker layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoMode {
    /// Constant-power azimuth panning.
    Stereo,
    /// Head-related impulse response convolution.
    Binaural,
}

/// Output patches receiving a two-channel reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoRouting {
    pub left: OutputPatch,
    pub right: OutputPatch,
}

impl Default for StereoRouting {
    fn default() -> Self {
        Self {
            left: OutputPatch::from_slot(0),
            right: OutputPatch::from_slot(1),
        }
    }
}

/// Stereo reduction mode plus its routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoReduction {
    pub mode: StereoMode,
    pub routing: StereoRouting,
}

/// Source widening. Both spans are fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpreadParams {
    azimuth_span: f32,
    elevation_span: f32,
}

impl SpreadParams {
    pub fn new(azimuth_span: f32, elevation_span: f32) -> Self {
        Self {
            azimuth_span: clamp_unit(azimuth_span),
            elevation_span: clamp_unit(elevation_span),
        }
    }

    #[inline]
    pub fn azimuth_span(&self) -> f32 {
        self.azimuth_span
    }

    #[inline]
    pub fn elevation_span(&self) -> f32 {
        self.elevation_span
    }

    #[inline]
    pub fn is_point(&self) -> bool {
        self.azimuth_span <= 0.0 && self.elevation_span <= 0.0
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Everything a panner needs to know about one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub index: SourceIndex,
    pub position: Position,
    pub spat_mode: SourceSpatMode,
    /// Bypass spatialization and route to this output at unity gain.
    pub direct_out: Option<OutputPatch>,
    pub spread: SpreadParams,
}

impl SourceDescriptor {
    pub fn new(index: SourceIndex) -> Self {
        Self {
            index,
            position: Position::default(),
            spat_mode: SourceSpatMode::default(),
            direct_out: None,
            spread: SpreadParams::default(),
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn with_spat_mode(mut self, spat_mode: SourceSpatMode) -> Self {
        self.spat_mode = spat_mode;
        self
    }

    pub fn with_direct_out(mut self, patch: Option<OutputPatch>) -> Self {
        self.direct_out = patch;
        self
    }

    pub fn with_spread(mut self, spread: SpreadParams) -> Self {
        self.spread = spread;
        self
    }
}

/// One gain per output patch.
pub struct GainSet {
    gains: StrongArray<OutputPatch, f32>,
}

impl GainSet {
    pub fn new() -> Self {
        Self {
            gains: StrongArray::default(),
        }
    }

    #[inline]
    pub fn get(&self, patch: OutputPatch) -> f32 {
        self.gains[patch]
    }

    #[inline]
    pub fn set(&mut self, patch: OutputPatch, gain: f32) {
        self.gains[patch] = gain;
    }

    #[inline]
    pub fn add(&mut self, patch: OutputPatch, gain: f32) {
        self.gains[patch] += gain;
    }

    pub fn clear(&mut self) {
        self.gains.values_mut().fill(0.0);
    }

    /// Sum of squared gains.
    pub fn power(&self) -> f32 {
        self.gains.values().iter().map(|g| g * g).sum()
    }

    pub fn is_silent(&self) -> bool {
        self.gains.values().iter().all(|&g| g == 0.0)
    }

    pub fn scale(&mut self, factor: f32) {
        for gain in self.gains.values_mut() {
            *gain *= factor;
        }
    }

    /// Rescales to unit power. Leaves a silent (or near-silent) set zeroed
    /// and returns false.
    pub fn normalize_power(&mut self) -> bool {
        let power = self.power();
        if power < POWER_EPSILON {
            self.clear();
            return false;
        }
        self.scale(1.0 / power.sqrt());
        true
    }

    /// Non-zero gains in patch order.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = (OutputPatch, f32)> + '_ {
        self.gains
            .iter()
            .filter(|&(_, &g)| g != 0.0)
            .map(|(patch, &g)| (patch, g))
    }
}

/// Power below which a gain set counts as silent.
pub const POWER_EPSILON: f32 = 1e-9;

impl Default for GainSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for GainSet {
    fn clone(&self) -> Self {
        Self {
            gains: self.gains.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.gains.clone_from(&source.gains);
    }
}

impl fmt::Debug for GainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter_nonzero()).finish()
    }
}

/// What the audio thread needs to render one source for a block.
#[derive(Debug, Default)]
pub struct SourceSpatData {
    /// Layout generation the gains were computed against.
    pub generation: u64,
    pub active: bool,
    pub gains: GainSet,
    pub attenuation: AttenuationState,
    pub direct_out: Option<OutputPatch>,
}

impl SourceSpatData {
    /// Silences the source in place.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.gains.clear();
        self.attenuation = AttenuationState::default();
        self.direct_out = None;
    }
}

impl Clone for SourceSpatData {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            active: self.active,
            gains: self.gains.clone(),
            attenuation: self.attenuation,
            direct_out: self.direct_out,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.generation = source.generation;
        self.active = source.active;
        self.gains.clone_from(&source.gains);
        self.attenuation = source.attenuation;
        self.direct_out = source.direct_out;
    }
}

//! Binaural reduction over a fixed virtual speaker dome.
//!
//! Sources are panned with VBAP onto [`VIRTUAL_SPEAKER_COUNT`] virtual
//! speakers. Each virtual speaker is then convolved with the head-related
//! impulse response pair nearest to its direction and summed into the two
//! headphone channels. The HRIR data itself is opaque; [`HrirSet::synthetic`]
//! builds a simple ITD/ILD set for tests and demos.

use sfera_core::{
    CartesianVector, OutputPatch, PolarVector, Position, Radians, StrongIndex, DEFAULT_ANGLE_TOLERANCE,
};
use tracing::debug;

use super::types::{GainSet, SpeakerDescriptor, SpeakerLayout, SpreadParams, StereoRouting};
use super::vbap_panner::VbapPanner;
use crate::{Error, Result};

/// `(azimuth°, elevation°)` of the virtual dome, in virtual patch order.
const VIRTUAL_DOME: [(f32, f32); 18] = [
    (0.0, 0.0),
    (45.0, 0.0),
    (90.0, 0.0),
    (135.0, 0.0),
    (180.0, 0.0),
    (-135.0, 0.0),
    (-90.0, 0.0),
    (-45.0, 0.0),
    (45.0, 45.0),
    (135.0, 45.0),
    (-135.0, 45.0),
    (-45.0, 45.0),
    (0.0, 90.0),
    (45.0, -45.0),
    (135.0, -45.0),
    (-135.0, -45.0),
    (-45.0, -45.0),
    (0.0, -90.0),
];

pub const VIRTUAL_SPEAKER_COUNT: usize = VIRTUAL_DOME.len();

/// Average head radius in meters.
const HEAD_RADIUS: f32 = 0.0875;
const SPEED_OF_SOUND: f32 = 343.0;
/// Far-ear level drop for a fully lateral source.
const MAX_ILD_DB: f32 = 10.0;

/// The virtual speakers used for binaural panning, on patches `1..=18`.
pub fn virtual_layout() -> Result<SpeakerLayout> {
    let speakers = VIRTUAL_DOME
        .iter()
        .enumerate()
        .map(|(slot, &(azimuth, elevation))| {
            SpeakerDescriptor::new(
                OutputPatch::from_slot(slot),
                Position::from_degrees(azimuth, elevation, 1.0),
            )
        })
        .collect();
    SpeakerLayout::new(speakers)
}

/// One measured direction: a left/right impulse response pair.
#[derive(Debug, Clone, PartialEq)]
pub struct HrirEntry {
    pub azimuth: Radians,
    pub elevation: Radians,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl HrirEntry {
    fn direction(&self) -> CartesianVector {
        PolarVector::new(self.azimuth, self.elevation, 1.0).direction()
    }
}

/// A set of HRIR pairs sharing a sample rate and length.
#[derive(Debug, Clone, PartialEq)]
pub struct HrirSet {
    sample_rate: f32,
    length: usize,
    entries: Vec<HrirEntry>,
}

impl HrirSet {
    /// Every response must be non-empty, finite and of the same length.
    pub fn new(sample_rate: f32, entries: Vec<HrirEntry>) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::InvalidHrir(format!("invalid sample rate {sample_rate}")));
        }
        let Some(first) = entries.first() else {
            return Err(Error::InvalidHrir("empty HRIR set".into()));
        };
        let length = first.left.len();
        if length == 0 {
            return Err(Error::InvalidHrir("zero-length impulse response".into()));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entry.left.len() != length || entry.right.len() != length {
                return Err(Error::InvalidHrir(format!(
                    "entry {i} has lengths {}/{}, expected {length}",
                    entry.left.len(),
                    entry.right.len()
                )));
            }
            if !entry.left.iter().chain(&entry.right).all(|s| s.is_finite()) {
                return Err(Error::InvalidHrir(format!("entry {i} has non-finite samples")));
            }
        }
        Ok(Self {
            sample_rate,
            length,
            entries,
        })
    }

    /// Spherical-head ITD/ILD responses on a 30° azimuth grid at
    /// -90°, -45°, 0°, 45° and 90° elevation.
    pub fn synthetic(sample_rate: f32, length: usize) -> Self {
        let length = length.max(1);
        let mut entries = Vec::new();
        for elevation in [-90.0f32, -45.0, 0.0, 45.0, 90.0] {
            let azimuths: Vec<f32> = if elevation.abs() == 90.0 {
                vec![0.0]
            } else {
                (0..12).map(|i| -150.0 + 30.0 * i as f32).collect()
            };
            for azimuth in azimuths {
                entries.push(synthetic_entry(sample_rate, length, azimuth, elevation));
            }
        }
        Self {
            sample_rate,
            length,
            entries,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Length of every impulse response in samples.
    pub fn filter_len(&self) -> usize {
        self.length
    }

    pub fn entries(&self) -> &[HrirEntry] {
        &self.entries
    }

    /// Entry closest (great-circle) to `direction`.
    pub fn nearest(&self, direction: CartesianVector) -> &HrirEntry {
        let mut best = &self.entries[0];
        let mut best_angle = f32::INFINITY;
        for entry in &self.entries {
            let angle = entry.direction().angle_to(direction).get();
            if angle < best_angle {
                best_angle = angle;
                best = entry;
            }
        }
        best
    }
}

fn synthetic_entry(sample_rate: f32, length: usize, azimuth: f32, elevation: f32) -> HrirEntry {
    let direction = Position::from_degrees(azimuth, elevation, 1.0).direction();
    // Lateral angle: positive toward the right ear.
    let lateral = direction.x.clamp(-1.0, 1.0).asin();
    // Woodworth spherical-head model, ~0.66 ms fully lateral.
    let itd = HEAD_RADIUS / SPEED_OF_SOUND * (lateral.abs() + lateral.abs().sin());
    let delay = ((itd * sample_rate).round() as usize).min(length - 1);
    let far_gain = 10.0_f32.powf(-MAX_ILD_DB * lateral.abs() / Radians::HALF_PI.get() / 20.0);
    let level = (1.0 - elevation.abs() / 90.0 * 0.3).max(0.7);

    let mut near = vec![0.0f32; length];
    let mut far = vec![0.0f32; length];
    near[0] = level;
    far[delay] = level * far_gain;
    let (left, right) = if lateral >= 0.0 { (far, near) } else { (near, far) };

    HrirEntry {
        azimuth: Radians(azimuth.to_radians()),
        elevation: Radians(elevation.to_radians()),
        left,
        right,
    }
}

/// Gain computation for the binaural reduction (configuration thread).
#[derive(Debug, Clone)]
pub struct BinauralPanner {
    vbap: VbapPanner,
    routing: StereoRouting,
}

impl BinauralPanner {
    pub fn new(routing: StereoRouting) -> Result<Self> {
        let layout = virtual_layout()?;
        let vbap = VbapPanner::new(&layout, DEFAULT_ANGLE_TOLERANCE.to_radians())?;
        Ok(Self { vbap, routing })
    }

    pub fn routing(&self) -> StereoRouting {
        self.routing
    }

    pub fn triplet_count(&self) -> usize {
        self.vbap.triplets().len()
    }

    /// Gains over the virtual patches `1..=VIRTUAL_SPEAKER_COUNT`.
    pub fn compute(&self, position: &Position, spread: SpreadParams, out: &mut GainSet) {
        self.vbap.compute_spread(position, spread, out);
    }
}

/// Direct-form FIR pair sharing one input history.
#[derive(Debug, Clone)]
struct VirtualChannel {
    bus: Box<[f32]>,
    history: Box<[f32]>,
    write: usize,
    left: Box<[f32]>,
    right: Box<[f32]>,
    /// Samples until the history is fully silent again.
    ring_out: usize,
}

impl VirtualChannel {
    fn render(&mut self, frames: usize, left: &mut [f32], right: &mut [f32]) {
        let len = self.history.len();
        let bus_active = self.bus[..frames].iter().any(|&s| s != 0.0);
        if bus_active {
            self.ring_out = len;
        } else if self.ring_out == 0 {
            return;
        }

        for frame in 0..frames {
            self.history[self.write] = self.bus[frame];
            let (mut l, mut r) = (0.0f32, 0.0f32);
            let mut read = self.write;
            for tap in 0..len {
                let x = self.history[read];
                l += self.left[tap] * x;
                r += self.right[tap] * x;
                read = if read == 0 { len - 1 } else { read - 1 };
            }
            left[frame] += l;
            right[frame] += r;
            self.write = (self.write + 1) % len;
        }

        if !bus_active {
            self.ring_out = self.ring_out.saturating_sub(frames);
        }
    }
}

/// Streaming convolution stage (audio thread).
///
/// Sources are mixed into the per-virtual-speaker buses, then
/// [`BinauralConvolver::render`] adds the headphone signal into the
/// routing pair. All buffers are allocated up front.
#[derive(Debug, Clone)]
pub struct BinauralConvolver {
    channels: Box<[VirtualChannel]>,
    max_block_size: usize,
}

impl BinauralConvolver {
    pub fn new(hrirs: &HrirSet, sample_rate: f32, max_block_size: usize) -> Result<Self> {
        if (hrirs.sample_rate() - sample_rate).abs() > 0.5 {
            return Err(Error::InvalidHrir(format!(
                "HRIR sample rate {} Hz does not match engine rate {} Hz",
                hrirs.sample_rate(),
                sample_rate
            )));
        }
        let layout = virtual_layout()?;
        let channels: Box<[VirtualChannel]> = layout
            .speakers()
            .iter()
            .map(|speaker| {
                let entry = hrirs.nearest(speaker.position.direction());
                VirtualChannel {
                    bus: vec![0.0; max_block_size].into_boxed_slice(),
                    history: vec![0.0; hrirs.filter_len()].into_boxed_slice(),
                    write: 0,
                    left: entry.left.clone().into_boxed_slice(),
                    right: entry.right.clone().into_boxed_slice(),
                    ring_out: 0,
                }
            })
            .collect();
        debug!(
            "Binaural convolver: {} virtual speakers, {}-tap HRIRs",
            channels.len(),
            hrirs.filter_len()
        );
        Ok(Self {
            channels,
            max_block_size,
        })
    }

    /// Input bus of a virtual patch, `None` outside `1..=VIRTUAL_SPEAKER_COUNT`.
    #[inline]
    pub fn bus_mut(&mut self, patch: OutputPatch) -> Option<&mut [f32]> {
        self.channels
            .get_mut(patch.slot())
            .map(|channel| &mut channel.bus[..])
    }

    /// Zeroes the first `frames` samples of every bus.
    pub fn clear_buses(&mut self, frames: usize) {
        let frames = frames.min(self.max_block_size);
        for channel in self.channels.iter_mut() {
            channel.bus[..frames].fill(0.0);
        }
    }

    /// Convolves the buses and adds the result into `left` and `right`.
    pub fn render(&mut self, frames: usize, left: &mut [f32], right: &mut [f32]) {
        let frames = frames.min(self.max_block_size).min(left.len()).min(right.len());
        for channel in self.channels.iter_mut() {
            channel.render(frames, left, right);
        }
    }

    /// Clears all convolution history.
    pub fn reset(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.bus.fill(0.0);
            channel.history.fill(0.0);
            channel.write = 0;
            channel.ring_out = 0;
        }
    }
}

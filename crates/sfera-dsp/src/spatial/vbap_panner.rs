use sfera_core::{CartesianVector, Degrees, PolarVector, Position, Radians};
use tracing::debug;

use super::triangulation::{pair_speakers, triangulate, SolverSpeaker, SpeakerPair, Triplet};
use super::types::{GainSet, SpeakerDescriptor, SpeakerLayout, SpreadParams};
use crate::Result;

/// Number of offset rings blended when a source is spread.
pub const SPREAD_RINGS: usize = 4;

/// Largest azimuth offset (degrees) reached by the outermost spread ring.
pub const SPREAD_MAX_AZIMUTH: f32 = 180.0;

/// Largest elevation offset (degrees) reached by the outermost spread ring.
pub const SPREAD_MAX_ELEVATION: f32 = 90.0;

/// Weight of spread ring `ring` (1-based): `10^(-3·ring/20)`, i.e. -3 dB per ring.
#[inline]
pub fn spread_ring_weight(ring: usize) -> f32 {
    10.0_f32.powf(-3.0 * ring as f32 / 20.0)
}

#[derive(Debug, Clone)]
enum Geometry {
    Planar(Vec<SpeakerPair>),
    Spherical(Vec<Triplet>),
}

/// Triplet/pair based amplitude panner.
///
/// Built once per layout on the configuration thread; computing gains only
/// reads the precomputed inverse matrices.
#[derive(Debug, Clone)]
pub struct VbapPanner {
    geometry: Geometry,
}

impl VbapPanner {
    /// Triangulates the panning speakers of `layout`. Planar layouts (every
    /// speaker within `tolerance` of the horizon) are paired instead.
    pub fn new(layout: &SpeakerLayout, tolerance: Radians) -> Result<Self> {
        let speakers: Vec<SolverSpeaker> = layout.panning_speakers().map(solver_speaker).collect();
        Self::from_speakers(&speakers, layout.is_planar(tolerance), tolerance)
    }

    pub(crate) fn from_speakers(
        speakers: &[SolverSpeaker],
        planar: bool,
        tolerance: Radians,
    ) -> Result<Self> {
        let geometry = if planar {
            let pairs = pair_speakers(speakers)?;
            debug!("VBAP 2-D: {} speakers, {} pairs", speakers.len(), pairs.len());
            Geometry::Planar(pairs)
        } else {
            let triplets = triangulate(speakers, tolerance)?;
            debug!(
                "VBAP 3-D: {} speakers, {} triplets",
                speakers.len(),
                triplets.len()
            );
            Geometry::Spherical(triplets)
        };
        Ok(Self { geometry })
    }

    pub fn is_planar(&self) -> bool {
        matches!(self.geometry, Geometry::Planar(_))
    }

    /// Triplets of a 3-D layout (empty for planar layouts).
    pub fn triplets(&self) -> &[Triplet] {
        match &self.geometry {
            Geometry::Spherical(triplets) => triplets,
            Geometry::Planar(_) => &[],
        }
    }

    /// Pairs of a planar layout (empty for 3-D layouts).
    pub fn pairs(&self) -> &[SpeakerPair] {
        match &self.geometry {
            Geometry::Planar(pairs) => pairs,
            Geometry::Spherical(_) => &[],
        }
    }

    /// Point-source gains for `position`, written into `out`.
    ///
    /// The triplet (or pair) whose smallest raw gain is largest wins; its
    /// gains are clamped non-negative and power-normalized. If nothing
    /// usable is found every gain is zero.
    pub fn compute(&self, position: &Position, out: &mut GainSet) {
        out.clear();
        self.add_point(position.polar(), 1.0, out);
    }

    /// Gains for a source widened by `spread`.
    ///
    /// Blends point computations at symmetric azimuth/elevation offsets,
    /// ring `i` of [`SPREAD_RINGS`] weighted by [`spread_ring_weight`], then
    /// renormalizes.
    pub fn compute_spread(&self, position: &Position, spread: SpreadParams, out: &mut GainSet) {
        out.clear();
        let center = position.polar();
        self.add_point(center, 1.0, out);

        if !spread.is_point() {
            for ring in 1..=SPREAD_RINGS {
                let fraction = ring as f32 / SPREAD_RINGS as f32;
                let d_az =
                    Degrees(fraction * spread.azimuth_span() * SPREAD_MAX_AZIMUTH).to_radians();
                let d_el =
                    Degrees(fraction * spread.elevation_span() * SPREAD_MAX_ELEVATION).to_radians();
                let weight = spread_ring_weight(ring);
                for az_sign in [-1.0f32, 0.0, 1.0] {
                    for el_sign in [-1.0f32, 0.0, 1.0] {
                        if az_sign == 0.0 && el_sign == 0.0 {
                            continue;
                        }
                        if (az_sign != 0.0 && d_az.get() == 0.0) || (el_sign != 0.0 && d_el.get() == 0.0)
                        {
                            continue;
                        }
                        let offset = PolarVector::new(
                            center.azimuth + d_az * az_sign,
                            center.elevation + d_el * el_sign,
                            1.0,
                        );
                        self.add_point(offset, weight, out);
                    }
                }
            }
        }

        out.normalize_power();
    }

    /// Adds `weight` times the normalized point gains for `polar` into `out`.
    fn add_point(&self, polar: PolarVector, weight: f32, out: &mut GainSet) {
        match &self.geometry {
            Geometry::Spherical(triplets) => {
                let direction = polar.direction();
                if let Some((triplet, gains)) = best_triplet(triplets, direction) {
                    let gains = normalized(gains);
                    for (patch, gain) in triplet.speakers.iter().zip(gains) {
                        out.add(*patch, weight * gain);
                    }
                }
            }
            Geometry::Planar(pairs) => {
                let (x, y) = (polar.azimuth.sin(), polar.azimuth.cos());
                if let Some((pair, gains)) = best_pair(pairs, x, y) {
                    let gains = normalized(gains);
                    for (patch, gain) in pair.speakers.iter().zip(gains) {
                        out.add(*patch, weight * gain);
                    }
                }
            }
        }
    }
}

pub(crate) fn solver_speaker(speaker: &SpeakerDescriptor) -> SolverSpeaker {
    SolverSpeaker {
        patch: speaker.output_patch,
        direction: speaker.position.direction(),
        azimuth: speaker.position.azimuth(),
        elevation: speaker.position.elevation(),
    }
}

fn best_triplet(triplets: &[Triplet], direction: CartesianVector) -> Option<(&Triplet, [f32; 3])> {
    let mut best: Option<(&Triplet, [f32; 3], f32)> = None;
    for triplet in triplets {
        let gains = triplet.gains(direction);
        let min = gains[0].min(gains[1]).min(gains[2]);
        if !min.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, _, best_min)| min > *best_min) {
            best = Some((triplet, gains, min));
        }
    }
    best.map(|(triplet, gains, _)| (triplet, gains))
}

fn best_pair(pairs: &[SpeakerPair], x: f32, y: f32) -> Option<(&SpeakerPair, [f32; 2])> {
    let mut best: Option<(&SpeakerPair, [f32; 2], f32)> = None;
    for pair in pairs {
        let gains = pair.gains(x, y);
        let min = gains[0].min(gains[1]);
        if !min.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, _, best_min)| min > *best_min) {
            best = Some((pair, gains, min));
        }
    }
    best.map(|(pair, gains, _)| (pair, gains))
}

/// Clamps negative gains and scales to unit power; all zeros if nothing is left.
fn normalized<const N: usize>(mut gains: [f32; N]) -> [f32; N] {
    for gain in gains.iter_mut() {
        *gain = gain.max(0.0);
    }
    let power: f32 = gains.iter().map(|g| g * g).sum();
    if power < super::types::POWER_EPSILON {
        return [0.0; N];
    }
    let norm = 1.0 / power.sqrt();
    gains.map(|g| g * norm)
}

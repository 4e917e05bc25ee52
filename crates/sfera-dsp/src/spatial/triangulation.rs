//! Speaker triangulation (3-D) and pairing (2-D) for triplet-based panning.
//!
//! The 3-D solver follows the classic loudspeaker-triangle selection:
//!
//! 1. Candidate triplets are drawn from a sliding window over elevation
//!    layers (each layer together with the next one up), so large layouts do
//!    not pay for an exhaustive `O(n³)` scan. When the windowed result leaves
//!    a speaker uncovered the search is repeated exhaustively.
//! 2. A candidate is accepted when its volume-per-perimeter metric exceeds
//!    [`MIN_VOLUME_PER_PERIMETER`] and its matrix is invertible.
//! 3. Connections (speaker-to-speaker edges) are visited shortest first; a
//!    connection crossing one already kept is broken, and every triplet that
//!    uses a broken connection is discarded.
//! 4. Triplets enclosing another speaker are discarded.

use std::collections::BTreeSet;

use sfera_core::{CartesianVector, Degrees, OutputPatch, Radians};
use tracing::{debug, warn};

use super::utils::{
    apply_inverse3, arcs_cross, invert_pair, invert_triplet, volume_per_perimeter,
};
use crate::{Error, Result};

/// Minimum volume-per-perimeter for an acceptable triplet.
pub const MIN_VOLUME_PER_PERIMETER: f32 = 0.01;

/// A speaker lying this far outside a triplet (in gain units) still counts
/// as inside it.
pub const INSIDE_TOLERANCE: f32 = -0.001;

/// Largest azimuth gap bridged by a speaker pair in 2-D.
pub const MAX_PAIR_APERTURE: Degrees = Degrees(170.0);

/// Three speakers and the inverse of the matrix formed by their directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Triplet {
    pub speakers: [OutputPatch; 3],
    /// Row-major 3x3 inverse; see [`Triplet::gains`].
    pub inverse: [f32; 9],
}

impl Triplet {
    /// Raw (possibly negative) gains for a unit direction.
    #[inline]
    pub fn gains(&self, direction: CartesianVector) -> [f32; 3] {
        apply_inverse3(&self.inverse, direction)
    }

    pub fn contains_speaker(&self, patch: OutputPatch) -> bool {
        self.speakers.contains(&patch)
    }
}

/// Two horizontally adjacent speakers and their 2x2 inverse matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerPair {
    pub speakers: [OutputPatch; 2],
    pub inverse: [f32; 4],
}

impl SpeakerPair {
    /// Raw (possibly negative) gains for a horizontal direction `(x, y)`.
    #[inline]
    pub fn gains(&self, x: f32, y: f32) -> [f32; 2] {
        super::utils::apply_inverse2(&self.inverse, x, y)
    }
}

/// A speaker as seen by the solver.
#[derive(Debug, Clone, Copy)]
pub struct SolverSpeaker {
    pub patch: OutputPatch,
    pub direction: CartesianVector,
    pub azimuth: Radians,
    pub elevation: Radians,
}

/// Partitions the speakers into non-overlapping triplets.
///
/// `layer_tolerance` groups speakers into the elevation layers that bound
/// the candidate window.
pub fn triangulate(speakers: &[SolverSpeaker], layer_tolerance: Radians) -> Result<Vec<Triplet>> {
    if speakers.len() < 3 {
        return Err(Error::NotEnoughSpeakers {
            dimension: "3-D",
            required: 3,
            found: speakers.len(),
        });
    }

    let windowed = windowed_candidates(speakers, layer_tolerance);
    let mut triplets = select_triplets(speakers, &windowed);

    if let Some(uncovered) = first_uncovered(speakers, &triplets) {
        debug!(
            "Windowed triangulation left {} uncovered, retrying exhaustively",
            uncovered
        );
        let exhaustive = exhaustive_candidates(speakers.len());
        if exhaustive.len() > windowed.len() {
            triplets = select_triplets(speakers, &exhaustive);
        }
        if let Some(uncovered) = first_uncovered(speakers, &triplets) {
            warn!("{} is not covered by any speaker triplet", uncovered);
        }
    }

    if triplets.is_empty() {
        return Err(Error::DegenerateLayout(
            "no speaker triplet encloses a usable volume".into(),
        ));
    }

    Ok(triplets)
}

/// Pairs angularly adjacent speakers on the horizontal plane.
pub fn pair_speakers(speakers: &[SolverSpeaker]) -> Result<Vec<SpeakerPair>> {
    if speakers.len() < 2 {
        return Err(Error::NotEnoughSpeakers {
            dimension: "2-D",
            required: 2,
            found: speakers.len(),
        });
    }

    let mut order: Vec<&SolverSpeaker> = speakers.iter().collect();
    order.sort_by(|a, b| a.azimuth.get().total_cmp(&b.azimuth.get()));

    let max_gap = MAX_PAIR_APERTURE.to_radians().get();
    let count = order.len();

    let mut pairs = Vec::with_capacity(count);
    for i in 0..count {
        let first = order[i];
        let second = order[(i + 1) % count];
        let mut gap = second.azimuth.get() - first.azimuth.get();
        if gap < 0.0 {
            gap += core::f32::consts::TAU;
        }
        if gap > max_gap {
            continue;
        }
        let (x1, y1) = (first.azimuth.sin(), first.azimuth.cos());
        let (x2, y2) = (second.azimuth.sin(), second.azimuth.cos());
        if let Some(inverse) = invert_pair(x1, y1, x2, y2) {
            pairs.push(SpeakerPair {
                speakers: [first.patch, second.patch],
                inverse,
            });
        }
        // Two speakers form at most one pair, through whichever side is narrower.
        if count == 2 && !pairs.is_empty() {
            break;
        }
    }

    if pairs.is_empty() {
        return Err(Error::DegenerateLayout(format!(
            "no adjacent speakers closer than {}°",
            MAX_PAIR_APERTURE.get()
        )));
    }

    Ok(pairs)
}

/// Candidate index triples drawn from each pair of adjacent elevation layers.
fn windowed_candidates(speakers: &[SolverSpeaker], tolerance: Radians) -> Vec<[usize; 3]> {
    let mut order: Vec<usize> = (0..speakers.len()).collect();
    order.sort_by(|&a, &b| {
        speakers[a]
            .elevation
            .get()
            .total_cmp(&speakers[b].elevation.get())
    });

    let mut layers: Vec<Vec<usize>> = Vec::new();
    let mut layer_floor = f32::NEG_INFINITY;
    for &index in &order {
        let elevation = speakers[index].elevation.get();
        match layers.last_mut() {
            Some(layer) if elevation - layer_floor <= tolerance.get() => layer.push(index),
            _ => {
                layer_floor = elevation;
                layers.push(vec![index]);
            }
        }
    }

    let mut candidates = BTreeSet::new();
    let windows = layers.len().saturating_sub(1).max(1);
    for w in 0..windows {
        let mut window: Vec<usize> = layers[w].clone();
        if let Some(next) = layers.get(w + 1) {
            window.extend_from_slice(next);
        }
        window.sort_unstable();
        for a in 0..window.len() {
            for b in a + 1..window.len() {
                for c in b + 1..window.len() {
                    candidates.insert([window[a], window[b], window[c]]);
                }
            }
        }
    }
    candidates.into_iter().collect()
}

fn exhaustive_candidates(count: usize) -> Vec<[usize; 3]> {
    let mut candidates = Vec::new();
    for a in 0..count {
        for b in a + 1..count {
            for c in b + 1..count {
                candidates.push([a, b, c]);
            }
        }
    }
    candidates
}

struct Candidate {
    members: [usize; 3],
    inverse: [f32; 9],
}

fn select_triplets(speakers: &[SolverSpeaker], candidates: &[[usize; 3]]) -> Vec<Triplet> {
    let dir = |i: usize| speakers[i].direction;

    let accepted: Vec<Candidate> = candidates
        .iter()
        .filter_map(|&members| {
            let [a, b, c] = members;
            if volume_per_perimeter(dir(a), dir(b), dir(c)) <= MIN_VOLUME_PER_PERIMETER {
                return None;
            }
            invert_triplet(dir(a), dir(b), dir(c)).map(|inverse| Candidate { members, inverse })
        })
        .collect();

    let broken = broken_connections(speakers, &accepted);

    accepted
        .into_iter()
        .filter(|candidate| {
            let [a, b, c] = candidate.members;
            !(broken.contains(&(a, b)) || broken.contains(&(a, c)) || broken.contains(&(b, c)))
        })
        .filter(|candidate| {
            (0..speakers.len())
                .filter(|i| !candidate.members.contains(i))
                .all(|i| {
                    let g = apply_inverse3(&candidate.inverse, dir(i));
                    !g.iter().all(|&value| value >= INSIDE_TOLERANCE)
                })
        })
        .map(|candidate| Triplet {
            speakers: candidate.members.map(|i| speakers[i].patch),
            inverse: candidate.inverse,
        })
        .collect()
}

/// Connections that cross a shorter one. Keys are `(low, high)` index pairs.
fn broken_connections(speakers: &[SolverSpeaker], accepted: &[Candidate]) -> BTreeSet<(usize, usize)> {
    let mut connections = BTreeSet::new();
    for candidate in accepted {
        let [a, b, c] = candidate.members;
        connections.insert((a, b));
        connections.insert((a, c));
        connections.insert((b, c));
    }

    let mut by_length: Vec<((usize, usize), f32)> = connections
        .into_iter()
        .map(|(i, j)| {
            let length = speakers[i].direction.angle_to(speakers[j].direction).get();
            ((i, j), length)
        })
        .collect();
    by_length.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut kept: Vec<(usize, usize)> = Vec::new();
    let mut broken = BTreeSet::new();
    for ((i, j), _) in by_length {
        let crosses = kept.iter().any(|&(k, l)| {
            if i == k || i == l || j == k || j == l {
                return false;
            }
            arcs_cross(
                speakers[i].direction,
                speakers[j].direction,
                speakers[k].direction,
                speakers[l].direction,
            )
        });
        if crosses {
            broken.insert((i, j));
        } else {
            kept.push((i, j));
        }
    }
    broken
}

fn first_uncovered(speakers: &[SolverSpeaker], triplets: &[Triplet]) -> Option<OutputPatch> {
    speakers
        .iter()
        .map(|s| s.patch)
        .find(|&patch| !triplets.iter().any(|t| t.contains_speaker(patch)))
}

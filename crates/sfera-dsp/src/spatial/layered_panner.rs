//! Layered-matrix amplitude panning.
//!
//! Speakers are grouped into elevation layers. Each speaker owns a square
//! gain grid over the horizontal projection plane `[-1, 1]²`; a cell holds
//! `1 - clamp(d / falloff, 0, 1)` where `d` is its distance to the speaker's
//! projection. A source is projected onto the same plane, every speaker's
//! grid is sampled bilinearly, sharpened by the layer exponent, and the two
//! layers bracketing the source elevation are blended linearly.

use sfera_core::{Degrees, OutputPatch, Position, Radians, SpatConfig};
use tracing::debug;

use super::types::{GainSet, SpeakerLayout, SpreadParams, POWER_EPSILON};
use crate::{Error, Result};

/// Speakers per layer above which the gain exponent starts to grow.
pub const EXPONENT_SPEAKER_THRESHOLD: usize = 4;

#[derive(Debug, Clone)]
struct GainGrid {
    resolution: usize,
    cells: Box<[f32]>,
}

impl GainGrid {
    fn new(resolution: usize, falloff: f32, x: f32, y: f32) -> Self {
        let step = 2.0 / (resolution - 1) as f32;
        let mut cells = vec![0.0f32; resolution * resolution];
        for row in 0..resolution {
            let cy = -1.0 + row as f32 * step;
            for col in 0..resolution {
                let cx = -1.0 + col as f32 * step;
                let distance = (cx - x).hypot(cy - y);
                cells[row * resolution + col] = 1.0 - (distance / falloff).clamp(0.0, 1.0);
            }
        }
        Self {
            resolution,
            cells: cells.into_boxed_slice(),
        }
    }

    /// Bilinear lookup at `(x, y)` in `[-1, 1]²` (clamped).
    fn sample(&self, x: f32, y: f32) -> f32 {
        let last = (self.resolution - 1) as f32;
        let fx = ((x.clamp(-1.0, 1.0) + 1.0) * 0.5 * last).clamp(0.0, last);
        let fy = ((y.clamp(-1.0, 1.0) + 1.0) * 0.5 * last).clamp(0.0, last);
        let (c0, r0) = (fx.floor() as usize, fy.floor() as usize);
        let c1 = (c0 + 1).min(self.resolution - 1);
        let r1 = (r0 + 1).min(self.resolution - 1);
        let (tx, ty) = (fx - c0 as f32, fy - r0 as f32);
        let at = |r: usize, c: usize| self.cells[r * self.resolution + c];
        let top = at(r0, c0) + tx * (at(r0, c1) - at(r0, c0));
        let bottom = at(r1, c0) + tx * (at(r1, c1) - at(r1, c0));
        top + ty * (bottom - top)
    }
}

#[derive(Debug, Clone)]
struct LayerSpeaker {
    patch: OutputPatch,
    grid: GainGrid,
}

#[derive(Debug, Clone)]
struct Layer {
    elevation: Radians,
    exponent: f32,
    speakers: Vec<LayerSpeaker>,
}

impl Layer {
    /// Unit-power gains for a projected source, added into `out` with `weight`.
    fn accumulate(&self, x: f32, y: f32, azimuth_span: f32, weight: f32, out: &mut GainSet) {
        if weight <= 0.0 {
            return;
        }
        let exponent = self.exponent * (1.0 - azimuth_span) * 2.0;
        let mut power = 0.0f32;
        for speaker in &self.speakers {
            let g = speaker.grid.sample(x, y).max(0.0).powf(exponent);
            power += g * g;
        }
        if power < POWER_EPSILON {
            return;
        }
        let norm = weight / power.sqrt();
        for speaker in &self.speakers {
            let g = speaker.grid.sample(x, y).max(0.0).powf(exponent);
            out.add(speaker.patch, g * norm);
        }
    }
}

/// Layered-matrix panner.
#[derive(Debug, Clone)]
pub struct LayeredPanner {
    /// Sorted by ascending elevation.
    layers: Vec<Layer>,
}

impl LayeredPanner {
    pub fn new(layout: &SpeakerLayout, config: &SpatConfig) -> Result<Self> {
        let mut speakers: Vec<(OutputPatch, Position)> = layout
            .panning_speakers()
            .map(|s| (s.output_patch, s.position))
            .collect();
        if speakers.is_empty() {
            return Err(Error::NotEnoughSpeakers {
                dimension: "layered",
                required: 1,
                found: 0,
            });
        }
        speakers.sort_by(|a, b| a.1.elevation().get().total_cmp(&b.1.elevation().get()));

        let tolerance = config.angle_tolerance().to_radians().get();
        let resolution = config.lbap_grid_resolution;
        let falloff = config.lbap_falloff_radius;

        let mut groups: Vec<Vec<(OutputPatch, Position)>> = Vec::new();
        let mut floor = f32::NEG_INFINITY;
        for speaker in speakers {
            let elevation = speaker.1.elevation().get();
            match groups.last_mut() {
                Some(group) if elevation - floor <= tolerance => group.push(speaker),
                _ => {
                    floor = elevation;
                    groups.push(vec![speaker]);
                }
            }
        }

        let layers: Vec<Layer> = groups
            .into_iter()
            .map(|group| {
                let count = group.len();
                let mean = group.iter().map(|(_, p)| p.elevation().get()).sum::<f32>() / count as f32;
                let exponent = if count <= EXPONENT_SPEAKER_THRESHOLD {
                    1.0
                } else {
                    count as f32 / EXPONENT_SPEAKER_THRESHOLD as f32
                };
                let speakers = group
                    .into_iter()
                    .map(|(patch, position)| {
                        let d = position.direction();
                        LayerSpeaker {
                            patch,
                            grid: GainGrid::new(resolution, falloff, d.x, d.y),
                        }
                    })
                    .collect();
                Layer {
                    elevation: Radians(mean),
                    exponent,
                    speakers,
                }
            })
            .collect();

        debug!(
            "Layered panner: {} layers ({})",
            layers.len(),
            layers
                .iter()
                .map(|l| format!("{:.1}°×{}", l.elevation.to_degrees().get(), l.speakers.len()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self { layers })
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Elevation of each layer, ascending.
    pub fn layer_elevations(&self) -> impl Iterator<Item = Radians> + '_ {
        self.layers.iter().map(|l| l.elevation)
    }

    /// Gains for `position` widened by `spread`, written into `out`.
    ///
    /// Inside the layer range total power is 1. Above the top layer the
    /// result fades linearly to silence at the zenith; below the bottom
    /// layer the bottom layer is held.
    pub fn compute(&self, position: &Position, spread: SpreadParams, out: &mut GainSet) {
        out.clear();
        let direction = position.direction();
        let radius = position.panning_radius();
        let (x, y) = (direction.x * radius, direction.y * radius);
        let elevation = position.elevation().get();

        let weights = LayerWeights::new(&self.layers, elevation, spread.elevation_span());
        for (layer, weight) in self.layers.iter().zip(weights.iter()) {
            layer.accumulate(x, y, spread.azimuth_span(), weight, out);
        }
        if out.normalize_power() {
            let fade = weights.above_top_fade;
            if fade < 1.0 {
                out.scale(fade);
            }
        }
    }
}

/// Blend weight of every layer for one source elevation.
struct LayerWeights<'a> {
    layers: &'a [Layer],
    elevation: f32,
    elevation_span: f32,
    lower: usize,
    upper: usize,
    fraction: f32,
    above_top_fade: f32,
}

impl<'a> LayerWeights<'a> {
    fn new(layers: &'a [Layer], elevation: f32, elevation_span: f32) -> Self {
        let last = layers.len() - 1;
        let half_pi = Radians::HALF_PI.get();
        let mut weights = Self {
            layers,
            elevation,
            elevation_span,
            lower: 0,
            upper: 0,
            fraction: 0.0,
            above_top_fade: 1.0,
        };

        if elevation <= layers[0].elevation.get() {
            return weights;
        }
        let top = layers[last].elevation.get();
        if elevation >= top {
            weights.lower = last;
            weights.upper = last;
            let room = half_pi - top;
            if room > 1e-4 {
                weights.above_top_fade = ((half_pi - elevation) / room).clamp(0.0, 1.0);
            }
            return weights;
        }
        for i in 0..last {
            let (lo, hi) = (layers[i].elevation.get(), layers[i + 1].elevation.get());
            if elevation >= lo && elevation < hi {
                weights.lower = i;
                weights.upper = i + 1;
                weights.fraction = (elevation - lo) / (hi - lo);
                break;
            }
        }
        weights
    }

    fn weight(&self, index: usize) -> f32 {
        let base = if index == self.lower && index == self.upper {
            1.0
        } else if index == self.lower {
            1.0 - self.fraction
        } else if index == self.upper {
            self.fraction
        } else {
            0.0
        };
        if self.elevation_span <= 0.0 {
            return base;
        }
        let distance = Degrees::from(Radians((self.layers[index].elevation.get() - self.elevation).abs()))
            .get();
        let spread = self.elevation_span * (1.0 - distance / 90.0).max(0.0);
        base.max(spread)
    }

    fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.layers.len()).map(move |i| self.weight(i))
    }
}

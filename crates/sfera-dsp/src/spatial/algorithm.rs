//! Closed dispatch over every panning algorithm.

use sfera_core::SpatConfig;
use tracing::info;

use super::attenuation::{AttenuationSettings, AttenuationState};
use super::binaural_panner::BinauralPanner;
use super::hybrid::HybridPanner;
use super::layered_panner::LayeredPanner;
use super::stereo_panner::StereoPanner;
use super::types::{
    SourceDescriptor, SourceSpatData, SourceSpatMode, SpatMode, SpeakerLayout, StereoMode,
    StereoReduction,
};
use super::vbap_panner::VbapPanner;
use crate::Result;

/// The panner currently in charge of turning sources into gains.
///
/// Built on the configuration thread whenever the layout, the global mode
/// or the stereo reduction changes.
#[derive(Debug, Clone)]
pub enum SpatAlgorithm {
    Vbap(VbapPanner),
    Mbap(LayeredPanner),
    Hybrid(HybridPanner),
    Stereo(StereoPanner),
    Binaural(BinauralPanner),
}

impl SpatAlgorithm {
    /// A stereo reduction takes precedence over `mode` and ignores `layout`.
    pub fn build(
        mode: SpatMode,
        reduction: Option<StereoReduction>,
        layout: &SpeakerLayout,
        config: &SpatConfig,
    ) -> Result<Self> {
        let algorithm = match reduction {
            Some(StereoReduction {
                mode: StereoMode::Stereo,
                routing,
            }) => Self::Stereo(StereoPanner::new(routing)),
            Some(StereoReduction {
                mode: StereoMode::Binaural,
                routing,
            }) => Self::Binaural(BinauralPanner::new(routing)?),
            None => match mode {
                SpatMode::Vbap => {
                    Self::Vbap(VbapPanner::new(layout, config.angle_tolerance().to_radians())?)
                }
                SpatMode::Mbap => Self::Mbap(LayeredPanner::new(layout, config)?),
                SpatMode::Hybrid => Self::Hybrid(HybridPanner::new(layout, config)?),
            },
        };
        info!(
            "Spatialization algorithm: {} ({} speakers)",
            algorithm.name(),
            layout.panning_count()
        );
        Ok(algorithm)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Vbap(p) if p.is_planar() => "VBAP 2-D",
            Self::Vbap(_) => "VBAP 3-D",
            Self::Mbap(_) => "MBAP",
            Self::Hybrid(_) => "Hybrid",
            Self::Stereo(_) => "Stereo",
            Self::Binaural(_) => "Binaural",
        }
    }

    /// Whether gains address the virtual binaural speakers instead of
    /// physical output patches.
    pub fn is_binaural(&self) -> bool {
        matches!(self, Self::Binaural(_))
    }

    pub fn triplet_count(&self) -> usize {
        match self {
            Self::Vbap(p) => p.triplets().len(),
            Self::Hybrid(h) => h.vbap().triplets().len(),
            Self::Binaural(b) => b.triplet_count(),
            Self::Mbap(_) | Self::Stereo(_) => 0,
        }
    }

    pub fn pair_count(&self) -> usize {
        match self {
            Self::Vbap(p) => p.pairs().len(),
            Self::Hybrid(h) => h.vbap().pairs().len(),
            _ => 0,
        }
    }

    pub fn layer_count(&self) -> usize {
        match self {
            Self::Mbap(p) => p.layer_count(),
            Self::Hybrid(h) => h.layered().layer_count(),
            _ => 0,
        }
    }

    /// Fills `out` with everything the audio thread needs for `source`.
    ///
    /// Direct-out sources skip panning entirely. Distance attenuation only
    /// applies to sources panned by the layered-matrix panner.
    pub fn compute_spat_data(
        &self,
        source: &SourceDescriptor,
        attenuation: &AttenuationSettings,
        sample_rate: f32,
        out: &mut SourceSpatData,
    ) {
        out.active = true;
        out.direct_out = source.direct_out;
        out.attenuation = AttenuationState::default();
        if source.direct_out.is_some() {
            out.gains.clear();
            return;
        }

        let position = &source.position;
        let layered = match self {
            Self::Vbap(p) => {
                p.compute_spread(position, source.spread, &mut out.gains);
                false
            }
            Self::Mbap(p) => {
                p.compute(position, source.spread, &mut out.gains);
                true
            }
            Self::Hybrid(h) => h.compute(source, &mut out.gains) == SourceSpatMode::Mbap,
            Self::Stereo(p) => {
                p.compute(position, source.spread, &mut out.gains);
                false
            }
            Self::Binaural(p) => {
                p.compute(position, source.spread, &mut out.gains);
                false
            }
        };
        if layered {
            out.attenuation = attenuation.compute(position.radius(), sample_rate);
        }
    }
}

use sfera_core::SpatConfig;

use super::layered_panner::LayeredPanner;
use super::types::{GainSet, SourceDescriptor, SourceSpatMode, SpeakerLayout};
use super::vbap_panner::VbapPanner;
use crate::Result;

/// Both panners over one layout; every source picks its own.
#[derive(Debug, Clone)]
pub struct HybridPanner {
    vbap: VbapPanner,
    layered: LayeredPanner,
}

impl HybridPanner {
    pub fn new(layout: &SpeakerLayout, config: &SpatConfig) -> Result<Self> {
        let tolerance = config.angle_tolerance().to_radians();
        Ok(Self {
            vbap: VbapPanner::new(layout, tolerance)?,
            layered: LayeredPanner::new(layout, config)?,
        })
    }

    pub fn vbap(&self) -> &VbapPanner {
        &self.vbap
    }

    pub fn layered(&self) -> &LayeredPanner {
        &self.layered
    }

    /// Routes `source` to the panner its mode selects and returns that mode.
    pub fn compute(&self, source: &SourceDescriptor, out: &mut GainSet) -> SourceSpatMode {
        match source.spat_mode {
            SourceSpatMode::Vbap => {
                self.vbap.compute_spread(&source.position, source.spread, out);
            }
            SourceSpatMode::Mbap => {
                self.layered.compute(&source.position, source.spread, out);
            }
        }
        source.spat_mode
    }
}

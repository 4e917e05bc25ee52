//! Builder for configuring and constructing a [`Spatializer`] and its
//! [`AudioRenderer`].

use sfera_core::{updater, Arc, SourceIndex, SpatConfig, StrongArray};
use sfera_dsp::{
    AttenuationSettings, HrirSet, SourceSpatData, SpatMode, SpeakerLayout, StereoReduction,
};

use crate::renderer::{AudioRenderer, RenderLayout};
use crate::state::SharedState;
use crate::{Result, Spatializer};

/// Length of the built-in spherical-head responses.
pub const DEFAULT_HRIR_LENGTH: usize = 64;

/// The renderer is handed to the audio thread; the spatializer stays with
/// whatever drives the scene (UI, OSC, automation).
///
/// Without a speaker layout or stereo reduction the renderer produces
/// silence (and direct-outs) until one is set.
///
/// # Example
///
/// ```
/// use sfera::prelude::*;
///
/// let speakers = [-30.0f32, 30.0, 0.0, 110.0, -110.0]
///     .iter()
///     .enumerate()
///     .map(|(i, &az)| {
///         SpeakerDescriptor::new(
///             OutputPatch::new(i as u16 + 1).unwrap(),
///             Position::from_degrees(az, 0.0, 1.0),
///         )
///     })
///     .collect();
///
/// let (spatializer, mut renderer) = Spatializer::builder()
///     .sample_rate(48000.0)
///     .max_block_size(256)
///     .speaker_layout(SpeakerLayout::new(speakers).unwrap())
///     .build()?;
///
/// assert_eq!(spatializer.algorithm_name(), Some("VBAP 2-D"));
///
/// let input = vec![0.0f32; 256];
/// renderer.process(&[&input], 256);
/// # Ok::<(), sfera::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpatializerBuilder {
    config: SpatConfig,
    layout: Option<SpeakerLayout>,
    mode: SpatMode,
    reduction: Option<StereoReduction>,
    hrirs: Option<HrirSet>,
    attenuation: AttenuationSettings,
}

impl SpatializerBuilder {
    /// Default: 48000
    pub fn sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 1024
    pub fn max_block_size(mut self, frames: usize) -> Self {
        self.config.max_block_size = frames;
        self
    }

    /// Default: 0.02
    pub fn gain_smoothing_secs(mut self, secs: f32) -> Self {
        self.config.gain_smoothing_secs = secs;
        self
    }

    /// Replaces the whole configuration, including anything set above.
    pub fn config(mut self, config: SpatConfig) -> Self {
        self.config = config;
        self
    }

    pub fn speaker_layout(mut self, layout: SpeakerLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Default: [`SpatMode::Vbap`]
    pub fn spat_mode(mut self, mode: SpatMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn stereo_reduction(mut self, reduction: StereoReduction) -> Self {
        self.reduction = Some(reduction);
        self
    }

    /// Head-related impulse responses for the binaural reduction. Defaults
    /// to a synthetic spherical-head set.
    pub fn hrirs(mut self, hrirs: HrirSet) -> Self {
        self.hrirs = Some(hrirs);
        self
    }

    pub fn attenuation(mut self, settings: AttenuationSettings) -> Self {
        self.attenuation = settings;
        self
    }

    pub fn build(self) -> Result<(Spatializer, AudioRenderer)> {
        self.config.validate()?;
        self.attenuation.validate()?;

        let hrirs = self.hrirs.unwrap_or_else(|| {
            HrirSet::synthetic(self.config.sample_rate as f32, DEFAULT_HRIR_LENGTH)
        });
        let shared = Arc::new(SharedState::new());
        let (layout_publisher, layout_subscriber) = updater(RenderLayout::default());
        let (publishers, subscribers) =
            StrongArray::<SourceIndex, _>::from_fn(|_| updater(SourceSpatData::default())).unzip();

        let renderer = AudioRenderer::new(
            &self.config,
            Arc::clone(&shared),
            layout_subscriber,
            subscribers,
        );
        let spatializer = Spatializer::from_parts(
            self.config,
            shared,
            layout_publisher,
            publishers,
            hrirs,
            self.attenuation,
        );

        if self.layout.is_some() || self.reduction.is_some() {
            spatializer.initialize(self.layout.unwrap_or_default(), self.mode, self.reduction)?;
        } else if self.mode != SpatMode::default() {
            spatializer.set_spat_mode(self.mode)?;
        }
        Ok((spatializer, renderer))
    }
}

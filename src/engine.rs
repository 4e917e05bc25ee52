//! Spatializer: the configuration-thread handle of the engine.

use parking_lot::Mutex;
use sfera_core::{
    db_to_gain, Arc, IndexSet, Ordering, OutputPatch, Position, Publisher, SourceIndex,
    SpatConfig, StrongArray,
};
use sfera_dsp::{
    AttenuationSettings, AttenuationState, BinauralConvolver, HrirSet, SourceDescriptor,
    SourceSpatData, SourceSpatMode, SpatAlgorithm, SpatMode, SpeakerLayout, SpreadParams,
    StereoMode, StereoReduction,
};
use tracing::{debug, warn};

use crate::renderer::RenderLayout;
use crate::state::{SharedState, SpeakerState};
use crate::{Error, Result};

struct SourceSlot {
    descriptor: SourceDescriptor,
    enabled: bool,
    publisher: Publisher<SourceSpatData>,
}

/// Everything a rebuild depends on.
#[derive(Clone)]
struct Setup {
    layout: SpeakerLayout,
    mode: SpatMode,
    reduction: Option<StereoReduction>,
    hrirs: HrirSet,
}

struct Inner {
    setup: Setup,
    attenuation: AttenuationSettings,
    algorithm: Option<SpatAlgorithm>,
    generation: u64,
    sources: StrongArray<SourceIndex, SourceSlot>,
    layout_publisher: Publisher<RenderLayout>,
    scratch: SourceSpatData,
}

/// Configuration-thread handle.
///
/// All rebuilds (triangulation, layer grids, HRIR assignment) and all gain
/// computations happen here, under an internal lock that the audio thread
/// never touches. Results reach the [`AudioRenderer`](crate::AudioRenderer)
/// only through lock-free updaters, so a slow rebuild just means the audio
/// thread keeps rendering the previous layout a little longer.
///
/// Methods take `&self`; share the handle between control threads with an
/// `Arc`.
pub struct Spatializer {
    inner: Mutex<Inner>,
    shared: Arc<SharedState>,
    config: SpatConfig,
}

impl Spatializer {
    pub fn builder() -> crate::SpatializerBuilder {
        crate::SpatializerBuilder::default()
    }

    pub(crate) fn from_parts(
        config: SpatConfig,
        shared: Arc<SharedState>,
        layout_publisher: Publisher<RenderLayout>,
        publishers: StrongArray<SourceIndex, Publisher<SourceSpatData>>,
        hrirs: HrirSet,
        attenuation: AttenuationSettings,
    ) -> Self {
        let sources = publishers.map(|index, publisher| SourceSlot {
            descriptor: SourceDescriptor::new(index),
            enabled: false,
            publisher,
        });
        Self {
            inner: Mutex::new(Inner {
                setup: Setup {
                    layout: SpeakerLayout::default(),
                    mode: SpatMode::default(),
                    reduction: None,
                    hrirs,
                },
                attenuation,
                algorithm: None,
                generation: 0,
                sources,
                layout_publisher,
                scratch: SourceSpatData::default(),
            }),
            shared,
            config,
        }
    }

    pub fn config(&self) -> &SpatConfig {
        &self.config
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.config.sample_rate
    }

    // Layout and algorithm

    /// Replaces the speaker layout.
    ///
    /// On failure (too few speakers, no usable triplet, bad crossover) the
    /// previous layout stays active and the error is returned.
    pub fn set_speaker_layout(&self, layout: SpeakerLayout) -> Result<()> {
        self.update_setup(|setup| setup.layout = layout)
    }

    pub fn set_spat_mode(&self, mode: SpatMode) -> Result<()> {
        self.update_setup(|setup| setup.mode = mode)
    }

    /// Switches to a stereo or binaural reduction, or back to the speaker
    /// layout with `None`.
    pub fn set_stereo_reduction(&self, reduction: Option<StereoReduction>) -> Result<()> {
        self.update_setup(|setup| setup.reduction = reduction)
    }

    /// Replaces the head-related impulse responses used by the binaural
    /// reduction. Must match the engine sample rate.
    pub fn set_hrirs(&self, hrirs: HrirSet) -> Result<()> {
        let sample_rate = self.config.sample_rate as f32;
        if (hrirs.sample_rate() - sample_rate).abs() > 0.5 {
            return Err(Error::Dsp(sfera_dsp::Error::InvalidHrir(format!(
                "recorded at {} Hz, engine runs at {} Hz",
                hrirs.sample_rate(),
                sample_rate
            ))));
        }
        self.update_setup(|setup| setup.hrirs = hrirs)
    }

    pub fn speaker_layout(&self) -> SpeakerLayout {
        self.inner.lock().setup.layout.clone()
    }

    pub fn spat_mode(&self) -> SpatMode {
        self.inner.lock().setup.mode
    }

    pub fn stereo_reduction(&self) -> Option<StereoReduction> {
        self.inner.lock().setup.reduction
    }

    /// Applies the builder's initial layout, mode and reduction in a
    /// single rebuild.
    pub(crate) fn initialize(
        &self,
        layout: SpeakerLayout,
        mode: SpatMode,
        reduction: Option<StereoReduction>,
    ) -> Result<()> {
        self.update_setup(|setup| {
            setup.layout = layout;
            setup.mode = mode;
            setup.reduction = reduction;
        })
    }

    fn update_setup(&self, edit: impl FnOnce(&mut Setup)) -> Result<()> {
        let mut inner = self.inner.lock();
        let mut setup = inner.setup.clone();
        edit(&mut setup);
        match self.rebuild(&mut inner, setup) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Rejected spatialization setup, keeping the previous one: {}", e);
                Err(e)
            }
        }
    }

    /// Builds the algorithm and render snapshot for `setup`, then commits.
    /// Nothing is changed unless every step succeeds.
    fn rebuild(&self, inner: &mut Inner, setup: Setup) -> Result<()> {
        let generation = inner.generation + 1;
        if setup.reduction.is_none() && setup.layout.is_empty() {
            // Nothing to pan onto yet.
            inner.setup = setup;
            inner.algorithm = None;
            let render = RenderLayout {
                generation,
                ..RenderLayout::default()
            };
            self.commit(inner, render);
            return Ok(());
        }

        let algorithm =
            SpatAlgorithm::build(setup.mode, setup.reduction, &setup.layout, &self.config)?;
        let sample_rate = self.config.sample_rate as f32;
        let render = match setup.reduction {
            None => RenderLayout::speakers(generation, &setup.layout, sample_rate)?,
            Some(StereoReduction {
                mode: StereoMode::Stereo,
                routing,
            }) => RenderLayout::stereo(generation, routing),
            Some(StereoReduction {
                mode: StereoMode::Binaural,
                routing,
            }) => {
                let convolver =
                    BinauralConvolver::new(&setup.hrirs, sample_rate, self.config.max_block_size)?;
                RenderLayout::binaural(generation, routing, convolver)
            }
        };

        debug!(
            "Layout generation {}: {} with {} speakers ({} triplets, {} pairs, {} layers)",
            generation,
            algorithm.name(),
            setup.layout.len(),
            algorithm.triplet_count(),
            algorithm.pair_count(),
            algorithm.layer_count()
        );
        inner.setup = setup;
        inner.algorithm = Some(algorithm);
        self.commit(inner, render);
        Ok(())
    }

    /// Republishes every enabled source against the new generation, then
    /// hands the snapshot to the audio thread.
    fn commit(&self, inner: &mut Inner, render: RenderLayout) {
        inner.generation = render.generation;
        let enabled: Vec<SourceIndex> = inner
            .sources
            .iter()
            .filter(|(_, slot)| slot.enabled)
            .map(|(index, _)| index)
            .collect();
        for index in enabled {
            self.publish_source(inner, index);
        }
        inner.layout_publisher.publish_value(render);
    }

    fn publish_source(&self, inner: &mut Inner, index: SourceIndex) {
        let Inner {
            algorithm,
            attenuation,
            generation,
            sources,
            scratch,
            ..
        } = inner;
        let slot = &mut sources[index];
        if !slot.enabled {
            scratch.deactivate();
        } else if let Some(algorithm) = algorithm {
            algorithm.compute_spat_data(
                &slot.descriptor,
                attenuation,
                self.config.sample_rate as f32,
                scratch,
            );
        } else {
            scratch.active = true;
            scratch.gains.clear();
            scratch.attenuation = AttenuationState::default();
            scratch.direct_out = slot.descriptor.direct_out;
        }
        scratch.generation = *generation;
        let data = &*scratch;
        slot.publisher.publish_with(|published| published.clone_from(data));
    }

    // Layout introspection

    /// Output patches of the active layout (or the routing pair of a
    /// stereo/binaural reduction).
    pub fn output_patches(&self) -> IndexSet<OutputPatch> {
        let inner = self.inner.lock();
        match inner.setup.reduction {
            Some(reduction) => [reduction.routing.left, reduction.routing.right]
                .into_iter()
                .collect(),
            None => inner.setup.layout.output_patches(),
        }
    }

    /// Name of the active algorithm, `None` before a layout is loaded.
    pub fn algorithm_name(&self) -> Option<&'static str> {
        self.inner.lock().algorithm.as_ref().map(|a| a.name())
    }

    pub fn triplet_count(&self) -> usize {
        self.inner
            .lock()
            .algorithm
            .as_ref()
            .map_or(0, |a| a.triplet_count())
    }

    pub fn pair_count(&self) -> usize {
        self.inner
            .lock()
            .algorithm
            .as_ref()
            .map_or(0, |a| a.pair_count())
    }

    pub fn layer_count(&self) -> usize {
        self.inner
            .lock()
            .algorithm
            .as_ref()
            .map_or(0, |a| a.layer_count())
    }

    /// Generation of the most recently published layout.
    pub fn layout_generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Generation the audio thread rendered its last block with.
    pub fn rendered_generation(&self) -> u64 {
        self.shared.rendered_generation.load(Ordering::Acquire)
    }

    pub fn blocks_rendered(&self) -> u64 {
        self.shared.blocks_rendered.load(Ordering::Relaxed)
    }

    // Sources

    /// Loads `descriptor` and enables its source.
    ///
    /// A position with a NaN or infinite coordinate is rejected and the
    /// source is left untouched.
    pub fn add_source(&self, descriptor: SourceDescriptor) -> Result<()> {
        check_position(&descriptor.position)?;
        let mut inner = self.inner.lock();
        let index = descriptor.index;
        let slot = &mut inner.sources[index];
        slot.descriptor = descriptor;
        slot.enabled = true;
        debug!("Enabled {}", index);
        self.publish_source(&mut inner, index);
        Ok(())
    }

    pub fn enable_source(&self, index: SourceIndex) {
        self.edit_source(index, |slot| slot.enabled = true);
    }

    /// The source fades out and stops contributing to any output.
    pub fn disable_source(&self, index: SourceIndex) {
        self.edit_source(index, |slot| slot.enabled = false);
    }

    pub fn is_source_enabled(&self, index: SourceIndex) -> bool {
        self.inner.lock().sources[index].enabled
    }

    pub fn source(&self, index: SourceIndex) -> SourceDescriptor {
        self.inner.lock().sources[index].descriptor.clone()
    }

    /// Replaces a source's parameters; the index comes from `descriptor`.
    pub fn set_source(&self, descriptor: SourceDescriptor) -> Result<()> {
        check_position(&descriptor.position)?;
        let index = descriptor.index;
        self.edit_source(index, |slot| slot.descriptor = descriptor);
        Ok(())
    }

    pub fn set_source_position(&self, index: SourceIndex, position: Position) -> Result<()> {
        check_position(&position)?;
        self.edit_source(index, |slot| slot.descriptor.position = position);
        Ok(())
    }

    /// Algorithm the source uses when the global mode is [`SpatMode::Hybrid`].
    pub fn set_source_spat_mode(&self, index: SourceIndex, mode: SourceSpatMode) {
        self.edit_source(index, |slot| slot.descriptor.spat_mode = mode);
    }

    /// Routes the source straight to `patch` at unity gain, or back to
    /// spatialization with `None`.
    pub fn set_source_direct_out(&self, index: SourceIndex, patch: Option<OutputPatch>) {
        self.edit_source(index, |slot| slot.descriptor.direct_out = patch);
    }

    pub fn set_source_spread(&self, index: SourceIndex, spread: SpreadParams) {
        self.edit_source(index, |slot| slot.descriptor.spread = spread);
    }

    fn edit_source(&self, index: SourceIndex, edit: impl FnOnce(&mut SourceSlot)) {
        let mut inner = self.inner.lock();
        edit(&mut inner.sources[index]);
        self.publish_source(&mut inner, index);
    }

    // Global parameters

    /// Distance attenuation for layered-matrix sources. Recomputes every
    /// enabled source.
    pub fn set_attenuation(&self, settings: AttenuationSettings) -> Result<()> {
        settings.validate()?;
        let mut inner = self.inner.lock();
        inner.attenuation = settings;
        let enabled: Vec<SourceIndex> = inner
            .sources
            .iter()
            .filter(|(_, slot)| slot.enabled)
            .map(|(index, _)| index)
            .collect();
        for index in enabled {
            self.publish_source(&mut inner, index);
        }
        Ok(())
    }

    pub fn attenuation(&self) -> AttenuationSettings {
        self.inner.lock().attenuation
    }

    pub fn set_master_gain_db(&self, db: f32) -> Result<()> {
        if db.is_nan() || db > 24.0 {
            return Err(Error::Core(sfera_core::Error::InvalidParameter(format!(
                "master gain {db} dB out of range (up to +24 dB)"
            ))));
        }
        self.shared.master_gain.set(db_to_gain(db));
        Ok(())
    }

    pub fn master_gain_db(&self) -> f32 {
        sfera_core::gain_to_db(self.shared.master_gain.get())
    }

    // Mute / solo

    pub fn set_source_mute(&self, index: SourceIndex, muted: bool) {
        self.shared.sources.set_mute(index, muted);
    }

    pub fn set_source_solo(&self, index: SourceIndex, soloed: bool) {
        self.shared.sources.set_solo(index, soloed);
    }

    pub fn is_source_muted(&self, index: SourceIndex) -> bool {
        self.shared.sources.is_muted(index)
    }

    pub fn is_source_soloed(&self, index: SourceIndex) -> bool {
        self.shared.sources.is_soloed(index)
    }

    pub fn set_speaker_mute(&self, patch: OutputPatch, muted: bool) {
        self.shared.speakers.set_mute(patch, muted);
    }

    pub fn set_speaker_solo(&self, patch: OutputPatch, soloed: bool) {
        self.shared.speakers.set_solo(patch, soloed);
    }

    // Metering

    /// Peak level of a source's input, in dBFS.
    pub fn source_level_db(&self, index: SourceIndex) -> f32 {
        self.shared.meters.source_peak_db(index)
    }

    /// Peak level of an output, in dBFS.
    pub fn speaker_level_db(&self, patch: OutputPatch) -> f32 {
        self.shared.meters.output_peak_db(patch)
    }

    pub fn speaker_state(&self, patch: OutputPatch) -> SpeakerState {
        SpeakerState {
            muted: self.shared.speakers.is_muted(patch),
            soloed: self.shared.speakers.is_soloed(patch),
            active: self.output_patches().contains(patch),
            level_db: self.speaker_level_db(patch),
        }
    }

    pub fn reset_meters(&self) {
        self.shared.meters.reset();
    }
}

fn check_position(position: &Position) -> Result<()> {
    if position.is_finite() {
        return Ok(());
    }
    warn!("Rejected non-finite source position {:?}", position.cartesian());
    Err(Error::Core(sfera_core::Error::InvalidParameter(
        "source position must be finite".into(),
    )))
}

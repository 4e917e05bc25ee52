//! Audio-thread block mixer.
//!
//! Once per block the renderer adopts the newest published layout snapshot
//! and per-source gain sets, moves every per-speaker gain one smoothing step
//! toward its target, and accumulates source audio into per-output buffers.
//! Nothing here allocates, locks or logs.

use sfera_core::{
    block_peak, block_smoothing_coefficient, release_coefficient, Arc, GainRamp, IndexSet,
    Ordering, OutputPatch, SmoothedValue, SourceIndex, SpatConfig, StrongArray, StrongIndex,
    Subscriber, MAX_SOURCES,
};
use sfera_dsp::{
    BinauralConvolver, DistanceFilter, HighpassCoefficients, Lr4State, SourceSpatData,
    SpeakerLayout, StereoRouting, VIRTUAL_SPEAKER_COUNT,
};

use crate::state::SharedState;
use crate::Result;

/// Release time of the level meters.
pub const METER_RELEASE_SECS: f32 = 0.3;

/// Whether panned gains address physical speakers or the virtual binaural dome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderDomain {
    Speakers,
    Binaural,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RenderOutput {
    pub(crate) patch: OutputPatch,
    /// Linear speaker trim.
    pub(crate) gain: f32,
    pub(crate) highpass: Option<HighpassCoefficients>,
}

/// Everything the audio thread needs to know about the active layout.
///
/// Built whole on the configuration thread and handed over through the
/// layout updater; the audio thread never sees a partially built one.
#[derive(Debug, Clone)]
pub(crate) struct RenderLayout {
    pub(crate) generation: u64,
    pub(crate) domain: RenderDomain,
    /// Patches panned gains are mixed into.
    pub(crate) pan_targets: Vec<OutputPatch>,
    pub(crate) pan_target_set: IndexSet<OutputPatch>,
    /// Physical outputs driven by the layout.
    pub(crate) outputs: Vec<RenderOutput>,
    pub(crate) output_set: IndexSet<OutputPatch>,
    pub(crate) binaural: Option<(BinauralConvolver, StereoRouting)>,
}

impl Default for RenderLayout {
    fn default() -> Self {
        Self {
            generation: 0,
            domain: RenderDomain::Speakers,
            pan_targets: Vec::new(),
            pan_target_set: IndexSet::new(),
            outputs: Vec::new(),
            output_set: IndexSet::new(),
            binaural: None,
        }
    }
}

impl RenderLayout {
    /// Panning over `layout`'s speakers; direct-out-only speakers are
    /// outputs but never pan targets.
    pub(crate) fn speakers(generation: u64, layout: &SpeakerLayout, sample_rate: f32) -> Result<Self> {
        let pan_targets: Vec<OutputPatch> =
            layout.panning_speakers().map(|s| s.output_patch).collect();
        let outputs = layout
            .speakers()
            .iter()
            .map(|speaker| {
                let highpass = speaker
                    .highpass_hz
                    .map(|hz| HighpassCoefficients::new(hz, sample_rate))
                    .transpose()?;
                Ok(RenderOutput {
                    patch: speaker.output_patch,
                    gain: sfera_core::db_to_gain(speaker.gain_db),
                    highpass,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::assemble(
            generation,
            RenderDomain::Speakers,
            pan_targets,
            outputs,
            None,
        ))
    }

    /// Constant-power stereo onto the routing pair.
    pub(crate) fn stereo(generation: u64, routing: StereoRouting) -> Self {
        let pair = routing_patches(routing);
        Self::assemble(
            generation,
            RenderDomain::Speakers,
            pair.clone(),
            pair.into_iter().map(unity_output).collect(),
            None,
        )
    }

    /// Virtual-dome panning convolved down to the routing pair.
    pub(crate) fn binaural(generation: u64, routing: StereoRouting, convolver: BinauralConvolver) -> Self {
        let virtual_patches = (0..VIRTUAL_SPEAKER_COUNT).map(OutputPatch::from_slot).collect();
        Self::assemble(
            generation,
            RenderDomain::Binaural,
            virtual_patches,
            routing_patches(routing).into_iter().map(unity_output).collect(),
            Some((convolver, routing)),
        )
    }

    fn assemble(
        generation: u64,
        domain: RenderDomain,
        pan_targets: Vec<OutputPatch>,
        outputs: Vec<RenderOutput>,
        binaural: Option<(BinauralConvolver, StereoRouting)>,
    ) -> Self {
        Self {
            generation,
            domain,
            pan_target_set: pan_targets.iter().copied().collect(),
            pan_targets,
            output_set: outputs.iter().map(|o| o.patch).collect(),
            outputs,
            binaural,
        }
    }
}

fn routing_patches(routing: StereoRouting) -> Vec<OutputPatch> {
    if routing.left == routing.right {
        vec![routing.left]
    } else {
        vec![routing.left, routing.right]
    }
}

fn unity_output(patch: OutputPatch) -> RenderOutput {
    RenderOutput {
        patch,
        gain: 1.0,
        highpass: None,
    }
}

/// Audio-thread state of one source.
struct SourceRender {
    data: Subscriber<SourceSpatData>,
    ramps: StrongArray<OutputPatch, GainRamp>,
    direct_ramp: GainRamp,
    /// Patch the direct-out ramp is currently sounding on.
    direct_patch: Option<OutputPatch>,
    filter: DistanceFilter,
}

/// Real-time half of the engine. Move it to the audio thread and call
/// [`AudioRenderer::process`] once per block.
pub struct AudioRenderer {
    shared: Arc<SharedState>,
    layout: Subscriber<RenderLayout>,
    sources: StrongArray<SourceIndex, SourceRender>,
    buffers: StrongArray<OutputPatch, Box<[f32]>>,
    /// Patches written during the current block.
    touched: IndexSet<OutputPatch>,
    output_ramps: StrongArray<OutputPatch, GainRamp>,
    highpass: StrongArray<OutputPatch, Lr4State>,
    master: SmoothedValue,
    master_gains: Box<[f32]>,
    filtered: Box<[f32]>,
    binaural_left: Box<[f32]>,
    binaural_right: Box<[f32]>,
    sample_rate: f32,
    max_block_size: usize,
    smoothing_secs: f32,
    generation: u64,
    domain: RenderDomain,
    previous_outputs: IndexSet<OutputPatch>,
    frames: usize,
}

impl AudioRenderer {
    pub(crate) fn new(
        config: &SpatConfig,
        shared: Arc<SharedState>,
        layout: Subscriber<RenderLayout>,
        sources: StrongArray<SourceIndex, Subscriber<SourceSpatData>>,
    ) -> Self {
        let sample_rate = config.sample_rate as f32;
        let max_block_size = config.max_block_size;
        let block = || vec![0.0f32; max_block_size].into_boxed_slice();
        let master_initial = shared.master_gain.get();

        Self {
            shared,
            layout,
            sources: sources.map(|_, data| SourceRender {
                data,
                ramps: StrongArray::default(),
                direct_ramp: GainRamp::default(),
                direct_patch: None,
                filter: DistanceFilter::default(),
            }),
            buffers: StrongArray::from_fn(|_| block()),
            touched: IndexSet::new(),
            output_ramps: StrongArray::default(),
            highpass: StrongArray::default(),
            master: SmoothedValue::new(master_initial, config.gain_smoothing_secs, sample_rate),
            master_gains: block(),
            filtered: block(),
            binaural_left: block(),
            binaural_right: block(),
            sample_rate,
            max_block_size,
            smoothing_secs: config.gain_smoothing_secs,
            generation: 0,
            domain: RenderDomain::Speakers,
            previous_outputs: IndexSet::new(),
            frames: 0,
        }
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Layout generation the last block was rendered with.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Frames produced by the last block.
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The last block's samples for `patch` (silence for unused patches).
    #[inline]
    pub fn output(&self, patch: OutputPatch) -> &[f32] {
        &self.buffers[patch][..self.frames]
    }

    /// Outputs of the active layout with their last block.
    pub fn outputs(&self) -> impl Iterator<Item = (OutputPatch, &[f32])> + '_ {
        self.layout
            .current()
            .outputs
            .iter()
            .map(move |o| (o.patch, self.output(o.patch)))
    }

    /// Layout outputs plus any direct-out patch written in the last block.
    pub fn active_outputs(&self) -> IndexSet<OutputPatch> {
        let mut set = self.layout.current().output_set;
        set.union_with(&self.touched);
        set
    }

    /// Renders one block.
    ///
    /// `inputs[i]` is the audio of source `i + 1`; sources without an input
    /// are skipped. `frames` is clamped to the configured maximum block
    /// size and to each input's length. Returns the number of frames
    /// rendered.
    pub fn process(&mut self, inputs: &[&[f32]], frames: usize) -> usize {
        let frames = frames.min(self.max_block_size);
        if self.layout.update() && self.layout.current().generation != self.generation {
            self.adopt_layout();
        }

        let stale = self.frames.max(frames);
        for patch in self.touched.iter() {
            self.buffers[patch][..stale].fill(0.0);
        }
        self.touched.clear();
        self.frames = frames;

        let coefficient = block_smoothing_coefficient(self.smoothing_secs, self.sample_rate, frames);
        let release = release_coefficient(METER_RELEASE_SECS, self.sample_rate, frames);

        let Self {
            shared,
            layout,
            sources,
            buffers,
            touched,
            output_ramps,
            highpass,
            master,
            master_gains,
            filtered,
            binaural_left,
            binaural_right,
            ..
        } = self;
        let RenderLayout {
            generation,
            pan_targets,
            outputs,
            output_set,
            binaural,
            ..
        } = layout.current_mut();
        let generation = *generation;

        if let Some((convolver, _)) = binaural.as_mut() {
            convolver.clear_buses(frames);
        }

        for (slot, input) in inputs.iter().take(MAX_SOURCES).enumerate() {
            let source = SourceIndex::from_slot(slot);
            let state = &mut sources[source];
            state.data.update();

            let input = &input[..frames.min(input.len())];
            shared
                .meters
                .update_source(source, block_peak(input), release);

            let data = state.data.current();
            let audible = if data.active && shared.sources.is_audible(source) {
                1.0
            } else {
                0.0
            };

            // Direct out: fade out on the old patch before moving to a new one.
            let wanted = if data.active { data.direct_out } else { None };
            if state.direct_patch != wanted && state.direct_ramp.current() == 0.0 {
                state.direct_patch = wanted;
            }
            if let Some(patch) = state.direct_patch {
                let target = if Some(patch) == wanted { audible } else { 0.0 };
                if !state.direct_ramp.is_silent(target) {
                    let (start, step) = state.direct_ramp.advance(target, coefficient, input.len());
                    mix(&mut buffers[patch][..input.len()], input, start, step);
                    touched.insert(patch);
                }
            }

            // Gains computed against another layout generation are held for
            // the block that straddles the change.
            let hold = data.active && data.generation != generation;
            let scale = data.attenuation.gain * audible;
            let target_of = |ramp: &GainRamp, patch: OutputPatch| {
                if hold {
                    ramp.current()
                } else {
                    data.gains.get(patch) * scale
                }
            };
            let sounding = pan_targets.iter().any(|&patch| {
                let ramp = &state.ramps[patch];
                !ramp.is_silent(target_of(ramp, patch))
            });
            if !sounding {
                continue;
            }

            let signal = &mut filtered[..input.len()];
            state
                .filter
                .process(data.attenuation.coefficient, input, signal);
            let signal = &*signal;

            for &patch in pan_targets.iter() {
                let ramp = &mut state.ramps[patch];
                let target = target_of(ramp, patch);
                if ramp.is_silent(target) {
                    continue;
                }
                let (start, step) = ramp.advance(target, coefficient, signal.len());
                match binaural.as_mut() {
                    Some((convolver, _)) => {
                        if let Some(bus) = convolver.bus_mut(patch) {
                            mix(&mut bus[..signal.len()], signal, start, step);
                        }
                    }
                    None => {
                        mix(&mut buffers[patch][..signal.len()], signal, start, step);
                        touched.insert(patch);
                    }
                }
            }
        }

        if let Some((convolver, routing)) = binaural.as_mut() {
            let left = &mut binaural_left[..frames];
            let right = &mut binaural_right[..frames];
            left.fill(0.0);
            right.fill(0.0);
            convolver.render(frames, left, right);
            add(&mut buffers[routing.left][..frames], left);
            add(&mut buffers[routing.right][..frames], right);
            touched.insert(routing.left);
            touched.insert(routing.right);
        }

        master.set_target(shared.master_gain.get());
        let master_gains = &mut master_gains[..frames];
        master.fill(master_gains);

        for output in outputs.iter() {
            let patch = output.patch;
            let target = if shared.speakers.is_audible(patch) {
                output.gain
            } else {
                0.0
            };
            let (start, step) = output_ramps[patch].advance(target, coefficient, frames);
            if !touched.contains(patch) {
                shared.meters.update_output(patch, 0.0, release);
                continue;
            }
            let buffer = &mut buffers[patch][..frames];
            scale_ramp(buffer, start, step);
            if let Some(coefficients) = &output.highpass {
                highpass[patch].process(coefficients, buffer);
            }
            apply_gains(buffer, master_gains);
            shared
                .meters
                .update_output(patch, block_peak(buffer), release);
        }

        // Direct-out patches outside the layout.
        for patch in touched.iter() {
            if output_set.contains(patch) {
                continue;
            }
            let target = if shared.speakers.is_audible(patch) {
                1.0
            } else {
                0.0
            };
            let (start, step) = output_ramps[patch].advance(target, coefficient, frames);
            let buffer = &mut buffers[patch][..frames];
            scale_ramp(buffer, start, step);
            apply_gains(buffer, master_gains);
            shared
                .meters
                .update_output(patch, block_peak(buffer), release);
        }

        shared
            .rendered_generation
            .store(generation, Ordering::Release);
        shared.blocks_rendered.fetch_add(1, Ordering::Relaxed);
        frames
    }

    /// Resets smoothing state that does not carry over to the new layout.
    fn adopt_layout(&mut self) {
        let layout = self.layout.current();
        let domain_changed = layout.domain != self.domain;

        for (_, state) in self.sources.iter_mut() {
            for (patch, ramp) in state.ramps.iter_mut() {
                if domain_changed || !layout.pan_target_set.contains(patch) {
                    ramp.reset(0.0);
                }
            }
        }

        for output in &layout.outputs {
            if !self.previous_outputs.contains(output.patch) {
                let audible = self.shared.speakers.is_audible(output.patch);
                self.output_ramps[output.patch].reset(if audible { output.gain } else { 0.0 });
                self.highpass[output.patch].reset();
            }
        }

        self.previous_outputs = layout.output_set;
        self.generation = layout.generation;
        self.domain = layout.domain;
    }
}

/// `dst[i] += src[i] * (start + step·i)`
#[inline]
fn mix(dst: &mut [f32], src: &[f32], start: f32, step: f32) {
    if step == 0.0 {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d += s * start;
        }
    } else {
        let mut gain = start;
        for (d, &s) in dst.iter_mut().zip(src) {
            *d += s * gain;
            gain += step;
        }
    }
}

#[inline]
fn add(dst: &mut [f32], src: &[f32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d += s;
    }
}

#[inline]
fn scale_ramp(buffer: &mut [f32], start: f32, step: f32) {
    if step == 0.0 {
        if start != 1.0 {
            buffer.iter_mut().for_each(|s| *s *= start);
        }
        return;
    }
    let mut gain = start;
    for s in buffer.iter_mut() {
        *s *= gain;
        gain += step;
    }
}

#[inline]
fn apply_gains(buffer: &mut [f32], gains: &[f32]) {
    for (s, &g) in buffer.iter_mut().zip(gains) {
        *s *= g;
    }
}

//! Control state shared lock-free between the configuration handle and the
//! audio renderer.

use sfera_core::{
    AtomicFlag, AtomicFloat, AtomicU64, AtomicUsize, LevelMeters, Ordering, OutputPatch,
    SourceIndex, StrongArray, StrongIndex,
};

/// Mute and solo flags for one identifier domain.
///
/// Only the configuration thread writes; the audio thread reads once per
/// block. `solo_count` mirrors the number of set solo flags so the audio
/// thread can tell whether any solo is active without scanning.
pub(crate) struct MuteSolo<K: StrongIndex> {
    mute: StrongArray<K, AtomicFlag>,
    solo: StrongArray<K, AtomicFlag>,
    solo_count: AtomicUsize,
}

impl<K: StrongIndex> MuteSolo<K> {
    fn new() -> Self {
        Self {
            mute: StrongArray::default(),
            solo: StrongArray::default(),
            solo_count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_mute(&self, key: K, muted: bool) {
        self.mute[key].set(muted);
    }

    pub(crate) fn set_solo(&self, key: K, soloed: bool) {
        if self.solo[key].swap(soloed) != soloed {
            if soloed {
                self.solo_count.fetch_add(1, Ordering::AcqRel);
            } else {
                self.solo_count.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    #[inline]
    pub(crate) fn is_muted(&self, key: K) -> bool {
        self.mute[key].get()
    }

    #[inline]
    pub(crate) fn is_soloed(&self, key: K) -> bool {
        self.solo[key].get()
    }

    #[inline]
    pub(crate) fn any_solo(&self) -> bool {
        self.solo_count.load(Ordering::Acquire) > 0
    }

    /// Whether `key` should be heard: not muted, and soloed if anything is.
    #[inline]
    pub(crate) fn is_audible(&self, key: K) -> bool {
        !self.is_muted(key) && (!self.any_solo() || self.is_soloed(key))
    }
}

/// Per-speaker state reported to UI collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeakerState {
    pub muted: bool,
    pub soloed: bool,
    /// Part of the active layout (or the stereo routing pair).
    pub active: bool,
    /// Peak level in dBFS.
    pub level_db: f32,
}

pub(crate) struct SharedState {
    pub(crate) sources: MuteSolo<SourceIndex>,
    pub(crate) speakers: MuteSolo<OutputPatch>,
    /// Linear master gain target.
    pub(crate) master_gain: AtomicFloat,
    pub(crate) meters: LevelMeters,
    /// Layout generation used by the most recent rendered block.
    pub(crate) rendered_generation: AtomicU64,
    pub(crate) blocks_rendered: AtomicU64,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            sources: MuteSolo::new(),
            speakers: MuteSolo::new(),
            master_gain: AtomicFloat::new(1.0),
            meters: LevelMeters::new(),
            rendered_generation: AtomicU64::new(0),
            blocks_rendered: AtomicU64::new(0),
        }
    }
}

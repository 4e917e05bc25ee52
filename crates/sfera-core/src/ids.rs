//! Strongly typed 1-based identifiers and fixed-capacity storage keyed by them.
//!
//! Sources and output patches are both numbered from 1 by the surrounding
//! application. Keeping them as distinct types means a source index can never
//! be used to address an output buffer by accident.

use core::fmt;
use core::marker::PhantomData;
use core::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum number of sources a renderer can mix.
pub const MAX_SOURCES: usize = 256;

/// Maximum number of output patches (physical output channels).
pub const MAX_OUTPUT_PATCHES: usize = 256;

/// A 1-based identifier with a fixed upper bound.
pub trait StrongIndex: Copy + Eq + Ord + core::hash::Hash + fmt::Debug {
    /// Human-readable name used in error messages.
    const KIND: &'static str;
    /// Largest valid value (inclusive).
    const CAPACITY: usize;

    /// Zero-based storage slot.
    fn slot(self) -> usize;

    /// Inverse of [`slot`](StrongIndex::slot). `slot` must be below `CAPACITY`.
    fn from_slot(slot: usize) -> Self;
}

macro_rules! strong_index {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $capacity:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u16", into = "u16")]
        pub struct $name(u16);

        impl $name {
            /// Validates that `value` lies in `1..=CAPACITY`.
            pub fn new(value: u16) -> Result<Self> {
                if value == 0 || value as usize > $capacity {
                    return Err(Error::IndexOutOfRange {
                        kind: $kind,
                        value: value as usize,
                        max: $capacity,
                    });
                }
                Ok(Self(value))
            }

            /// The 1-based value.
            #[inline]
            pub fn get(self) -> u16 {
                self.0
            }

            /// Every valid identifier in ascending order.
            pub fn all() -> impl Iterator<Item = Self> {
                (0..$capacity).map(<Self as StrongIndex>::from_slot)
            }
        }

        impl StrongIndex for $name {
            const KIND: &'static str = $kind;
            const CAPACITY: usize = $capacity;

            #[inline]
            fn slot(self) -> usize {
                self.0 as usize - 1
            }

            #[inline]
            fn from_slot(slot: usize) -> Self {
                debug_assert!(slot < $capacity);
                Self((slot + 1) as u16)
            }
        }

        impl TryFrom<u16> for $name {
            type Error = Error;
            fn try_from(value: u16) -> Result<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<usize> for $name {
            type Error = Error;
            fn try_from(value: usize) -> Result<Self> {
                let narrowed = u16::try_from(value).map_err(|_| Error::IndexOutOfRange {
                    kind: $kind,
                    value,
                    max: $capacity,
                })?;
                Self::new(narrowed)
            }
        }

        impl From<$name> for u16 {
            fn from(value: $name) -> u16 {
                value.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", $kind, self.0)
            }
        }
    };
}

strong_index!(
    /// 1-based source channel index (`1..=MAX_SOURCES`).
    SourceIndex,
    "source",
    MAX_SOURCES
);

strong_index!(
    /// 1-based physical output channel identifier (`1..=MAX_OUTPUT_PATCHES`).
    OutputPatch,
    "output patch",
    MAX_OUTPUT_PATCHES
);

/// Fixed-size storage with one slot per valid identifier of `K`.
///
/// Allocated once; indexing never allocates and never fails.
pub struct StrongArray<K: StrongIndex, T> {
    items: Box<[T]>,
    _key: PhantomData<K>,
}

impl<K: StrongIndex, T> StrongArray<K, T> {
    pub fn from_fn(mut f: impl FnMut(K) -> T) -> Self {
        let items: Vec<T> = (0..K::CAPACITY).map(|slot| f(K::from_slot(slot))).collect();
        Self {
            items: items.into_boxed_slice(),
            _key: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(slot, item)| (K::from_slot(slot), item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut T)> {
        self.items
            .iter_mut()
            .enumerate()
            .map(|(slot, item)| (K::from_slot(slot), item))
    }

    /// Converts every element, keeping its key.
    pub fn map<U>(self, mut f: impl FnMut(K, T) -> U) -> StrongArray<K, U> {
        let items: Vec<U> = self
            .items
            .into_vec()
            .into_iter()
            .enumerate()
            .map(|(slot, item)| f(K::from_slot(slot), item))
            .collect();
        StrongArray {
            items: items.into_boxed_slice(),
            _key: PhantomData,
        }
    }

    pub fn values(&self) -> &[T] {
        &self.items
    }

    pub fn values_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<K: StrongIndex, A, B> StrongArray<K, (A, B)> {
    /// Splits an array of pairs, e.g. the two ends of one channel per key.
    pub fn unzip(self) -> (StrongArray<K, A>, StrongArray<K, B>) {
        let (a, b): (Vec<A>, Vec<B>) = self.items.into_vec().into_iter().unzip();
        (
            StrongArray {
                items: a.into_boxed_slice(),
                _key: PhantomData,
            },
            StrongArray {
                items: b.into_boxed_slice(),
                _key: PhantomData,
            },
        )
    }
}

impl<K: StrongIndex, T: Default> Default for StrongArray<K, T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<K: StrongIndex, T: Clone> Clone for StrongArray<K, T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            _key: PhantomData,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.items.clone_from_slice(&source.items);
    }
}

impl<K: StrongIndex, T: fmt::Debug> fmt::Debug for StrongArray<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: StrongIndex, T> Index<K> for StrongArray<K, T> {
    type Output = T;

    #[inline]
    fn index(&self, key: K) -> &T {
        &self.items[key.slot()]
    }
}

impl<K: StrongIndex, T> IndexMut<K> for StrongArray<K, T> {
    #[inline]
    fn index_mut(&mut self, key: K) -> &mut T {
        &mut self.items[key.slot()]
    }
}

const SET_WORDS: usize = 4;

/// Validity bitset over a [`StrongIndex`] domain of at most 256 identifiers.
pub struct IndexSet<K: StrongIndex> {
    words: [u64; SET_WORDS],
    _key: PhantomData<K>,
}

impl<K: StrongIndex> IndexSet<K> {
    pub const fn new() -> Self {
        Self {
            words: [0; SET_WORDS],
            _key: PhantomData,
        }
    }

    #[inline]
    fn locate(key: K) -> (usize, u64) {
        let slot = key.slot();
        debug_assert!(slot < SET_WORDS * 64);
        (slot / 64, 1u64 << (slot % 64))
    }

    /// Returns true if `key` was not already present.
    #[inline]
    pub fn insert(&mut self, key: K) -> bool {
        let (word, bit) = Self::locate(key);
        let absent = self.words[word] & bit == 0;
        self.words[word] |= bit;
        absent
    }

    /// Returns true if `key` was present.
    #[inline]
    pub fn remove(&mut self, key: K) -> bool {
        let (word, bit) = Self::locate(key);
        let present = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        present
    }

    #[inline]
    pub fn contains(&self, key: K) -> bool {
        let (word, bit) = Self::locate(key);
        self.words[word] & bit != 0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    #[inline]
    pub fn clear(&mut self) {
        self.words = [0; SET_WORDS];
    }

    pub fn union_with(&mut self, other: &Self) {
        for (word, other) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= *other;
        }
    }

    /// Members in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = K> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(index, &word)| SetBits { word, base: index * 64 })
            .map(K::from_slot)
    }
}

struct SetBits {
    word: u64,
    base: usize,
}

impl Iterator for SetBits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.word == 0 {
            return None;
        }
        let bit = self.word.trailing_zeros() as usize;
        self.word &= self.word - 1;
        Some(self.base + bit)
    }
}

impl<K: StrongIndex> Default for IndexSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: StrongIndex> Clone for IndexSet<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: StrongIndex> Copy for IndexSet<K> {}

impl<K: StrongIndex> PartialEq for IndexSet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.words == other.words
    }
}

impl<K: StrongIndex> Eq for IndexSet<K> {}

impl<K: StrongIndex> fmt::Debug for IndexSet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: StrongIndex> FromIterator<K> for IndexSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

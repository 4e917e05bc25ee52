//! Single-slot lock-free handoff from a configuration thread to the audio thread.
//!
//! ```text
//! Configuration thread                     Audio thread
//! ────────────────────                     ────────────
//! Publisher::scratch() ── fill ──┐
//! Publisher::publish()  ─────────┼──> [pending slot] ──> Subscriber::update()
//!                                │                         │
//!   scratch <── retired value <──┴─────────────────────────┘
//! ```
//!
//! Three slots are owned at any time by exactly one party each: the
//! publisher's scratch slot, the pending slot, and the subscriber's current
//! slot. Publishing swaps the scratch slot into the pending position and
//! takes back whatever was pending (an unread value is simply overwritten on
//! the next publish). Updating swaps the subscriber's retired current slot
//! into the pending position, which is how the old value finds its way back
//! to the publisher for reuse. Neither side ever blocks, allocates, or frees
//! on the audio thread.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const INDEX_MASK: u8 = 0b011;
const FRESH_BIT: u8 = 0b100;

struct Shared<T> {
    slots: [UnsafeCell<T>; 3],
    /// Index of the pending slot, with `FRESH_BIT` set while it holds a
    /// value the subscriber has not taken yet.
    pending: AtomicU8,
}

// SAFETY: each slot index is owned by exactly one of {publisher, pending,
// subscriber} at a time; ownership moves only through the atomic swaps on
// `pending`, which carry AcqRel ordering so writes to a slot happen-before
// the new owner's reads.
unsafe impl<T: Send> Sync for Shared<T> {}

/// Write side of an updater channel. Owned by a single non-real-time thread.
pub struct Publisher<T> {
    shared: Arc<Shared<T>>,
    scratch: u8,
}

/// Read side of an updater channel. Owned by the audio thread.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
    current: u8,
}

/// Creates a connected publisher/subscriber pair. Every slot starts as a
/// clone of `initial`, so the subscriber always has a value to read.
pub fn updater<T: Clone>(initial: T) -> (Publisher<T>, Subscriber<T>) {
    let shared = Arc::new(Shared {
        slots: [
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial.clone()),
            UnsafeCell::new(initial),
        ],
        pending: AtomicU8::new(1),
    });
    (
        Publisher {
            shared: Arc::clone(&shared),
            scratch: 2,
        },
        Subscriber { shared, current: 0 },
    )
}

impl<T> Publisher<T> {
    /// The publisher-owned buffer. Holds a stale value (either an earlier
    /// publication or one the subscriber retired) until overwritten.
    #[inline]
    pub fn scratch(&mut self) -> &mut T {
        // SAFETY: the scratch slot is exclusively owned by the publisher.
        unsafe { &mut *self.shared.slots[self.scratch as usize].get() }
    }

    /// Hands the scratch buffer to the subscriber, replacing any value it
    /// has not read yet.
    #[inline]
    pub fn publish(&mut self) {
        let previous = self
            .shared
            .pending
            .swap(self.scratch | FRESH_BIT, Ordering::AcqRel);
        self.scratch = previous & INDEX_MASK;
    }

    /// Replaces the scratch contents with `value` and publishes it. The
    /// value being replaced is dropped here, on the publisher's thread.
    pub fn publish_value(&mut self, value: T) {
        *self.scratch() = value;
        self.publish();
    }

    /// Edits the scratch buffer in place, then publishes it. Use this to
    /// reuse the buffer's allocation.
    pub fn publish_with(&mut self, edit: impl FnOnce(&mut T)) {
        edit(self.scratch());
        self.publish();
    }

    /// True while the last published value has not been taken by the subscriber.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) & FRESH_BIT != 0
    }
}

impl<T> Subscriber<T> {
    /// Adopts the newest published value if there is one. Returns whether
    /// the current value changed. Never blocks.
    #[inline]
    pub fn update(&mut self) -> bool {
        if self.shared.pending.load(Ordering::Relaxed) & FRESH_BIT == 0 {
            return false;
        }
        let previous = self.shared.pending.swap(self.current, Ordering::AcqRel);
        self.current = previous & INDEX_MASK;
        true
    }

    #[inline]
    pub fn current(&self) -> &T {
        // SAFETY: the current slot is exclusively owned by the subscriber.
        unsafe { &*self.shared.slots[self.current as usize].get() }
    }

    /// Mutable access for state that must live with the value on the audio
    /// thread (filter histories, for instance).
    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        // SAFETY: as above; `&mut self` guarantees no other borrow.
        unsafe { &mut *self.shared.slots[self.current as usize].get() }
    }
}

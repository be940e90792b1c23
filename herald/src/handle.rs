//! Per-thread registration.
//!
//! A thread registers one slot the first time it reads and gives it back to
//! the registry when it exits. A read borrows that slot through a `Lease`;
//! a nested read on the same thread gets a spare slot of its own.

use crate::slot::{self, Slot};
use core::cell::Cell;
use core::marker::PhantomData;

/// Thread-local registration state.
struct Handle {
    /// The thread's own slot, registered lazily.
    slot: Cell<Option<&'static Slot>>,
    /// Whether the thread's slot is leased right now.
    busy: Cell<bool>,
}

impl Handle {
    const fn new() -> Self {
        Self {
            slot: Cell::new(None),
            busy: Cell::new(false),
        }
    }

    #[inline]
    fn lease(&self) -> Lease {
        if self.busy.get() {
            return Lease::spare();
        }

        let slot = match self.slot.get() {
            Some(slot) => slot,
            None => {
                let slot = slot::global().acquire();
                self.slot.set(Some(slot));
                slot
            }
        };
        self.busy.set(true);

        Lease {
            slot,
            kind: LeaseKind::Thread,
            _marker: PhantomData,
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // A lease still alive during teardown releases the slot itself.
        if self.busy.get() {
            return;
        }
        if let Some(slot) = self.slot.take() {
            slot::global().release(slot);
        }
    }
}

thread_local! {
    static HANDLE: Handle = const { Handle::new() };
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LeaseKind {
    /// The thread's registered slot.
    Thread,
    /// A slot taken from the registry for this lease only.
    Spare,
}

/// Exclusive use of one announce slot for the duration of a read.
///
/// The slot is cleared when the lease ends. Leases cannot leave the thread
/// that took them.
pub(crate) struct Lease {
    slot: &'static Slot,
    kind: LeaseKind,
    _marker: PhantomData<*mut ()>,
}

impl Lease {
    fn spare() -> Self {
        Lease {
            slot: slot::global().acquire(),
            kind: LeaseKind::Spare,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn slot(&self) -> &Slot {
        self.slot
    }
}

impl Drop for Lease {
    #[inline]
    fn drop(&mut self) {
        self.slot.clear();
        match self.kind {
            LeaseKind::Thread => {
                if HANDLE.try_with(|handle| handle.busy.set(false)).is_err() {
                    slot::global().release(self.slot);
                }
            }
            LeaseKind::Spare => slot::global().release(self.slot),
        }
    }
}

/// Lease a slot for the calling thread.
///
/// Falls back to a spare slot while the thread-local handle is being torn
/// down, so reads issued from other thread-local destructors stay protected.
#[inline]
pub(crate) fn lease() -> Lease {
    HANDLE
        .try_with(|handle| handle.lease())
        .unwrap_or_else(|_| Lease::spare())
}

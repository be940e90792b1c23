//! Announce slots and the registry that owns them.
//!
//! Every participating thread leases one `Slot` and writes into it the address
//! of the version it is about to read. Reclaiming threads scan the registry
//! and refuse to free an address while any slot still announces it.
//!
//! Slots are never freed while the registry lives. Released slots are
//! recycled by the next thread that registers, so the list length is bounded
//! by the peak number of concurrently participating threads.

use alloc::boxed::Box;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;
use once_cell::race::OnceBox;

/// One announce cell. Padded to its own cache line so that readers pinned to
/// different cores do not invalidate each other on every announcement.
pub(crate) struct Slot {
    /// Address of the version being read, null when not reading.
    announced: AtomicPtr<()>,
    /// Whether some thread currently leases this slot.
    in_use: AtomicBool,
    /// Next slot in the registry. Written once, before the slot is published.
    next: AtomicPtr<CachePadded<Slot>>,
}

impl Slot {
    fn leased() -> Self {
        Self {
            announced: AtomicPtr::new(ptr::null_mut()),
            in_use: AtomicBool::new(true),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish `addr` as the version this slot's owner is reading.
    #[inline]
    pub(crate) fn announce(&self, addr: *const ()) {
        self.announced.store(addr as *mut (), Ordering::SeqCst);
    }

    /// Mark the owner as not reading.
    #[inline]
    pub(crate) fn clear(&self) {
        self.announced.store(ptr::null_mut(), Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn announced(&self) -> *const () {
        self.announced.load(Ordering::SeqCst)
    }
}

/// Append-only list of announce slots.
pub(crate) struct Registry {
    head: AtomicPtr<CachePadded<Slot>>,
    registered: AtomicUsize,
}

impl Registry {
    pub(crate) const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            registered: AtomicUsize::new(0),
        }
    }

    /// Lease a slot, recycling a released one when possible.
    pub(crate) fn acquire(&self) -> &Slot {
        for slot in self.iter() {
            if !slot.in_use.load(Ordering::Relaxed)
                && slot
                    .in_use
                    .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
            {
                return slot;
            }
        }

        let node = Box::into_raw(Box::new(CachePadded::new(Slot::leased())));
        // SAFETY: freshly allocated, and freed only by the registry's drop.
        let slot: &CachePadded<Slot> = unsafe { &*node };
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            // Not reachable by other threads until the CAS succeeds.
            slot.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange_weak(head, node, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }

        let count = self.registered.fetch_add(1, Ordering::Relaxed) + 1;
        log::trace!("registered announce slot #{count}");

        slot
    }

    /// Return a slot to the registry. The slot must not be used afterwards
    /// by the releasing thread.
    pub(crate) fn release(&self, slot: &Slot) {
        slot.clear();
        slot.in_use.store(false, Ordering::Release);
    }

    /// Whether any slot currently announces `addr`.
    pub(crate) fn is_announced(&self, addr: *const ()) -> bool {
        self.iter().any(|slot| slot.announced() == addr)
    }

    /// Number of slots ever registered (leased or not).
    pub(crate) fn len(&self) -> usize {
        self.registered.load(Ordering::Relaxed)
    }

    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head.load(Ordering::Acquire),
            _registry: self,
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            // SAFETY: exclusive access, every node came from Box::into_raw.
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next.load(Ordering::Relaxed);
        }
    }
}

pub(crate) struct Iter<'a> {
    next: *const CachePadded<Slot>,
    _registry: &'a Registry,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Slot;

    fn next(&mut self) -> Option<&'a Slot> {
        if self.next.is_null() {
            return None;
        }
        // SAFETY: nodes reachable from the head stay allocated for the
        // registry's lifetime, which outlives 'a.
        let slot: &'a Slot = unsafe { &*self.next };
        self.next = slot.next.load(Ordering::Acquire);
        Some(slot)
    }
}

/// Process-wide registry.
static GLOBAL: OnceBox<Registry> = OnceBox::new();

#[inline]
pub(crate) fn global() -> &'static Registry {
    GLOBAL.get_or_init(|| Box::new(Registry::new()))
}

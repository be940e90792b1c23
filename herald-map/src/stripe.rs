//! Lock striping for writers.
//!
//! A fixed number of TTAS (test-test-and-set) locks, each on its own cache
//! line. A key's stripe is `hash & (stripes - 1)`. The stripe count never
//! exceeds the bucket count of any table and both are powers of two, so keys
//! sharing a bucket always share a stripe.

use core::sync::atomic::{AtomicBool, Ordering};
use crossbeam_utils::{Backoff, CachePadded};

/// One TTAS lock.
struct Stripe {
    acquired: AtomicBool,
}

impl Stripe {
    const fn new() -> Self {
        Self {
            acquired: AtomicBool::new(false),
        }
    }

    #[inline]
    fn lock(&self) -> StripeGuard<'_> {
        let backoff = Backoff::new();
        loop {
            // Test phase: spin on relaxed load (stays in cache)
            while self.acquired.load(Ordering::Relaxed) {
                backoff.snooze();
            }
            // Test-and-set phase: attempt to acquire
            if !self.acquired.swap(true, Ordering::Acquire) {
                return StripeGuard { stripe: self };
            }
        }
    }
}

/// RAII guard for one stripe. Releases the lock on drop.
pub(crate) struct StripeGuard<'a> {
    stripe: &'a Stripe,
}

impl Drop for StripeGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.stripe.acquired.store(false, Ordering::Release);
    }
}

/// A fixed set of writer locks.
pub(crate) struct StripedLocks {
    stripes: Box<[CachePadded<Stripe>]>,
    mask: usize,
}

impl StripedLocks {
    /// Creates `count` stripes, rounded up to a power of two, minimum 1.
    pub(crate) fn new(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        let mut stripes = Vec::with_capacity(count);
        for _ in 0..count {
            stripes.push(CachePadded::new(Stripe::new()));
        }

        Self {
            stripes: stripes.into_boxed_slice(),
            mask: count - 1,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.stripes.len()
    }

    #[inline(always)]
    pub(crate) fn index(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    /// Locks the stripe guarding `hash`.
    #[inline]
    pub(crate) fn lock(&self, hash: u64) -> StripeGuard<'_> {
        self.stripes[self.index(hash)].lock()
    }

    /// Locks every stripe in ascending order.
    ///
    /// The fixed order keeps two callers of `lock_all` from deadlocking.
    pub(crate) fn lock_all(&self) -> Vec<StripeGuard<'_>> {
        self.stripes.iter().map(|stripe| stripe.lock()).collect()
    }
}

//! The swappable owning reference and its read/retire handles.

use crate::handle::{self, Lease};
use crate::slot;
use alloc::boxed::Box;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, Ordering};
use crossbeam_utils::Backoff;

/// An atomic, owning reference to the current version of a `T`.
///
/// Readers go through [`Current::announce`], which publishes the version they
/// hold in the calling thread's announce slot. Writers replace the version
/// with [`Current::swap`] and get back a [`Retired`] handle that frees the old
/// version only once no slot announces it anymore.
///
/// # Examples
///
/// ```
/// use herald::Current;
///
/// let cell = Current::new(vec![1, 2, 3]);
/// {
///     let v = cell.announce();
///     assert_eq!(v.len(), 3);
/// }
/// let old = cell.swap(Box::new(vec![4]));
/// old.reclaim();
/// assert_eq!(cell.announce()[0], 4);
/// ```
pub struct Current<T> {
    ptr: AtomicPtr<T>,
    _owns: PhantomData<Box<T>>,
}

// Safety: the cell owns a `Box<T>`; moving it moves the box.
unsafe impl<T: Send> Send for Current<T> {}

// Safety: shared access hands out `&T` to many threads and lets any of them
// swap in a new value, so `T` must be both `Send` and `Sync`.
unsafe impl<T: Send + Sync> Sync for Current<T> {}

impl<T> Current<T> {
    /// Creates a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Creates a cell that takes ownership of an existing allocation.
    pub fn from_box(value: Box<T>) -> Self {
        Self {
            ptr: AtomicPtr::new(Box::into_raw(value)),
            _owns: PhantomData,
        }
    }

    /// Takes a stable snapshot of the current version.
    ///
    /// Loads the current reference, announces it, and re-loads until the
    /// announced value is still current. A version observed this way cannot
    /// be freed until the returned guard is dropped.
    pub fn announce(&self) -> Announced<'_, T> {
        let lease = handle::lease();
        let mut ptr = self.ptr.load(Ordering::SeqCst);
        loop {
            lease.slot().announce(ptr as *const ());
            let again = self.ptr.load(Ordering::SeqCst);
            if again == ptr {
                break;
            }
            ptr = again;
        }

        Announced {
            // SAFETY: the cell never holds null, and the announcement keeps
            // the pointee alive for the guard's lifetime.
            value: unsafe { &*ptr },
            _lease: lease,
        }
    }

    /// Returns the current version without announcing it.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no [`Current::swap`] can run while the
    /// returned reference is alive, e.g. by holding a lock every swapper must
    /// also hold.
    #[inline]
    pub unsafe fn get_unchecked(&self) -> &T {
        // SAFETY: non-null by construction, kept alive by the caller's
        // exclusion of swaps.
        unsafe { &*self.ptr.load(Ordering::SeqCst) }
    }

    /// Mutable access; exclusive borrow rules out concurrent readers.
    pub fn get_mut(&mut self) -> &mut T {
        // SAFETY: non-null by construction and uniquely borrowed.
        unsafe { &mut **self.ptr.get_mut() }
    }

    /// Publishes `next` as the current version and returns the previous one.
    ///
    /// The previous version may still be in use by readers that announced it
    /// before the swap; dropping the returned [`Retired`] waits for them.
    pub fn swap(&self, next: Box<T>) -> Retired<T> {
        let prev = self.ptr.swap(Box::into_raw(next), Ordering::SeqCst);
        Retired {
            // SAFETY: the cell never holds null.
            ptr: unsafe { NonNull::new_unchecked(prev) },
            _owns: PhantomData,
        }
    }

    /// Consumes the cell and returns the current version.
    pub fn into_inner(self) -> Box<T> {
        let ptr = self.ptr.load(Ordering::Relaxed);
        core::mem::forget(self);
        // SAFETY: ownership moves out of the forgotten cell.
        unsafe { Box::from_raw(ptr) }
    }
}

impl<T> Drop for Current<T> {
    fn drop(&mut self) {
        // SAFETY: guards borrow the cell, so none can be alive here.
        unsafe { drop(Box::from_raw(*self.ptr.get_mut())) };
    }
}

impl<T: fmt::Debug> fmt::Debug for Current<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Current").field(&*self.announce()).finish()
    }
}

/// A read snapshot of a [`Current`] version.
///
/// Keeps the version announced in the thread's slot and clears the slot on
/// drop.
pub struct Announced<'a, T> {
    value: &'a T,
    _lease: Lease,
}

impl<T> Deref for Announced<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Announced<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.value, f)
    }
}

/// A version that has been swapped out of a [`Current`].
///
/// It is no longer reachable by new readers, but readers that announced it
/// before the swap may still be traversing it. It is freed only after every
/// announce slot has moved away from it.
pub struct Retired<T> {
    ptr: NonNull<T>,
    _owns: PhantomData<Box<T>>,
}

// Safety: a retired version is uniquely owned by this handle.
unsafe impl<T: Send> Send for Retired<T> {}
unsafe impl<T: Sync> Sync for Retired<T> {}

impl<T> Retired<T> {
    /// Whether some reader still announces this version.
    pub fn is_announced(&self) -> bool {
        slot::global().is_announced(self.addr())
    }

    /// Frees the version if no reader announces it, otherwise hands it back.
    pub fn try_reclaim(self) -> Result<(), Self> {
        if self.is_announced() {
            return Err(self);
        }
        let ptr = self.ptr.as_ptr();
        core::mem::forget(self);
        // SAFETY: unannounced and unreachable from the cell, so no reader
        // can observe it again.
        unsafe { drop(Box::from_raw(ptr)) };
        Ok(())
    }

    /// Waits until no reader announces this version, then frees it.
    #[inline]
    pub fn reclaim(self) {
        drop(self);
    }

    /// Waits until no reader announces this version, then returns it.
    pub fn into_inner(self) -> Box<T> {
        self.wait();
        let ptr = self.ptr.as_ptr();
        core::mem::forget(self);
        // SAFETY: see `try_reclaim`.
        unsafe { Box::from_raw(ptr) }
    }

    #[inline]
    fn addr(&self) -> *const () {
        self.ptr.as_ptr() as *const ()
    }

    fn wait(&self) {
        let backoff = Backoff::new();
        let mut rounds = 0usize;
        while self.is_announced() {
            backoff.snooze();
            rounds += 1;
        }
        if rounds > 0 {
            log::trace!("retired version {:p} waited {rounds} rounds for readers", self.addr());
        }
    }
}

impl<T> Drop for Retired<T> {
    fn drop(&mut self) {
        self.wait();
        // SAFETY: no slot announces the version and it is unreachable from
        // the cell it was swapped out of.
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
    }
}

impl<T> fmt::Debug for Retired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retired")
            .field("addr", &self.addr())
            .finish_non_exhaustive()
    }
}

//! Growable concurrent map over a swappable [`FixedTable`].
//!
//! # Architecture
//! - **Readers** (`contains_key`, `get`, `len`, `keys`, ...) take an announced
//!   snapshot of the current table and never lock.
//! - **Writers** lock one of a fixed number of stripes, chosen by key hash,
//!   and append to the current table in place.
//! - **Growth** locks every stripe, copies all pairs into a table with twice
//!   the buckets, publishes it, unlocks, then waits until no reader announces
//!   the old table before freeing it.

use crate::error::Result;
use crate::fixed::{DEFAULT_BUCKETS, FixedTable};
use crate::stripe::StripedLocks;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::sync::atomic::Ordering;
use foldhash::fast::FixedState;
use herald::Current;
use portable_atomic::AtomicU64;

/// Default number of writer lock stripes
const DEFAULT_LOCK_SLOTS: usize = 64;

/// Concurrent hash map with lock-striped writers and lock-free readers.
///
/// Inserting a key that is already present is a no-op: the first value
/// written for a key is the one every later reader sees. The map grows by
/// doubling its bucket count once it is more than half full.
///
/// The hash builder is cloned into every new table, so clones of `S` must
/// hash identically (true of `FixedState` and `RandomState`).
///
/// # Examples
///
/// ```
/// use herald_map::{ConcurrentMap, Error};
/// use std::sync::Arc;
/// use std::thread;
///
/// let map = Arc::new(ConcurrentMap::with_capacity_and_locks(8, 4));
///
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.insert(t * 100 + i, i);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.get(&250), Ok(50));
/// assert_eq!(map.get(&999), Err(Error::KeyNotFound));
/// ```
pub struct ConcurrentMap<K, V, S = FixedState> {
    table: Current<FixedTable<K, V, S>>,
    locks: StripedLocks,
    resizes: AtomicU64,
}

impl<K, V> ConcurrentMap<K, V, FixedState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates an empty map with 64 buckets and 64 lock stripes.
    pub fn new() -> Self {
        Self::with_capacity_and_locks(DEFAULT_BUCKETS, DEFAULT_LOCK_SLOTS)
    }

    /// Creates an empty map with `buckets` initial buckets.
    ///
    /// The stripe count defaults to 64, clamped to the bucket count.
    pub fn with_capacity(buckets: usize) -> Self {
        Self::with_capacity_and_locks(buckets, DEFAULT_LOCK_SLOTS)
    }

    /// Creates an empty map with the given initial bucket and stripe counts.
    ///
    /// Both are rounded up to a power of two; the stripe count is then
    /// clamped to the bucket count.
    pub fn with_capacity_and_locks(buckets: usize, lock_slots: usize) -> Self {
        Self::with_capacity_locks_and_hasher(buckets, lock_slots, FixedState::default())
    }
}

impl<K, V, S> ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Creates an empty map with default sizes and the given hasher.
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_locks_and_hasher(DEFAULT_BUCKETS, DEFAULT_LOCK_SLOTS, hasher)
    }

    /// Creates an empty map with the given sizes and hasher.
    pub fn with_capacity_locks_and_hasher(buckets: usize, lock_slots: usize, hasher: S) -> Self {
        let table = FixedTable::with_capacity_and_hasher(buckets, hasher);
        let lock_slots = lock_slots
            .max(1)
            .next_power_of_two()
            .min(table.bucket_count());

        Self {
            table: Current::new(table),
            locks: StripedLocks::new(lock_slots),
            resizes: AtomicU64::new(0),
        }
    }

    /// Returns true if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.announce().contains_key(key)
    }

    /// Returns a copy of the value stored for `key`.
    ///
    /// Fails with [`Error::KeyNotFound`](crate::Error::KeyNotFound) if absent.
    pub fn get<Q>(&self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.announce().get(key).cloned()
    }

    /// Inserts a pair unless `key` is already present.
    ///
    /// Returns `true` if the pair was stored. A duplicate key leaves the
    /// existing value untouched and returns `false`. May grow the table
    /// first if it is more than half full.
    pub fn insert(&self, key: K, value: V) -> bool {
        // The snapshot must be released before growing: growth waits for
        // every announcement of the old table, including our own.
        let overloaded = self.table.announce().is_overloaded();
        if overloaded {
            self.grow();
        }

        let hash = {
            let table = self.table.announce();
            let hash = table.hash_key(&key);
            if table.contains_hashed(hash, &key) {
                return false;
            }
            hash
        };

        let _stripe = self.locks.lock(hash);
        // SAFETY: growth holds every stripe while it swaps tables, so the
        // current table cannot be replaced or freed while we hold one.
        let table = unsafe { self.table.get_unchecked() };
        // SAFETY: every table is built from clones of one hasher, so `hash`
        // is valid for it; keys of one bucket share our stripe, so no other
        // writer touches this chain.
        unsafe { table.insert_shared(hash, key, value) }
    }

    /// Doubles the bucket count if the table is still more than half full.
    fn grow(&self) {
        let stripes = self.locks.lock_all();
        // SAFETY: all stripes are held, no other swap can run.
        let table = unsafe { self.table.get_unchecked() };
        if !table.is_overloaded() {
            log::trace!("resize skipped: another writer already grew the table");
            return;
        }

        let old_buckets = table.bucket_count();
        let mut next = FixedTable::with_capacity_and_hasher(old_buckets * 2, table.hasher().clone());
        let keys = table.keys();
        let values = table.values();
        log::debug!(
            "resizing {} entries from {} to {} buckets",
            keys.len(),
            old_buckets,
            next.bucket_count()
        );
        for (key, value) in keys.into_iter().zip(values) {
            next.insert(key, value);
        }

        let new_buckets = next.bucket_count();
        let retired = self.table.swap(Box::new(next));
        drop(stripes);

        retired.reclaim();
        let resizes = self.resizes.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!("resize #{resizes} complete: {new_buckets} buckets");
    }
}

impl<K, V, S> ConcurrentMap<K, V, S> {
    /// Number of pairs in the current table.
    pub fn len(&self) -> usize {
        self.table.announce().len()
    }

    /// Whether the map holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets in the current table.
    pub fn bucket_count(&self) -> usize {
        self.table.announce().bucket_count()
    }

    /// Number of writer lock stripes. Fixed at construction.
    pub fn lock_slots(&self) -> usize {
        self.locks.len()
    }

    /// Number of completed resizes.
    pub fn resize_count(&self) -> u64 {
        self.resizes.load(Ordering::Relaxed)
    }

    /// Snapshot of all keys, taken from one table version.
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.table.announce().keys()
    }

    /// Snapshot of all values, taken from one table version.
    ///
    /// Index-aligned with [`ConcurrentMap::keys`] only when no insert runs in
    /// between; use [`ConcurrentMap::entries`] for a paired snapshot.
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.table.announce().values()
    }

    /// Snapshot of all pairs, taken from one table version.
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.table.announce().entries()
    }

    /// Consumes the map and returns its current table.
    pub fn into_table(self) -> FixedTable<K, V, S> {
        *self.table.into_inner()
    }
}

impl<K, V> Default for ConcurrentMap<K, V, FixedState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Extend<(K, V)> for ConcurrentMap<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ConcurrentMap<K, V, FixedState>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S> fmt::Debug for ConcurrentMap<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.announce();
        f.debug_struct("ConcurrentMap")
            .field("len", &table.len())
            .field("bucket_count", &table.bucket_count())
            .field("lock_slots", &self.locks.len())
            .finish()
    }
}

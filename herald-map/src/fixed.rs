//! Fixed-capacity separate-chaining hash table.
//!
//! The bucket count never changes for the lifetime of a table; growing means
//! building a new table. Each bucket is a singly linked chain of entries,
//! appended at the tail so chains keep their insertion order. Entries are
//! never mutated or unlinked once published, which is what lets readers walk
//! a chain while a writer appends to it.

use crate::error::{Error, Result};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use foldhash::fast::FixedState;

/// Default number of buckets
pub(crate) const DEFAULT_BUCKETS: usize = 64;

/// Node in a bucket chain.
/// `hash` sits first so mismatches are rejected before comparing keys.
struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
    next: AtomicPtr<Entry<K, V>>,
}

/// A hash table with a fixed number of buckets.
///
/// The bucket count is a power of two, so the bucket of a key is
/// `hash & (bucket_count - 1)`. Each key is stored at most once; inserting a
/// key that is already present leaves the first value in place.
///
/// # Examples
///
/// ```
/// use herald_map::FixedTable;
///
/// let mut table = FixedTable::with_capacity(8);
/// assert!(table.insert("a", 1));
/// assert!(!table.insert("a", 2));
/// assert_eq!(table.get(&"a"), Ok(&1));
/// assert_eq!(table.bucket_count(), 8);
/// ```
pub struct FixedTable<K, V, S = FixedState> {
    buckets: Box<[AtomicPtr<Entry<K, V>>]>,
    mask: usize,
    len: AtomicUsize,
    hasher: S,
}

impl<K, V> FixedTable<K, V, FixedState>
where
    K: Hash + Eq,
{
    /// Creates an empty table with the default bucket count (64).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUCKETS)
    }

    /// Creates an empty table with `buckets` buckets, rounded up to a power of two.
    pub fn with_capacity(buckets: usize) -> Self {
        Self::with_capacity_and_hasher(buckets, FixedState::default())
    }
}

impl<K, V, S> FixedTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates an empty table with the given bucket count and hasher.
    ///
    /// The bucket count is rounded up to the next power of two, minimum 1.
    pub fn with_capacity_and_hasher(buckets: usize, hasher: S) -> Self {
        let buckets = buckets.max(1).next_power_of_two();
        let mut chains = Vec::with_capacity(buckets);
        for _ in 0..buckets {
            chains.push(AtomicPtr::new(ptr::null_mut()));
        }

        Self {
            buckets: chains.into_boxed_slice(),
            mask: buckets - 1,
            len: AtomicUsize::new(0),
            hasher,
        }
    }

    #[inline(always)]
    pub(crate) fn hash_key<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.hasher.hash_one(key)
    }

    #[inline(always)]
    fn bucket(&self, hash: u64) -> &AtomicPtr<Entry<K, V>> {
        // SAFETY: masked index is always in bounds.
        unsafe { self.buckets.get_unchecked((hash as usize) & self.mask) }
    }

    /// Walks the chain for `hash` and returns the matching entry.
    #[inline]
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let mut current = self.bucket(hash).load(Ordering::Acquire);
        while !current.is_null() {
            // SAFETY: published entries live until the table is dropped.
            let entry = unsafe { &*current };
            if entry.hash == hash && entry.key.borrow() == key {
                return Some(entry);
            }
            current = entry.next.load(Ordering::Acquire);
        }
        None
    }

    /// Returns true if the table contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.contains_hashed(self.hash_key(key), key)
    }

    #[inline]
    pub(crate) fn contains_hashed<Q>(&self, hash: u64, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.find(hash, key).is_some()
    }

    /// Returns the value stored for `key`.
    ///
    /// Fails with [`Error::KeyNotFound`] if the chain holds no such key.
    pub fn get<Q>(&self, key: &Q) -> Result<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(self.hash_key(key), key)
            .map(|entry| &entry.value)
            .ok_or(Error::KeyNotFound)
    }

    /// Inserts a pair. Returns `false` and drops the pair if `key` is
    /// already present; the stored value is never overwritten.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_key(&key);
        // SAFETY: `&mut self` excludes every other writer.
        unsafe { self.insert_shared(hash, key, value) }
    }

    /// Inserts a pair through a shared reference.
    ///
    /// Readers may run concurrently: a new entry is fully built before it is
    /// linked with a release store.
    ///
    /// # Safety
    ///
    /// No other thread may insert into the bucket of `hash` at the same time,
    /// and `hash` must be `self.hash_key(&key)`.
    pub(crate) unsafe fn insert_shared(&self, hash: u64, key: K, value: V) -> bool {
        let mut link = self.bucket(hash);
        loop {
            let current = link.load(Ordering::Acquire);
            if current.is_null() {
                break;
            }
            // SAFETY: published entries live until the table is dropped.
            let entry = unsafe { &*current };
            if entry.hash == hash && entry.key == key {
                return false;
            }
            link = &entry.next;
        }

        let entry = Box::into_raw(Box::new(Entry {
            hash,
            key,
            value,
            next: AtomicPtr::new(ptr::null_mut()),
        }));
        link.store(entry, Ordering::Release);
        self.len.fetch_add(1, Ordering::Release);
        true
    }
}

impl<K, V, S> FixedTable<K, V, S> {
    /// Number of key/value pairs stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the table holds no pairs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets. Fixed for the table's lifetime.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns a reference to the table's hash builder.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Whether the load factor has passed one half (`2 * len > bucket_count`).
    #[inline]
    pub fn is_overloaded(&self) -> bool {
        2 * self.len() > self.bucket_count()
    }

    /// Iterates over all pairs, bucket by bucket, in chain order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: &self.buckets,
            index: 0,
            current: ptr::null(),
        }
    }

    /// Snapshot of all keys, index-aligned with [`FixedTable::values`].
    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        let mut keys = Vec::with_capacity(self.len.load(Ordering::Acquire));
        keys.extend(self.iter().map(|(k, _)| k.clone()));
        keys
    }

    /// Snapshot of all values, index-aligned with [`FixedTable::keys`].
    pub fn values(&self) -> Vec<V>
    where
        V: Clone,
    {
        let mut values = Vec::with_capacity(self.len.load(Ordering::Acquire));
        values.extend(self.iter().map(|(_, v)| v.clone()));
        values
    }

    /// Snapshot of all pairs in the same order as [`FixedTable::keys`].
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let mut entries = Vec::with_capacity(self.len.load(Ordering::Acquire));
        entries.extend(self.iter().map(|(k, v)| (k.clone(), v.clone())));
        entries
    }
}

impl<K, V> Default for FixedTable<K, V, FixedState>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Drop for FixedTable<K, V, S> {
    fn drop(&mut self) {
        for bucket in self.buckets.iter_mut() {
            let mut current = *bucket.get_mut();
            while !current.is_null() {
                // SAFETY: exclusive access; every entry came from Box::into_raw
                // and is linked exactly once.
                let mut entry = unsafe { Box::from_raw(current) };
                current = *entry.next.get_mut();
            }
        }
    }
}

impl<K, V, S> Extend<(K, V)> for FixedTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for FixedTable<K, V, FixedState>
where
    K: Hash + Eq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl<'a, K, V, S> IntoIterator for &'a FixedTable<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S> fmt::Debug for FixedTable<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// Safety: the table owns its entries; moving it moves them.
unsafe impl<K: Send, V: Send, S: Send> Send for FixedTable<K, V, S> {}

// Safety: shared access hands out `&K`/`&V` and lets a writer move new pairs
// in through `insert_shared`, so the pairs must be both `Send` and `Sync`.
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for FixedTable<K, V, S> {}

/// Iterator over the pairs of a [`FixedTable`].
pub struct Iter<'a, K, V> {
    buckets: &'a [AtomicPtr<Entry<K, V>>],
    index: usize,
    current: *const Entry<K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.current.is_null() {
            let bucket = self.buckets.get(self.index)?;
            self.current = bucket.load(Ordering::Acquire);
            self.index += 1;
        }
        // SAFETY: published entries live as long as the borrowed table.
        let entry: &'a Entry<K, V> = unsafe { &*self.current };
        self.current = entry.next.load(Ordering::Acquire);
        Some((&entry.key, &entry.value))
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

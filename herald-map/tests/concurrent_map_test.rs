use herald_map::{ConcurrentMap, Error};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn test_insert_and_get() {
    let map = ConcurrentMap::new();
    assert!(map.insert("a", 1));
    assert!(map.insert("b", 2));
    assert_eq!(map.get(&"a"), Ok(1));
    assert_eq!(map.get(&"b"), Ok(2));
    assert_eq!(map.get(&"c"), Err(Error::KeyNotFound));
}

#[test]
fn test_first_insert_wins() {
    let map = ConcurrentMap::new();
    assert!(map.insert(1, 10));
    assert!(!map.insert(1, 20));
    assert!(!map.insert(1, 30));
    assert_eq!(map.get(&1), Ok(10));
}

#[test]
fn test_first_insert_wins_across_resizes() {
    let map = ConcurrentMap::with_capacity_and_locks(2, 2);
    for i in 0..500 {
        map.insert(i, i);
    }
    for i in 0..500 {
        assert!(!map.insert(i, i + 1));
    }
    for i in 0..500 {
        assert_eq!(map.get(&i), Ok(i));
    }
}

#[test]
fn test_len_counts_distinct_keys() {
    let map = ConcurrentMap::new();
    assert!(map.is_empty());
    for i in 0..100 {
        map.insert(i % 37, i);
    }
    assert_eq!(map.len(), 37);
    assert!(!map.is_empty());
}

#[test]
fn test_string_keys_borrowed_lookup() {
    let map = ConcurrentMap::new();
    map.insert("hello".to_string(), 1);
    map.insert("world".to_string(), 2);
    assert!(map.contains_key("hello"));
    assert_eq!(map.get("world"), Ok(2));
    assert_eq!(map.get("nope"), Err(Error::KeyNotFound));
}

#[test]
fn test_example_scenario_eight_buckets() {
    let map = ConcurrentMap::with_capacity(8);
    for i in 0..5u32 {
        map.insert(i, i * 100);
    }
    assert_eq!(map.bucket_count(), 8);

    // The next insert sees 2 * 5 > 8 and doubles first.
    map.insert(5, 500);
    assert_eq!(map.bucket_count(), 16);
    for i in 0..6u32 {
        assert_eq!(map.get(&i), Ok(i * 100));
    }
}

#[test]
fn test_resize_preserves_pairs() {
    let map = ConcurrentMap::with_capacity_and_locks(4, 4);
    for i in 0..3 {
        map.insert(i, i * 7);
    }
    let mut before = map.entries();
    before.sort();

    for i in 3..1000 {
        map.insert(i, i * 7);
    }
    assert!(map.resize_count() > 0);
    assert!(map.bucket_count() >= map.len());

    let after: HashSet<_> = map.entries().into_iter().collect();
    for pair in &before {
        assert!(after.contains(pair));
    }
    assert_eq!(after.len(), 1000);
}

#[test]
fn test_keys_values_snapshot_aligned() {
    let map = ConcurrentMap::with_capacity(16);
    for i in 0..200u64 {
        map.insert(i, i * 3);
    }
    let keys = map.keys();
    let values = map.values();
    assert_eq!(keys.len(), map.len());
    assert_eq!(values.len(), map.len());
    for (k, v) in keys.iter().zip(values.iter()) {
        assert_eq!(*v, k * 3);
    }

    let unique: HashSet<_> = keys.into_iter().collect();
    assert_eq!(unique.len(), 200);
}

#[test]
fn test_shuffled_inserts_match_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut keys: Vec<u32> = (0..5000).collect();
    keys.shuffle(&mut rng);

    let map = ConcurrentMap::with_capacity_and_locks(1, 1);
    let mut model = std::collections::HashMap::new();
    for &k in &keys {
        let v: u32 = rng.r#gen();
        let stored = map.insert(k, v);
        assert_eq!(stored, !model.contains_key(&k));
        model.entry(k).or_insert(v);

        // Re-insert a random earlier key; must be rejected.
        let dup = keys[rng.gen_range(0..keys.len())];
        if model.contains_key(&dup) {
            assert!(!map.insert(dup, 0));
        }
    }

    assert_eq!(map.len(), model.len());
    for (k, v) in &model {
        assert_eq!(map.get(k), Ok(*v));
    }
}

#[test]
fn test_values_dropped_exactly_once() {
    let marker = Arc::new(());
    {
        let map = ConcurrentMap::with_capacity_and_locks(2, 2);
        for i in 0..300 {
            map.insert(i, Arc::clone(&marker));
        }
        // Rejected duplicates are dropped right away.
        for i in 0..300 {
            map.insert(i, Arc::clone(&marker));
        }
        assert_eq!(Arc::strong_count(&marker), 301);
    }
    assert_eq!(Arc::strong_count(&marker), 1);
}

#[test]
fn test_extend_and_collect() {
    let mut map: ConcurrentMap<i32, i32> = (0..10).map(|i| (i, -i)).collect();
    map.extend((5..20).map(|i| (i, i)));
    assert_eq!(map.len(), 20);
    assert_eq!(map.get(&7), Ok(-7));
    assert_eq!(map.get(&15), Ok(15));
}

#[test]
fn test_custom_hasher() {
    use std::collections::hash_map::RandomState;

    let map = ConcurrentMap::with_capacity_locks_and_hasher(4, 2, RandomState::new());
    for i in 0..100 {
        map.insert(i, i.to_string());
    }
    for i in 0..100 {
        assert_eq!(map.get(&i), Ok(i.to_string()));
    }
}

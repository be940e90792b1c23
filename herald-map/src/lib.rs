//! Resizable concurrent hash map built on announce-slot reclamation
//!
//! This crate provides two layers:
//!
//! - [`FixedTable`]: a separate-chaining hash table whose bucket count never
//!   changes. No synchronization of its own for writers.
//! - [`ConcurrentMap`]: owns one `FixedTable` at a time behind a
//!   [`herald::Current`] cell. Writers serialize on a fixed set of lock
//!   stripes; readers take an announced snapshot and never lock. When the
//!   table passes half full it is copied into one with twice the buckets,
//!   and the old table is freed once no reader announces it.
//!
//! # Features
//!
//! - **Lock-Free Reads**: lookups only spin while a table swap races them
//! - **Lock Striping**: writer locks are fixed in number, independent of size
//! - **First Writer Wins**: a key's value is never overwritten
//! - **Safe Reclamation**: retired tables outlive every reader that saw them
//!
//! # Example
//!
//! ```rust
//! use herald_map::ConcurrentMap;
//!
//! let map = ConcurrentMap::new();
//!
//! map.insert(42, "hello");
//! map.insert(42, "ignored");
//! map.insert(100, "world");
//!
//! assert_eq!(map.get(&42), Ok("hello"));
//! assert!(map.contains_key(&100));
//! assert_eq!(map.len(), 2);
//! ```

#![warn(missing_docs)]

mod error;
mod fixed;
mod map;
mod stripe;

pub use error::{Error, Result};
pub use fixed::{FixedTable, Iter};
pub use map::ConcurrentMap;

//! Herald: announce-slot memory reclamation for read-mostly shared versions.
//!
//! A [`Current`] holds the one live version of some value. Readers take a
//! snapshot with [`Current::announce`], which writes the address they are
//! about to read into a per-thread announce slot. A writer replaces the
//! version with [`Current::swap`] and receives a [`Retired`] handle; the old
//! version is freed only after no announce slot references it.
//!
//! # Key Features
//!
//! - **Lock-Free Reads**: announcing is a store plus a re-check, never a lock
//! - **Registration-Based Slots**: threads register a slot on first use and
//!   hand it back on exit, no fixed thread limit
//! - **Padded Slots**: each slot sits on its own cache line
//! - **Safe by Construction**: dropping a [`Retired`] waits for readers
//!
//! # Example
//!
//! ```rust
//! use herald::Current;
//!
//! let table = Current::new(vec![0u64; 8]);
//!
//! // Read with a stable snapshot.
//! let snapshot = table.announce();
//! assert_eq!(snapshot.len(), 8);
//! drop(snapshot);
//!
//! // Publish a larger version and free the old one once readers are gone.
//! let retired = table.swap(Box::new(vec![0u64; 16]));
//! retired.reclaim();
//! ```

#![warn(missing_docs)]

extern crate alloc;

mod cell;
mod handle;
mod slot;

pub use cell::{Announced, Current, Retired};

/// Whether any thread currently announces `ptr`.
pub fn is_announced<T>(ptr: *const T) -> bool {
    slot::global().is_announced(ptr as *const ())
}

/// Number of announce slots registered so far in this process.
///
/// Slots are recycled when threads exit, so this tracks the peak number of
/// concurrently reading threads rather than the total ever spawned.
pub fn registered_slots() -> usize {
    slot::global().len()
}

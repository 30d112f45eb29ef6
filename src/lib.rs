#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// A hash set implementation using leapfrog probing.
///
/// This module provides a `HashSet` that wraps the `HashTable` and provides
/// a standard set interface with configurable hashers.
pub mod hash_set;

/// The core fixed-capacity leapfrog hash table.
pub mod hash_table;

pub use hash_set::DefaultHashBuilder;
pub use hash_set::HashSet;
pub use hash_table::HashTable;
pub use hash_table::NULL_HASH;

//! Index structures.
//!
//! - [`btree`] - disk-resident B+tree
//! - [`key`] - order-preserving fixed-width key encodings

pub mod btree;
pub mod key;

pub use btree::{BPlusTree, IndexIterator, TreeOptions, TreeStats};

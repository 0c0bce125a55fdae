//! B+tree index implementation.
//!
//! A disk-resident, unique-key B+tree over fixed-width byte keys whose
//! values are [`RowId`](crate::common::RowId)s.
//!
//! # Structure
//! ```text
//!                 ┌───────────────────────┐
//!                 │   Internal (root)     │
//!                 │  [ ·  | 8 ]           │
//!                 └───┬───────────┬───────┘
//!                     ▼           ▼
//!             ┌─────────────┐  ┌─────────────┐
//!             │ Leaf 1 2 3  │─▶│ Leaf 8 9    │─▶ INVALID
//!             └─────────────┘  └─────────────┘
//! ```
//!
//! - [`BPlusTree`] - search, insert, remove, iteration, verification
//! - [`LeafPage`] / [`InternalPage`] - node page codecs
//! - [`IndexIterator`] - forward cursor over the leaf chain
//! - [`TreeOptions`] - key width and node fan-out

mod internal_page;
mod iterator;
mod leaf_page;
mod node;
mod options;
mod tree;
mod verify;

pub use internal_page::InternalPage;
pub use iterator::IndexIterator;
pub use leaf_page::LeafPage;
pub use node::BTreeNode;
pub use options::TreeOptions;
pub use tree::BPlusTree;
pub use verify::TreeStats;

//! stratadb - an embedded page store with a disk-resident B+tree index.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            stratadb                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Index Layer (index/)                      │   │
//! │  │     BPlusTree + LeafPage/InternalPage + IndexIterator    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   BufferPoolManager + Frame + Replacer (LRU) + guards    │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Storage Layer (storage/)                  │   │
//! │  │   DiskManager + meta page + bitmap extents + Page        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, RowId, Error, config)
//! - [`buffer`] - Buffer pool management and page replacement
//! - [`storage`] - Disk I/O and page formats
//! - [`index`] - B+tree index and key encodings
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use stratadb::common::config::DEFAULT_POOL_SIZE;
//! use stratadb::index::{key, BPlusTree, TreeOptions};
//! use stratadb::{BufferPoolManager, DiskManager, PageId, RowId};
//!
//! let dm = DiskManager::open_or_create("my_database.db").unwrap();
//! let bpm = Arc::new(BufferPoolManager::new(DEFAULT_POOL_SIZE, dm));
//!
//! let mut tree = BPlusTree::open(1, bpm.clone(), TreeOptions::new(4)).unwrap();
//! tree.insert(&key::encode_u32(7), RowId::new(PageId::new(1), 0)).unwrap();
//! assert_eq!(tree.get(&key::encode_u32(7)).unwrap(), Some(RowId::new(PageId::new(1), 0)));
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

pub use common::config::PAGE_SIZE;
pub use common::{DiskConfig, Error, FrameId, IndexId, PageId, Result, RowId};

pub use buffer::{BufferPoolManager, BufferPoolStats, Frame, StatsSnapshot};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::DiskManager;

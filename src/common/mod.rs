//! Common types and utilities shared across stratadb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`DiskConfig`]
//! - Error types
//! - Identifiers (PageId, FrameId, RowId, IndexId)

pub mod config;
pub mod error;
mod frame_id;
mod page_id;
mod row_id;

pub use config::DiskConfig;
pub use error::{Error, Result};
pub use frame_id::FrameId;
pub use page_id::PageId;
pub use row_id::RowId;

/// Identifies an index in the root directory page.
pub type IndexId = u32;

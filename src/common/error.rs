//! Error types for stratadb.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors surfaced by the storage engine.
///
/// Absent keys and absent pages in lookups are not errors: they come back as
/// `Ok(None)` / `Ok(false)`. The variants here cover capacity exhaustion,
/// integrity violations, bad arguments and I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page is not allocated on disk.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// The page ID is the sentinel or beyond the addressable range.
    #[error("Invalid page ID: {0}")]
    InvalidPageId(u32),

    /// Every frame in the buffer pool is pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// The disk manager has handed out every page ID it may allocate.
    #[error("Disk manager is out of page IDs")]
    OutOfPages,

    /// Page bytes failed a type-tag, checksum or structural check.
    #[error("Page {page_id} corrupted: {reason}")]
    Corrupted { page_id: u32, reason: String },

    /// A key did not have the index's fixed width.
    #[error("Key size mismatch: expected {expected} bytes, got {actual}")]
    KeySize { expected: usize, actual: usize },

    /// Rejected configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Shorthand for building a [`Error::Corrupted`].
    pub(crate) fn corrupted(page_id: u32, reason: impl Into<String>) -> Self {
        Error::Corrupted {
            page_id,
            reason: reason.into(),
        }
    }
}

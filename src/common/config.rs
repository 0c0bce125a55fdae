//! Configuration constants and tunables for stratadb.

/// Size of a page in bytes (4KB).
///
/// Every on-disk structure (meta page, bitmap extents, root directory,
/// B+tree nodes) occupies exactly one page.
///
/// # Alignment
/// Pages are aligned to 4096 bytes for efficient Direct I/O (O_DIRECT).
pub const PAGE_SIZE: usize = 4096;

/// Bytes at the front of a bitmap page before the bit array:
/// page header (5) + allocated count (4) + next-free hint (4).
pub const BITMAP_HEADER_SIZE: usize = 13;

/// Number of logical pages tracked by one bitmap extent.
pub const BITMAP_CAPACITY: u32 = ((PAGE_SIZE - BITMAP_HEADER_SIZE) * 8) as u32;

/// Bytes at the front of the meta page before the per-extent counters:
/// page header (5) + allocated count (4) + extent count (4).
pub const META_HEADER_SIZE: usize = 13;

/// Maximum number of extents the meta page can describe.
pub const MAX_EXTENTS: u32 = ((PAGE_SIZE - META_HEADER_SIZE) / 4) as u32;

/// Number of logical page IDs the file format can address.
pub const MAX_VALID_PAGE_ID: u32 = MAX_EXTENTS * BITMAP_CAPACITY;

/// Logical page holding the index root directory.
///
/// It is the first page ever allocated in a fresh file.
pub const INDEX_ROOTS_PAGE_ID: u32 = 0;

/// Default number of frames in a buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Tunables for [`DiskManager`](crate::storage::DiskManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskConfig {
    /// Upper bound on simultaneously allocated logical pages.
    ///
    /// Clamped to [`MAX_VALID_PAGE_ID`].
    pub max_pages: u32,

    /// Call `fsync()` after every page write.
    ///
    /// When off, durability is reached through
    /// [`DiskManager::sync`](crate::storage::DiskManager::sync), which the
    /// buffer pool calls from `flush_all_pages()`.
    pub sync_on_write: bool,
}

impl DiskConfig {
    /// Limit the number of allocatable pages.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.min(MAX_VALID_PAGE_ID);
        self
    }

    /// This config with `max_pages` limited to the addressable range.
    ///
    /// The field is public, so a struct literal can exceed the limit.
    pub fn clamped(self) -> Self {
        Self {
            max_pages: self.max_pages.min(MAX_VALID_PAGE_ID),
            ..self
        }
    }

    /// Toggle fsync-per-write.
    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            max_pages: MAX_VALID_PAGE_ID,
            sync_on_write: false,
        }
    }
}

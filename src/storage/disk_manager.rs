//! Disk Manager - low-level file I/O and free-space tracking.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Translating logical page IDs to physical file offsets
//! - Allocating and deallocating logical pages through bitmap extents
//! - Reading and writing pages
//! - Managing the database file

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, error, trace};

use crate::common::config::{BITMAP_CAPACITY, MAX_EXTENTS, PAGE_SIZE};
use crate::common::{DiskConfig, Error, PageId, Result};
use crate::storage::page::{BitmapPage, MetaPage, Page};

/// Physical page holding the [`MetaPage`].
const META_PHYSICAL_ID: u64 = 0;

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The file interleaves one bitmap page in front of every extent of
/// `BITMAP_CAPACITY` data pages, after a single meta page:
/// ```text
/// ┌────────┬──────────┬──────────────────────┬──────────┬──────────────┐
/// │  Meta  │ Bitmap 0 │ Extent 0 data pages  │ Bitmap 1 │ Extent 1 ... │
/// └────────┴──────────┴──────────────────────┴──────────┴──────────────┘
/// physical 0    1       2 ..= CAP+1           CAP+2       CAP+3 ...
/// ```
///
/// Logical page `L` lives at physical page `L + L / BITMAP_CAPACITY + 2`.
/// Callers only ever see logical IDs.
///
/// The meta page and every bitmap are cached in memory and written through
/// on each allocation change.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` is responsible
/// for serializing access to the disk manager.
///
/// # Durability
/// Writes go to the OS page cache. Set [`DiskConfig::sync_on_write`] to
/// `fsync()` after every write, or call [`sync`](Self::sync).
pub struct DiskManager {
    file: File,
    config: DiskConfig,
    meta: MetaPage,
    /// One cached bitmap per extent, indexed like `meta.extent_used`.
    bitmaps: Vec<BitmapPage>,
}

impl DiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, DiskConfig::default())
    }

    pub fn create_with_config<P: AsRef<Path>>(path: P, config: DiskConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            config: config.clamped(),
            meta: MetaPage::default(),
            bitmaps: Vec::new(),
        })
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be read, or its
    /// meta and bitmap pages disagree.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, DiskConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: DiskConfig) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut dm = Self {
            file,
            config: config.clamped(),
            meta: MetaPage::default(),
            bitmaps: Vec::new(),
        };
        dm.load_allocation_state()?;

        debug!(
            "Opened {}: {} pages allocated in {} extents",
            path.as_ref().display(),
            dm.meta.num_allocated,
            dm.meta.num_extents()
        );
        Ok(dm)
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_or_create_with_config(path, DiskConfig::default())
    }

    pub fn open_or_create_with_config<P: AsRef<Path>>(
        path: P,
        config: DiskConfig,
    ) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open_with_config(path, config)
        } else {
            Self::create_with_config(path, config)
        }
    }

    fn load_allocation_state(&mut self) -> Result<()> {
        let meta_page = self.read_physical(META_PHYSICAL_ID)?;
        let meta = MetaPage::decode(&meta_page)?;

        let mut bitmaps = Vec::with_capacity(meta.extent_used.len());
        for (extent, &used) in meta.extent_used.iter().enumerate() {
            let physical = Self::bitmap_physical_id(extent as u32);
            let bitmap = BitmapPage::decode(&self.read_physical(physical)?, physical as u32)?;
            if bitmap.allocated_count() != used {
                return Err(Error::corrupted(
                    physical as u32,
                    format!(
                        "extent {} bitmap counts {} pages, meta says {}",
                        extent,
                        bitmap.allocated_count(),
                        used
                    ),
                ));
            }
            bitmaps.push(bitmap);
        }

        let total: u64 = meta.extent_used.iter().map(|&used| used as u64).sum();
        if total != meta.num_allocated as u64 {
            return Err(Error::corrupted(
                META_PHYSICAL_ID as u32,
                format!(
                    "extents hold {} pages, meta says {}",
                    total, meta.num_allocated
                ),
            ));
        }

        self.meta = meta;
        self.bitmaps = bitmaps;
        Ok(())
    }

    /// Physical page of logical page `page_id`.
    #[inline]
    fn physical_id(page_id: PageId) -> u64 {
        let logical = page_id.0 as u64;
        logical + logical / BITMAP_CAPACITY as u64 + 2
    }

    /// Physical page of the bitmap for `extent`.
    #[inline]
    fn bitmap_physical_id(extent: u32) -> u64 {
        1 + extent as u64 * (BITMAP_CAPACITY as u64 + 1)
    }

    /// Read a page from disk.
    ///
    /// Pages never written (past end of file) read back as zeros. This does
    /// not check whether the page is allocated; the buffer pool does.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` if the ID is outside the addressable
    /// range.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if !page_id.is_addressable() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        trace!("Reading {}", page_id);
        self.read_physical(Self::physical_id(page_id))
    }

    /// Write a page to disk.
    ///
    /// # Errors
    /// Returns `Error::InvalidPageId` for unaddressable IDs, or the I/O error.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if !page_id.is_addressable() {
            return Err(Error::InvalidPageId(page_id.0));
        }
        trace!("Writing {}", page_id);
        self.write_physical(Self::physical_id(page_id), page)
            .inspect_err(|e| error!("Failed to write {}: {}", page_id, e))
    }

    fn read_physical(&mut self, physical_id: u64) -> Result<Page> {
        let mut page = Page::new();
        self.file.seek(SeekFrom::Start(physical_id * PAGE_SIZE as u64))?;

        // A short read leaves the rest of the page zeroed.
        let buf = page.as_mut_slice();
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < PAGE_SIZE {
            trace!("Short read of physical page {} ({} bytes)", physical_id, filled);
        }
        Ok(page)
    }

    fn write_physical(&mut self, physical_id: u64, page: &Page) -> Result<()> {
        self.file.seek(SeekFrom::Start(physical_id * PAGE_SIZE as u64))?;
        self.file.write_all(page.as_slice())?;
        if self.config.sync_on_write {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn persist_extent(&mut self, extent: usize) -> Result<()> {
        let mut page = Page::new();
        self.bitmaps[extent].encode(&mut page);
        let physical = Self::bitmap_physical_id(extent as u32);
        self.write_physical(physical, &page)
            .inspect_err(|e| error!("Failed to write bitmap for extent {}: {}", extent, e))?;

        self.meta.encode(&mut page);
        self.write_physical(META_PHYSICAL_ID, &page)
            .inspect_err(|e| error!("Failed to write meta page: {}", e))
    }

    /// Allocate a logical page.
    ///
    /// Extents are filled in order, and within an extent the lowest free
    /// offset at or after the bitmap's hint is taken.
    ///
    /// # Errors
    /// Returns `Error::OutOfPages` once `DiskConfig::max_pages` pages are
    /// allocated, or the I/O error if persisting the bitmap fails (the
    /// allocation is then undone in memory).
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if self.meta.num_allocated >= self.config.max_pages {
            return Err(Error::OutOfPages);
        }

        let mut grew = false;
        if self.meta.num_allocated as u64 == self.meta.num_extents() as u64 * BITMAP_CAPACITY as u64
        {
            if self.meta.num_extents() >= MAX_EXTENTS {
                return Err(Error::OutOfPages);
            }
            self.meta.extent_used.push(0);
            self.bitmaps.push(BitmapPage::new());
            grew = true;
            debug!("Growing to {} extents", self.meta.num_extents());
        }

        let extent = self
            .meta
            .extent_used
            .iter()
            .position(|&used| used < BITMAP_CAPACITY)
            .ok_or(Error::OutOfPages)?;
        let offset = self.bitmaps[extent].allocate().ok_or_else(|| {
            Error::corrupted(
                Self::bitmap_physical_id(extent as u32) as u32,
                "bitmap full but meta reports free space",
            )
        })?;
        self.meta.extent_used[extent] += 1;
        self.meta.num_allocated += 1;

        if let Err(e) = self.persist_extent(extent) {
            self.bitmaps[extent].deallocate(offset);
            self.meta.extent_used[extent] -= 1;
            self.meta.num_allocated -= 1;
            if grew {
                self.meta.extent_used.pop();
                self.bitmaps.pop();
            }
            return Err(e);
        }

        let page_id = PageId::new(extent as u32 * BITMAP_CAPACITY + offset);
        debug!("Allocated {}", page_id);
        Ok(page_id)
    }

    /// Free a logical page.
    ///
    /// Returns `Ok(false)` without touching any counter if the page was
    /// already free or is out of range.
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<bool> {
        if !page_id.is_addressable() {
            return Ok(false);
        }
        let extent = (page_id.0 / BITMAP_CAPACITY) as usize;
        let offset = page_id.0 % BITMAP_CAPACITY;
        let Some(bitmap) = self.bitmaps.get_mut(extent) else {
            return Ok(false);
        };
        if bitmap.is_free(offset) {
            return Ok(false);
        }
        let before = bitmap.clone();
        bitmap.deallocate(offset);
        self.meta.extent_used[extent] -= 1;
        self.meta.num_allocated -= 1;

        if let Err(e) = self.persist_extent(extent) {
            self.bitmaps[extent] = before;
            self.meta.extent_used[extent] += 1;
            self.meta.num_allocated += 1;
            return Err(e);
        }
        debug!("Deallocated {}", page_id);
        Ok(true)
    }

    /// Swap the backing file, e.g. for a handle that rejects writes.
    #[cfg(test)]
    pub(crate) fn replace_file(&mut self, file: File) {
        self.file = file;
    }

    /// Whether `page_id` is currently unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> bool {
        if !page_id.is_addressable() {
            return true;
        }
        let extent = (page_id.0 / BITMAP_CAPACITY) as usize;
        self.bitmaps
            .get(extent)
            .map_or(true, |bitmap| bitmap.is_free(page_id.0 % BITMAP_CAPACITY))
    }

    /// Number of logical pages currently allocated.
    #[inline]
    pub fn allocated_page_count(&self) -> u32 {
        self.meta.num_allocated
    }

    #[inline]
    pub fn extent_count(&self) -> u32 {
        self.meta.num_extents()
    }

    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// Get the total size of the database file in bytes.
    pub fn file_size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Flush OS buffers to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

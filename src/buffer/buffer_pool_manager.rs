//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting through RAII guards and manual pins
//! - Dirty page write-back on eviction, flush and drop
//! - Pluggable eviction policies via [`Replacer`]

use std::collections::HashMap;

use log::{error, trace, warn};
use parking_lot::Mutex;

use crate::buffer::replacer::{LruReplacer, Replacer};
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Everything guarded by the pool-wide lock.
struct PoolState {
    /// Maps resident page IDs to frame IDs.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page (LIFO for cache locality).
    free_list: Vec<FrameId>,
    /// Frames holding an unpinned page.
    replacer: Box<dyn Replacer>,
}

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌──────────────────────────────┐  ┌────────────────────┐   │
/// │  │ state: Mutex<PoolState>      │  │ frames: Vec<Frame> │   │
/// │  │  page_table  PageId → Fid    │─▶│ [F0] [F1] [F2] ... │   │
/// │  │  free_list   Vec<FrameId>    │  └────────────────────┘   │
/// │  │  replacer    dyn Replacer    │  ┌────────────────────┐   │
/// │  └──────────────────────────────┘  │ disk_manager Mutex │   │
/// │                                    └────────────────────┘   │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: one `Mutex`; every pin count change happens under it
/// - `disk_manager`: `Mutex`, always taken after `state` when both are held
/// - `frames`: fixed size, each Frame latches its own page bytes
/// - `stats`: atomic counters
///
/// The pool lock is never held while waiting on a frame latch that a guard
/// could own, so a thread holding guards may keep fetching other pages.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm);
///
/// let mut guard = bpm.new_page()?;
/// guard.as_mut_slice()[0] = 0xAB;
/// drop(guard);
///
/// let guard = bpm.fetch_page_read(PageId::new(0))?;
/// ```
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    disk_manager: Mutex<DiskManager>,
    stats: BufferPoolStats,
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a buffer pool with an LRU replacer.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_replacer(pool_size, disk_manager, Box::new(LruReplacer::new(pool_size)))
    }

    /// Create a buffer pool with a custom eviction policy.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn with_replacer(
        pool_size: usize,
        disk_manager: DiskManager,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();
        // Reversed so frame 0 is handed out first.
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
                replacer,
            }),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page for reading (shared access).
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for the sentinel or an unaddressable ID
    /// - `Error::PageNotFound` if the page is not allocated on disk
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - I/O errors from reading the page or writing back a dirty victim
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.pin_frame_for(page_id)?;
        let lock = self.frame(frame_id).page();
        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// Same errors as [`fetch_page_read`](Self::fetch_page_read).
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.pin_frame_for(page_id)?;
        let lock = self.frame(frame_id).page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), with every failure
    /// folded into `None`.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        self.fetch_page_read(page_id)
            .inspect_err(|e| trace!("checked_read_page({}) failed: {}", page_id, e))
            .ok()
    }

    /// Like [`fetch_page_write`](Self::fetch_page_write), with every failure
    /// folded into `None`.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        self.fetch_page_write(page_id)
            .inspect_err(|e| trace!("checked_write_page({}) failed: {}", page_id, e))
            .ok()
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a new page on disk and load it, zeroed, into the pool.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned (nothing is allocated)
    /// - `Error::OutOfPages` if the disk manager is exhausted (the frame is
    ///   returned to the free list)
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let (frame_id, page_id) = {
            let mut state = self.state.lock();
            let frame_id = self.obtain_frame(&mut state)?;

            let allocated = self.disk_manager.lock().allocate_page();
            let page_id = match allocated {
                Ok(page_id) => page_id,
                Err(e) => {
                    state.free_list.push(frame_id);
                    return Err(e);
                }
            };

            let frame = self.frame(frame_id);
            frame.page_mut().reset();
            frame.set_page_id(Some(page_id));
            frame.pin();
            state.page_table.insert(page_id, frame_id);
            BufferPoolStats::bump(&self.stats.pages_allocated);
            trace!("New {} in {}", page_id, frame_id);
            (frame_id, page_id)
        };

        let lock = self.frame(frame_id).page_mut();
        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Allocate a page ID on disk without bringing it into the pool.
    ///
    /// The page reads back as zeros until it is written.
    pub fn allocate_page_id(&self) -> Result<PageId> {
        let page_id = self.disk_manager.lock().allocate_page()?;
        BufferPoolStats::bump(&self.stats.pages_allocated);
        Ok(page_id)
    }

    /// Drop a page from the pool and deallocate it on disk.
    ///
    /// Returns `Ok(false)` if the page is resident and pinned; nothing
    /// changes in that case. A dirty resident page is discarded unwritten.
    /// If the disk deallocation fails the page stays resident and untouched.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();

        let resident = state.page_table.get(&page_id).copied();
        if let Some(frame_id) = resident {
            let frame = self.frame(frame_id);
            if frame.is_pinned() {
                warn!(
                    "Refusing to delete {} with pin count {}",
                    page_id,
                    frame.pin_count()
                );
                return Ok(false);
            }
        }

        self.disk_manager.lock().deallocate_page(page_id)?;

        if let Some(frame_id) = resident {
            state.page_table.remove(&page_id);
            state.replacer.pin(frame_id);
            self.frame(frame_id).reset();
            state.free_list.push(frame_id);
        }
        BufferPoolStats::bump(&self.stats.pages_deleted);
        trace!("Deleted {}", page_id);
        Ok(true)
    }

    // ========================================================================
    // Public API: Manual pins
    // ========================================================================

    /// Pin a page without holding a guard.
    ///
    /// Each successful call must be balanced by one
    /// [`unpin_page`](Self::unpin_page).
    pub fn pin_page(&self, page_id: PageId) -> Result<()> {
        let frame_id = self.pin_frame_for(page_id)?;
        self.frame(frame_id).add_manual_pin();
        Ok(())
    }

    /// Release one manual pin, optionally marking the page dirty.
    ///
    /// Returns `false` if the page is not resident or has no manual pin
    /// outstanding. Pins owned by live guards are never released here.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            warn!("unpin_page({}): page not resident", page_id);
            return false;
        };
        let frame = self.frame(frame_id);
        if !frame.take_manual_pin() {
            warn!("unpin_page({}): no manual pin to release", page_id);
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == Some(0) {
            state.replacer.unpin(frame_id);
        }
        true
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Write a resident page to disk if it is dirty.
    ///
    /// Returns `Ok(false)` if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let frame_id = {
            let mut state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            self.frame(frame_id).pin();
            state.replacer.pin(frame_id);
            frame_id
        };

        let result = self.write_back(frame_id, page_id);
        self.release_pin(frame_id);
        result.map(|()| true)
    }

    /// Write every dirty resident page to disk, then sync the file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pages: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();

        for page_id in pages {
            self.flush_page(page_id)?;
        }

        self.disk_manager.lock().sync()
    }

    // ========================================================================
    // Public API: Queries
    // ========================================================================

    /// Whether the disk manager considers `page_id` unallocated.
    pub fn is_page_free(&self, page_id: PageId) -> bool {
        self.disk_manager.lock().is_page_free(page_id)
    }

    /// Pin count of a resident page, `None` if the page is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frame(frame_id).pin_count())
    }

    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// True if no frame is pinned.
    pub fn check_all_unpinned(&self) -> bool {
        let _state = self.state.lock();
        self.frames.iter().all(|frame| !frame.is_pinned())
    }

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of resident pages with a zero pin count.
    pub fn evictable_count(&self) -> usize {
        self.state.lock().replacer.size()
    }

    // ========================================================================
    // Internal: called by guards
    // ========================================================================

    #[inline]
    pub(crate) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.index()]
    }

    /// Drop one guard-owned pin.
    pub(crate) fn release_pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        match self.frame(frame_id).unpin() {
            Some(0) => state.replacer.unpin(frame_id),
            Some(_) => {}
            None => warn!("{} released with pin count already 0", frame_id),
        }
    }

    // ========================================================================
    // Internal: core fetch logic
    // ========================================================================

    /// Make `page_id` resident and pin it. Returns its frame.
    fn pin_frame_for(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_addressable() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frame(frame_id).pin();
            state.replacer.pin(frame_id);
            BufferPoolStats::bump(&self.stats.hits);
            return Ok(frame_id);
        }

        if self.disk_manager.lock().is_page_free(page_id) {
            return Err(Error::PageNotFound(page_id.0));
        }

        BufferPoolStats::bump(&self.stats.misses);
        let frame_id = self.obtain_frame(&mut state)?;
        let frame = self.frame(frame_id);

        let read = self.disk_manager.lock().read_page(page_id);
        match read {
            Ok(page) => {
                frame
                    .page_mut()
                    .as_mut_slice()
                    .copy_from_slice(page.as_slice());
            }
            Err(e) => {
                state.free_list.push(frame_id);
                return Err(e);
            }
        }
        BufferPoolStats::bump(&self.stats.pages_read);

        frame.set_page_id(Some(page_id));
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        trace!("Loaded {} into {}", page_id, frame_id);
        Ok(frame_id)
    }

    /// Take a frame from the free list, or evict a victim.
    ///
    /// The returned frame is empty, unpinned and not in the replacer.
    fn obtain_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.victim().ok_or(Error::NoFreeFrames)?;
        let frame = self.frame(frame_id);

        if let Some(old_page_id) = frame.page_id() {
            if let Err(e) = self.write_back(frame_id, old_page_id) {
                error!("Failed to write back {} on eviction: {}", old_page_id, e);
                state.replacer.unpin(frame_id);
                return Err(e);
            }
            state.page_table.remove(&old_page_id);
            trace!("Evicted {} from {}", old_page_id, frame_id);
        }

        frame.reset();
        BufferPoolStats::bump(&self.stats.evictions);
        Ok(frame_id)
    }

    /// Write the frame's page to disk if dirty.
    ///
    /// The caller keeps the frame from being evicted, either by pinning it
    /// or by holding the pool lock while the frame is unpinned.
    fn write_back(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = self.frame(frame_id);
        let page = frame.page();
        if !frame.is_dirty() {
            return Ok(());
        }

        self.disk_manager.lock().write_page(page_id, &page)?;
        frame.clear_dirty();
        BufferPoolStats::bump(&self.stats.pages_written);
        trace!("Flushed {} from {}", page_id, frame_id);
        Ok(())
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        let dm = self.disk_manager.get_mut();
        for frame in &self.frames {
            let Some(page_id) = frame.page_id() else {
                continue;
            };
            if !frame.is_dirty() {
                continue;
            }
            match dm.write_page(page_id, &frame.page()) {
                Ok(()) => frame.clear_dirty(),
                Err(e) => error!("Failed to flush {} on shutdown: {}", page_id, e),
            }
        }
        if let Err(e) = dm.sync() {
            error!("Failed to sync on shutdown: {}", e);
        }
    }
}

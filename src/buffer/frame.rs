//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the bookkeeping the pool needs:
//! - Which page is resident (if any)
//! - Pin count, and how many of those pins were taken with `pin_page`
//! - Dirty flag for write-back

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A frame in the buffer pool.
///
/// The pool allocates a fixed number of frames at startup and never moves
/// them, so guards can borrow a frame's latch for as long as they live.
///
/// # Thread Safety
/// - `page`: `RwLock` latch on the page bytes
/// - `page_id`: `Mutex`, only changed under the pool-wide lock
/// - `pin_count` / `manual_pins`: atomics
/// - `is_dirty`: `AtomicBool`
pub struct Frame {
    page: RwLock<Page>,

    /// Which page is currently loaded, or None if frame is free.
    page_id: Mutex<Option<PageId>>,

    /// All outstanding pins (guards and manual pins).
    pin_count: AtomicU32,

    /// Pins taken through `BufferPoolManager::pin_page`.
    ///
    /// Always `<= pin_count`. `unpin_page` may only release these, which
    /// keeps a stray unpin from stealing a pin that a live guard owns.
    manual_pins: AtomicU32,

    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: Mutex::new(None),
            pin_count: AtomicU32::new(0),
            manual_pins: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Page access (RwLock)
    // ========================================================================

    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    // ========================================================================
    // Page ID
    // ========================================================================

    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        *self.page_id.lock()
    }

    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        *self.page_id.lock() = page_id;
    }

    // ========================================================================
    // Pin counts (Atomic)
    // ========================================================================

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new pin count, or `None` if it
    /// was already zero (the count is left at zero).
    #[inline]
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|old| old - 1)
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Record a manual pin. The caller also calls [`pin`](Self::pin).
    #[inline]
    pub fn add_manual_pin(&self) {
        self.manual_pins.fetch_add(1, Ordering::AcqRel);
    }

    /// Release one manual pin record. Returns `false` if there was none.
    #[inline]
    pub fn take_manual_pin(&self) -> bool {
        self.manual_pins
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .is_ok()
    }

    #[inline]
    pub fn manual_pin_count(&self) -> u32 {
        self.manual_pins.load(Ordering::Acquire)
    }

    // ========================================================================
    // Dirty flag (Atomic)
    // ========================================================================

    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    // ========================================================================
    // Frame state queries
    // ========================================================================

    /// Check if the frame is free (no page loaded).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id().is_none()
    }

    #[inline]
    pub fn is_evictable(&self) -> bool {
        self.page_id().is_some() && !self.is_pinned()
    }

    /// Reset the frame to empty state.
    ///
    /// Called after deletion to prepare for reuse. Must not be called while
    /// the frame is pinned.
    pub fn reset(&self) {
        self.page_mut().reset();
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Release);
        self.manual_pins.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

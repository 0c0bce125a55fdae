//! Eviction policy implementations (replacers).
//!
//! A replacer tracks the frames whose pin count is zero and picks which one
//! to reuse next. The buffer pool owns one behind its pool-wide lock, so
//! the trait takes `&mut self`.
//!
//! The default is [`LruReplacer`], which evicts the least recently
//! unpinned frame. Other policies plug in through
//! [`BufferPoolManager::with_replacer`](crate::buffer::BufferPoolManager::with_replacer).

mod lru;

pub use self::lru::LruReplacer;

use crate::common::FrameId;

/// A page replacement policy.
pub trait Replacer: Send {
    /// The frame was pinned: it is no longer a candidate.
    fn pin(&mut self, frame_id: FrameId);

    /// The frame's pin count reached zero: it becomes a candidate.
    ///
    /// Unpinning a frame that is already a candidate keeps its position.
    fn unpin(&mut self, frame_id: FrameId);

    /// Remove and return the next frame to evict, or `None` if no frame is
    /// evictable.
    fn victim(&mut self) -> Option<FrameId>;

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

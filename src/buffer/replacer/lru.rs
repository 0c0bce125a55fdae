//! LRU (Least Recently Used) replacement policy.

use std::num::NonZeroUsize;

use ::lru::LruCache;

use super::Replacer;
use crate::common::FrameId;

/// Evicts the frame that was unpinned longest ago.
///
/// Only evictable frames are stored, ordered by the time they became
/// evictable. All operations are O(1).
pub struct LruReplacer {
    evictable: LruCache<FrameId, ()>,
}

impl LruReplacer {
    /// Create a replacer for a pool of `num_frames` frames.
    pub fn new(num_frames: usize) -> Self {
        let evictable = NonZeroUsize::new(num_frames)
            .map(LruCache::new)
            .unwrap_or_else(LruCache::unbounded);
        Self { evictable }
    }

    /// Whether `frame_id` is currently evictable.
    pub fn contains(&self, frame_id: FrameId) -> bool {
        self.evictable.contains(&frame_id)
    }
}

impl Replacer for LruReplacer {
    fn pin(&mut self, frame_id: FrameId) {
        self.evictable.pop(&frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        // `contains` does not touch recency, `put` would.
        if !self.evictable.contains(&frame_id) {
            self.evictable.put(frame_id, ());
        }
    }

    fn victim(&mut self) -> Option<FrameId> {
        self.evictable.pop_lru().map(|(frame_id, ())| frame_id)
    }

    fn size(&self) -> usize {
        self.evictable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(id: usize) -> FrameId {
        FrameId::new(id)
    }

    #[test]
    fn test_lru_victim_order() {
        let mut replacer = LruReplacer::new(7);
        for id in [1, 2, 3, 4, 5, 6] {
            replacer.unpin(f(id));
        }
        // Re-unpinning an evictable frame does not refresh it.
        replacer.unpin(f(1));
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(f(1)));
        assert_eq!(replacer.victim(), Some(f(2)));
        assert_eq!(replacer.victim(), Some(f(3)));

        replacer.pin(f(3));
        replacer.pin(f(4));
        assert_eq!(replacer.size(), 2);

        replacer.unpin(f(4));
        assert_eq!(replacer.victim(), Some(f(5)));
        assert_eq!(replacer.victim(), Some(f(6)));
        assert_eq!(replacer.victim(), Some(f(4)));
        assert_eq!(replacer.victim(), None);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_pin_removes_candidate() {
        let mut replacer = LruReplacer::new(3);
        replacer.unpin(f(0));
        replacer.unpin(f(1));
        assert!(replacer.contains(f(0)));

        replacer.pin(f(0));
        assert!(!replacer.contains(f(0)));
        assert_eq!(replacer.victim(), Some(f(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_pin_unknown_frame_is_noop() {
        let mut replacer = LruReplacer::new(2);
        replacer.pin(f(1));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_zero_capacity() {
        let mut replacer = LruReplacer::new(0);
        replacer.unpin(f(9));
        assert_eq!(replacer.victim(), Some(f(9)));
    }
}

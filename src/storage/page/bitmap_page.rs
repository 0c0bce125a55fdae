//! Free-space bitmap for one extent.

use crate::common::config::{BITMAP_CAPACITY, BITMAP_HEADER_SIZE, PAGE_SIZE};
use crate::common::{Error, Result};

use super::{Page, PageHeader, PageType};

const BITMAP_BYTES: usize = PAGE_SIZE - BITMAP_HEADER_SIZE;

/// One bit per logical page of an extent; a set bit means allocated.
///
/// # Layout
/// ```text
/// Offset  Size   Field
/// ------  ----   -----
/// 0       5      PageHeader
/// 5       4      page_allocated
/// 9       4      next_free (search hint)
/// 13      4083   bits (bit i of byte i/8 = offset i)
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct BitmapPage {
    page_allocated: u32,
    next_free: u32,
    bits: Box<[u8; BITMAP_BYTES]>,
}

impl BitmapPage {
    const OFFSET_ALLOCATED: usize = PageHeader::SIZE;
    const OFFSET_NEXT_FREE: usize = PageHeader::SIZE + 4;

    pub fn new() -> Self {
        Self {
            page_allocated: 0,
            next_free: 0,
            bits: Box::new([0u8; BITMAP_BYTES]),
        }
    }

    pub fn allocated_count(&self) -> u32 {
        self.page_allocated
    }

    pub fn is_full(&self) -> bool {
        self.page_allocated >= BITMAP_CAPACITY
    }

    /// Mark the first free offset as allocated and return it.
    ///
    /// Returns `None` if every offset is taken.
    pub fn allocate(&mut self) -> Option<u32> {
        if self.is_full() {
            return None;
        }

        let offset = self.find_free(self.next_free)?;
        self.set_bit(offset, true);
        self.page_allocated += 1;

        self.next_free = if self.is_full() {
            BITMAP_CAPACITY
        } else {
            self.find_free((offset + 1) % BITMAP_CAPACITY)
                .unwrap_or(BITMAP_CAPACITY)
        };
        Some(offset)
    }

    /// Clear `offset`. Returns `false` if it was already free.
    pub fn deallocate(&mut self, offset: u32) -> bool {
        if offset >= BITMAP_CAPACITY || self.is_free(offset) {
            return false;
        }
        self.set_bit(offset, false);
        self.page_allocated -= 1;
        if offset < self.next_free {
            self.next_free = offset;
        }
        true
    }

    /// Offsets past the capacity are reported as not free.
    pub fn is_free(&self, offset: u32) -> bool {
        if offset >= BITMAP_CAPACITY {
            return false;
        }
        self.bits[offset as usize / 8] & (1 << (offset % 8)) == 0
    }

    /// Scan forward from `start`, wrapping around once.
    fn find_free(&self, start: u32) -> Option<u32> {
        let start = if start >= BITMAP_CAPACITY { 0 } else { start };
        (start..BITMAP_CAPACITY)
            .chain(0..start)
            .find(|&offset| self.is_free(offset))
    }

    fn set_bit(&mut self, offset: u32, value: bool) {
        let byte = &mut self.bits[offset as usize / 8];
        let mask = 1u8 << (offset % 8);
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    pub fn encode(&self, page: &mut Page) {
        page.reset();
        page.write_u32(Self::OFFSET_ALLOCATED, self.page_allocated);
        page.write_u32(Self::OFFSET_NEXT_FREE, self.next_free);
        page.as_mut_slice()[BITMAP_HEADER_SIZE..].copy_from_slice(&self.bits[..]);
        page.seal(PageType::Bitmap);
    }

    /// Decode the bitmap stored at physical page `physical_id`.
    ///
    /// A zeroed page is an untouched extent.
    pub fn decode(page: &Page, physical_id: u32) -> Result<Self> {
        if page.is_zeroed() {
            return Ok(Self::new());
        }
        page.check(physical_id, PageType::Bitmap)?;

        let mut bits = Box::new([0u8; BITMAP_BYTES]);
        bits.copy_from_slice(&page.as_slice()[BITMAP_HEADER_SIZE..]);
        let bitmap = Self {
            page_allocated: page.read_u32(Self::OFFSET_ALLOCATED),
            next_free: page.read_u32(Self::OFFSET_NEXT_FREE),
            bits,
        };

        let set_bits: u32 = bitmap.bits.iter().map(|b| b.count_ones()).sum();
        if set_bits != bitmap.page_allocated {
            return Err(Error::corrupted(
                physical_id,
                format!(
                    "bitmap counts {} pages but has {} bits set",
                    bitmap.page_allocated, set_bits
                ),
            ));
        }
        Ok(bitmap)
    }
}

impl Default for BitmapPage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BitmapPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapPage")
            .field("page_allocated", &self.page_allocated)
            .field("next_free", &self.next_free)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut bitmap = BitmapPage::new();
        for expected in 0..10 {
            assert_eq!(bitmap.allocate(), Some(expected));
        }
        assert_eq!(bitmap.allocated_count(), 10);
        assert!(!bitmap.is_free(9));
        assert!(bitmap.is_free(10));
    }

    #[test]
    fn test_deallocate_reuses_lowest_hole() {
        let mut bitmap = BitmapPage::new();
        for _ in 0..10 {
            bitmap.allocate();
        }

        assert!(bitmap.deallocate(7));
        assert!(bitmap.deallocate(3));
        assert!(!bitmap.deallocate(3));
        assert_eq!(bitmap.allocated_count(), 8);

        assert_eq!(bitmap.allocate(), Some(3));
        assert_eq!(bitmap.allocate(), Some(7));
        assert_eq!(bitmap.allocate(), Some(10));
    }

    #[test]
    fn test_full_bitmap() {
        let mut bitmap = BitmapPage::new();
        for _ in 0..BITMAP_CAPACITY {
            assert!(bitmap.allocate().is_some());
        }
        assert!(bitmap.is_full());
        assert_eq!(bitmap.allocate(), None);

        assert!(bitmap.deallocate(1234));
        assert_eq!(bitmap.allocate(), Some(1234));
    }

    #[test]
    fn test_out_of_range_offsets() {
        let mut bitmap = BitmapPage::new();
        assert!(!bitmap.is_free(BITMAP_CAPACITY));
        assert!(!bitmap.deallocate(BITMAP_CAPACITY));
    }

    #[test]
    fn test_encode_decode_preserves_state() {
        let mut bitmap = BitmapPage::new();
        for _ in 0..20 {
            bitmap.allocate();
        }
        bitmap.deallocate(4);

        let mut page = Page::new();
        bitmap.encode(&mut page);
        assert_eq!(page.page_type(), PageType::Bitmap);
        assert_eq!(page.read_u32(5), 19);
        assert_eq!(page.read_u32(9), 4);

        let decoded = BitmapPage::decode(&page, 1).unwrap();
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn test_decode_rejects_count_mismatch() {
        let mut page = Page::new();
        page.write_u32(5, 3);
        page.as_mut_slice()[BITMAP_HEADER_SIZE] = 0b0000_0001;
        page.seal(PageType::Bitmap);

        assert!(matches!(
            BitmapPage::decode(&page, 1),
            Err(Error::Corrupted { page_id: 1, .. })
        ));
    }
}

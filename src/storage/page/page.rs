//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array: the unit of disk I/O and of caching in
//! the buffer pool. Its bytes are interpreted by the typed codecs
//! ([`MetaPage`](super::MetaPage), [`BitmapPage`](super::BitmapPage),
//! [`IndexRootsPage`](super::IndexRootsPage) and the B+tree node pages), each
//! of which stamps a [`PageHeader`] on encode and checks it on decode.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};

use super::page_header::{PageHeader, PageType};

/// A page of data (4KB, 4KB-aligned).
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` outside tests: copying 4KB should be
/// explicit (`as_mut_slice().copy_from_slice(..)`).
///
/// # Example
/// ```
/// use stratadb::storage::page::Page;
///
/// let mut page = Page::new();
/// page.write_u32(8, 0xDEAD_BEEF);
/// assert_eq!(page.read_u32(8), 0xDEAD_BEEF);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// True if no byte has ever been written (fresh or past-EOF read).
    pub fn is_zeroed(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Page type tag from the first byte.
    pub fn page_type(&self) -> PageType {
        PageType::from_u8(self.data[PageHeader::OFFSET_PAGE_TYPE])
    }

    /// Little-endian u32 at `offset`.
    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    /// Store a little-endian u32 at `offset`.
    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write the type tag and stamp the checksum.
    ///
    /// Call this after every other byte of the page has been written.
    pub fn seal(&mut self, page_type: PageType) {
        self.data[PageHeader::OFFSET_PAGE_TYPE] = page_type as u8;
        let checksum = PageHeader::compute_checksum(&self.data);
        self.write_u32(PageHeader::OFFSET_CHECKSUM, checksum);
    }

    /// Check the type tag and the checksum.
    ///
    /// `page_id` is only used to label the error.
    pub fn check(&self, page_id: u32, expected: PageType) -> Result<()> {
        let header = self.header();
        if header.page_type != expected {
            return Err(Error::corrupted(
                page_id,
                format!("expected {:?} page, found {:?}", expected, header.page_type),
            ));
        }
        if !header.verify_checksum(&self.data) {
            return Err(Error::corrupted(page_id, "checksum mismatch"));
        }
        Ok(())
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}

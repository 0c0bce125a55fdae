//! Record identifier stored as the value of B+tree leaf entries.

use std::fmt;

use super::PageId;

/// Locates a row: the heap page holding it and the slot within that page.
///
/// The index layer treats it as an opaque 8-byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RowId {
    /// Encoded width in bytes.
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    /// Serialize as `page_id (LE u32) | slot (LE u32)`.
    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        out[4..].copy_from_slice(&self.slot.to_le_bytes());
        out
    }

    /// Inverse of [`RowId::to_bytes`].
    ///
    /// # Panics
    /// Panics if `data.len() < RowId::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let page_id = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let slot = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self {
            page_id: PageId::new(page_id),
            slot,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row({}, {})", self.page_id.0, self.slot)
    }
}

//! Logical page identifier.

use std::fmt;

use super::config::MAX_VALID_PAGE_ID;

/// Identifies a logical page in the database file.
///
/// Logical IDs are dense: the disk manager hands them out from its bitmap
/// extents and maps each one to a physical offset that skips the interleaved
/// meta and bitmap pages.
///
/// # Example
/// ```
/// use stratadb::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(page_id.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid/sentinel page ID.
    ///
    /// Used for "no parent", "no next leaf" and "empty tree".
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is not the sentinel value.
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Check if the ID falls inside the addressable logical range.
    #[inline]
    pub fn is_addressable(&self) -> bool {
        self.0 < MAX_VALID_PAGE_ID
    }

    /// `None` for the sentinel, `Some(self)` otherwise.
    #[inline]
    pub fn to_option(self) -> Option<PageId> {
        self.is_valid().then_some(self)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}

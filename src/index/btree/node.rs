//! Shared B+tree node header and the node enum.

use crate::common::{Error, PageId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

use super::internal_page::InternalPage;
use super::leaf_page::LeafPage;

/// Fields common to leaf and internal pages.
///
/// # Layout (after the 5-byte [`PageHeader`])
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 5       4     page_id
/// 9       4     parent_page_id (INVALID for the root)
/// 13      4     size (number of entries)
/// 17      4     max_size
/// 21      4     key_size
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodeHeader {
    pub page_id: PageId,
    pub parent: PageId,
    pub size: u32,
    pub max_size: u32,
    pub key_size: u32,
}

impl NodeHeader {
    pub const END: usize = PageHeader::SIZE + 20;

    const OFFSET_PAGE_ID: usize = PageHeader::SIZE;
    const OFFSET_PARENT: usize = PageHeader::SIZE + 4;
    const OFFSET_SIZE: usize = PageHeader::SIZE + 8;
    const OFFSET_MAX_SIZE: usize = PageHeader::SIZE + 12;
    const OFFSET_KEY_SIZE: usize = PageHeader::SIZE + 16;

    pub fn read(page: &Page) -> Self {
        Self {
            page_id: PageId(page.read_u32(Self::OFFSET_PAGE_ID)),
            parent: PageId(page.read_u32(Self::OFFSET_PARENT)),
            size: page.read_u32(Self::OFFSET_SIZE),
            max_size: page.read_u32(Self::OFFSET_MAX_SIZE),
            key_size: page.read_u32(Self::OFFSET_KEY_SIZE),
        }
    }

    pub fn write(&self, page: &mut Page) {
        page.write_u32(Self::OFFSET_PAGE_ID, self.page_id.0);
        page.write_u32(Self::OFFSET_PARENT, self.parent.0);
        page.write_u32(Self::OFFSET_SIZE, self.size);
        page.write_u32(Self::OFFSET_MAX_SIZE, self.max_size);
        page.write_u32(Self::OFFSET_KEY_SIZE, self.key_size);
    }

    /// Check a decoded header against where the page was read from and
    /// what the tree expects.
    pub fn validate(&self, page_id: PageId, key_size: usize, capacity: usize) -> Result<()> {
        if self.page_id != page_id {
            return Err(Error::corrupted(
                page_id.0,
                format!("header names {}", self.page_id),
            ));
        }
        if self.key_size as usize != key_size {
            return Err(Error::KeySize {
                expected: key_size,
                actual: self.key_size as usize,
            });
        }
        if self.max_size as usize > capacity || self.size > self.max_size {
            return Err(Error::corrupted(
                page_id.0,
                format!(
                    "size {} / max {} exceeds page capacity {}",
                    self.size, self.max_size, capacity
                ),
            ));
        }
        Ok(())
    }
}

/// Smallest legal entry count for a non-root node with `max_size`.
#[inline]
pub(crate) fn min_size(max_size: u32) -> usize {
    (max_size as usize).div_ceil(2)
}

/// A decoded B+tree page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BTreeNode {
    Leaf(LeafPage),
    Internal(InternalPage),
}

impl BTreeNode {
    /// Decode whichever node type the page holds.
    pub fn decode(page: &Page, page_id: PageId, key_size: usize) -> Result<Self> {
        match page.page_type() {
            PageType::BTreeLeaf => LeafPage::decode(page, page_id, key_size).map(Self::Leaf),
            PageType::BTreeInternal => {
                InternalPage::decode(page, page_id, key_size).map(Self::Internal)
            }
            other => Err(Error::corrupted(
                page_id.0,
                format!("expected a B+tree node, found {:?}", other),
            )),
        }
    }

    pub fn encode(&self, page: &mut Page) {
        match self {
            Self::Leaf(leaf) => leaf.encode(page),
            Self::Internal(internal) => internal.encode(page),
        }
    }

    pub fn page_id(&self) -> PageId {
        match self {
            Self::Leaf(leaf) => leaf.page_id(),
            Self::Internal(internal) => internal.page_id(),
        }
    }

    pub fn parent(&self) -> PageId {
        match self {
            Self::Leaf(leaf) => leaf.parent(),
            Self::Internal(internal) => internal.parent(),
        }
    }

    pub fn set_parent(&mut self, parent: PageId) {
        match self {
            Self::Leaf(leaf) => leaf.set_parent(parent),
            Self::Internal(internal) => internal.set_parent(parent),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.size(),
            Self::Internal(internal) => internal.size(),
        }
    }

    pub fn max_size(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.max_size(),
            Self::Internal(internal) => internal.max_size(),
        }
    }

    pub fn min_size(&self) -> usize {
        match self {
            Self::Leaf(leaf) => leaf.min_size(),
            Self::Internal(internal) => internal.min_size(),
        }
    }
}

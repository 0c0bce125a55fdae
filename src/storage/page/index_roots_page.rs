//! Index root directory (logical page 0).

use crate::common::config::{INDEX_ROOTS_PAGE_ID, PAGE_SIZE};
use crate::common::{Error, IndexId, PageId, Result};

use super::{Page, PageHeader, PageType};

/// Maps each index ID to the page ID of its B+tree root.
///
/// # Layout
/// ```text
/// Offset  Size   Field
/// ------  ----   -----
/// 0       5      PageHeader
/// 5       4      count
/// 9       8 * n  (index_id u32, root_page_id u32)
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRootsPage {
    entries: Vec<(IndexId, PageId)>,
}

impl IndexRootsPage {
    const OFFSET_COUNT: usize = PageHeader::SIZE;
    const OFFSET_ENTRIES: usize = PageHeader::SIZE + 4;
    const ENTRY_SIZE: usize = 8;

    /// Most directory entries a page can hold.
    pub const MAX_ENTRIES: usize = (PAGE_SIZE - Self::OFFSET_ENTRIES) / Self::ENTRY_SIZE;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_root_id(&self, index_id: IndexId) -> Option<PageId> {
        self.entries
            .iter()
            .find(|(id, _)| *id == index_id)
            .map(|(_, root)| *root)
    }

    /// Add a new entry. Returns `false` if the index is already registered
    /// or the directory is full.
    pub fn insert(&mut self, index_id: IndexId, root: PageId) -> bool {
        if self.get_root_id(index_id).is_some() || self.entries.len() >= Self::MAX_ENTRIES {
            return false;
        }
        self.entries.push((index_id, root));
        true
    }

    /// Change an existing entry. Returns `false` if the index is unknown.
    pub fn update(&mut self, index_id: IndexId, root: PageId) -> bool {
        match self.entries.iter_mut().find(|(id, _)| *id == index_id) {
            Some(entry) => {
                entry.1 = root;
                true
            }
            None => false,
        }
    }

    /// Insert or update.
    pub fn upsert(&mut self, index_id: IndexId, root: PageId) -> bool {
        self.update(index_id, root) || self.insert(index_id, root)
    }

    pub fn remove(&mut self, index_id: IndexId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| *id != index_id);
        self.entries.len() != before
    }

    pub fn encode(&self, page: &mut Page) {
        page.reset();
        page.write_u32(Self::OFFSET_COUNT, self.entries.len() as u32);
        for (i, (index_id, root)) in self.entries.iter().enumerate() {
            let offset = Self::OFFSET_ENTRIES + i * Self::ENTRY_SIZE;
            page.write_u32(offset, *index_id);
            page.write_u32(offset + 4, root.0);
        }
        page.seal(PageType::IndexRoots);
    }

    pub fn decode(page: &Page) -> Result<Self> {
        page.check(INDEX_ROOTS_PAGE_ID, PageType::IndexRoots)?;

        let count = page.read_u32(Self::OFFSET_COUNT) as usize;
        if count > Self::MAX_ENTRIES {
            return Err(Error::corrupted(
                INDEX_ROOTS_PAGE_ID,
                format!("directory holds {} entries, max {}", count, Self::MAX_ENTRIES),
            ));
        }

        let entries = (0..count)
            .map(|i| {
                let offset = Self::OFFSET_ENTRIES + i * Self::ENTRY_SIZE;
                (page.read_u32(offset), PageId(page.read_u32(offset + 4)))
            })
            .collect();
        Ok(Self { entries })
    }
}

//! Disk file meta page (physical page 0).

use crate::common::config::{MAX_EXTENTS, META_HEADER_SIZE};
use crate::common::{Error, Result};

use super::{Page, PageHeader, PageType};

/// Allocation summary for the whole file.
///
/// # Layout
/// ```text
/// Offset  Size        Field
/// ------  ----        -----
/// 0       5           PageHeader
/// 5       4           num_allocated
/// 9       4           num_extents
/// 13      4 * 1020    extent_used[k] (pages allocated in extent k)
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaPage {
    pub num_allocated: u32,
    /// One counter per extent; its length is the extent count.
    pub extent_used: Vec<u32>,
}

impl MetaPage {
    const OFFSET_NUM_ALLOCATED: usize = PageHeader::SIZE;
    const OFFSET_NUM_EXTENTS: usize = PageHeader::SIZE + 4;

    pub fn num_extents(&self) -> u32 {
        self.extent_used.len() as u32
    }

    pub fn encode(&self, page: &mut Page) {
        page.reset();
        page.write_u32(Self::OFFSET_NUM_ALLOCATED, self.num_allocated);
        page.write_u32(Self::OFFSET_NUM_EXTENTS, self.num_extents());
        for (k, used) in self.extent_used.iter().enumerate() {
            page.write_u32(META_HEADER_SIZE + k * 4, *used);
        }
        page.seal(PageType::Meta);
    }

    /// Decode the meta page. A zeroed page is a brand-new file.
    pub fn decode(page: &Page) -> Result<Self> {
        if page.is_zeroed() {
            return Ok(Self::default());
        }
        page.check(0, PageType::Meta)?;

        let num_extents = page.read_u32(Self::OFFSET_NUM_EXTENTS);
        if num_extents > MAX_EXTENTS {
            return Err(Error::corrupted(
                0,
                format!("extent count {} exceeds {}", num_extents, MAX_EXTENTS),
            ));
        }

        let extent_used = (0..num_extents as usize)
            .map(|k| page.read_u32(META_HEADER_SIZE + k * 4))
            .collect();

        Ok(Self {
            num_allocated: page.read_u32(Self::OFFSET_NUM_ALLOCATED),
            extent_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_page_is_empty_meta() {
        let meta = MetaPage::decode(&Page::new()).unwrap();
        assert_eq!(meta.num_allocated, 0);
        assert_eq!(meta.num_extents(), 0);
    }

    #[test]
    fn test_meta_layout() {
        let meta = MetaPage {
            num_allocated: 5,
            extent_used: vec![3, 2],
        };
        let mut page = Page::new();
        meta.encode(&mut page);

        assert_eq!(page.page_type(), PageType::Meta);
        assert_eq!(page.read_u32(5), 5);
        assert_eq!(page.read_u32(9), 2);
        assert_eq!(page.read_u32(13), 3);
        assert_eq!(page.read_u32(17), 2);
        assert_eq!(MetaPage::decode(&page).unwrap(), meta);
    }

    #[test]
    fn test_meta_rejects_bad_extent_count() {
        let mut page = Page::new();
        page.write_u32(9, MAX_EXTENTS + 1);
        page.seal(PageType::Meta);

        assert!(matches!(
            MetaPage::decode(&page),
            Err(Error::Corrupted { page_id: 0, .. })
        ));
    }
}

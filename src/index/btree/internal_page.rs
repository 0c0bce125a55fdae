//! B+tree internal page.

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result};
use crate::storage::page::{Page, PageType};

use super::node::{min_size, NodeHeader};

const CHILD_SIZE: usize = 4;

/// An internal node: `size` children separated by `size - 1` keys.
///
/// Entry `i` is `(key_i, child_i)`. The key of entry 0 is unused and stored
/// as zeros; for `i >= 1`, every key in `child_i`'s subtree is `>= key_i`
/// and `< key_{i+1}`.
///
/// # Layout
/// ```text
/// Offset  Size              Field
/// ------  ----              -----
/// 0       25                PageHeader + NodeHeader
/// 25      (k + 4) * size    entries: key bytes, then child page id
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPage {
    page_id: PageId,
    parent: PageId,
    max_size: u32,
    key_size: usize,
    entries: Vec<(Vec<u8>, PageId)>,
}

impl InternalPage {
    pub const HEADER_SIZE: usize = NodeHeader::END;

    /// Most children an internal page can hold for `key_size`-byte keys.
    pub const fn capacity(key_size: usize) -> usize {
        (PAGE_SIZE - Self::HEADER_SIZE) / (key_size + CHILD_SIZE)
    }

    pub fn new(page_id: PageId, parent: PageId, max_size: u32, key_size: usize) -> Self {
        Self {
            page_id,
            parent,
            max_size,
            key_size,
            entries: Vec::with_capacity(max_size as usize + 1),
        }
    }

    /// A fresh root with two children split around `separator`.
    pub fn new_root(
        page_id: PageId,
        max_size: u32,
        key_size: usize,
        left: PageId,
        separator: Vec<u8>,
        right: PageId,
    ) -> Self {
        let mut root = Self::new(page_id, PageId::INVALID, max_size, key_size);
        root.entries.push((vec![0; key_size], left));
        root.entries.push((separator, right));
        root
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn parent(&self) -> PageId {
        self.parent
    }

    pub fn set_parent(&mut self, parent: PageId) {
        self.parent = parent;
    }

    /// Number of children.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size as usize
    }

    pub fn min_size(&self) -> usize {
        min_size(self.max_size)
    }

    pub fn is_overfull(&self) -> bool {
        self.size() > self.max_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        &self.entries[index].0
    }

    pub fn set_key_at(&mut self, index: usize, key: Vec<u8>) {
        self.entries[index].0 = key;
    }

    pub fn child_at(&self, index: usize) -> PageId {
        self.entries[index].1
    }

    pub fn children(&self) -> impl Iterator<Item = PageId> + '_ {
        self.entries.iter().map(|(_, child)| *child)
    }

    /// Index of the child whose subtree may contain `key`: the rightmost
    /// child whose separator is `<= key`.
    pub fn child_index_for(&self, key: &[u8]) -> usize {
        self.entries
            .get(1..)
            .map_or(0, |separators| {
                separators.partition_point(|(k, _)| k.as_slice() <= key)
            })
    }

    /// Insert `(separator, right)` directly after the entry at `index`.
    pub fn insert_after(&mut self, index: usize, separator: Vec<u8>, right: PageId) {
        self.entries.insert(index + 1, (separator, right));
    }

    /// Remove the entry at `index` (key and child).
    pub fn remove(&mut self, index: usize) {
        self.entries.remove(index);
        if index == 0 {
            if let Some(first) = self.entries.first_mut() {
                first.0.fill(0);
            }
        }
    }

    /// Move the upper half of the children into a new right sibling with id
    /// `right_id`. Returns the sibling and the separator pushed up to the
    /// parent; the sibling's first key is cleared.
    pub fn split(&mut self, right_id: PageId) -> (InternalPage, Vec<u8>) {
        let keep = self.entries.len() / 2;
        let mut right = InternalPage::new(right_id, self.parent, self.max_size, self.key_size);
        right.entries = self.entries.split_off(keep);
        let separator = std::mem::replace(&mut right.entries[0].0, vec![0; self.key_size]);
        (right, separator)
    }

    /// Append every child of `right`, pulling `separator` (the parent key
    /// between the two) down in front of them. Returns the moved children.
    pub fn merge_from(&mut self, separator: Vec<u8>, right: InternalPage) -> Vec<PageId> {
        let moved: Vec<PageId> = right.children().collect();
        let mut entries = right.entries;
        if let Some(first) = entries.first_mut() {
            first.0 = separator;
        }
        self.entries.extend(entries);
        moved
    }

    pub(crate) fn pop_last(&mut self) -> Option<(Vec<u8>, PageId)> {
        self.entries.pop()
    }

    pub(crate) fn pop_first(&mut self) -> Option<(Vec<u8>, PageId)> {
        (!self.entries.is_empty()).then(|| self.entries.remove(0))
    }

    /// Take the key of the first entry, leaving the sentinel zeros behind.
    pub(crate) fn take_first_key(&mut self) -> Option<Vec<u8>> {
        let key_size = self.key_size;
        self.entries
            .first_mut()
            .map(|first| std::mem::replace(&mut first.0, vec![0; key_size]))
    }

    /// Prepend `child`; `old_first_key` becomes the key of the previous first
    /// entry.
    pub(crate) fn push_front(&mut self, child: PageId, old_first_key: Vec<u8>) {
        if let Some(first) = self.entries.first_mut() {
            first.0 = old_first_key;
        }
        self.entries.insert(0, (vec![0; self.key_size], child));
    }

    pub(crate) fn push_back(&mut self, key: Vec<u8>, child: PageId) {
        self.entries.push((key, child));
    }

    pub fn encode(&self, page: &mut Page) {
        page.reset();
        NodeHeader {
            page_id: self.page_id,
            parent: self.parent,
            size: self.entries.len() as u32,
            max_size: self.max_size,
            key_size: self.key_size as u32,
        }
        .write(page);

        let stride = self.key_size + CHILD_SIZE;
        for (i, (key, child)) in self.entries.iter().enumerate() {
            let offset = Self::HEADER_SIZE + i * stride;
            if i > 0 {
                page.as_mut_slice()[offset..offset + self.key_size].copy_from_slice(key);
            }
            page.write_u32(offset + self.key_size, child.0);
        }
        page.seal(PageType::BTreeInternal);
    }

    pub fn decode(page: &Page, page_id: PageId, key_size: usize) -> Result<Self> {
        page.check(page_id.0, PageType::BTreeInternal)?;
        let header = NodeHeader::read(page);
        header.validate(page_id, key_size, Self::capacity(key_size))?;

        let stride = key_size + CHILD_SIZE;
        let entries = (0..header.size as usize)
            .map(|i| {
                let offset = Self::HEADER_SIZE + i * stride;
                let key = page.as_slice()[offset..offset + key_size].to_vec();
                (key, PageId(page.read_u32(offset + key_size)))
            })
            .collect();

        Ok(Self {
            page_id,
            parent: header.parent,
            max_size: header.max_size,
            key_size,
            entries,
        })
    }
}

//! B+tree leaf page.

use crate::common::config::PAGE_SIZE;
use crate::common::{PageId, Result, RowId};
use crate::storage::page::{Page, PageType};

use super::node::{min_size, NodeHeader};

/// A leaf node: sorted `(key, RowId)` pairs plus the next-leaf link.
///
/// # Layout
/// ```text
/// Offset  Size              Field
/// ------  ----              -----
/// 0       25                PageHeader + NodeHeader
/// 25      4                 next_page_id (INVALID for the last leaf)
/// 29      (k + 8) * size    entries: key bytes, then RowId
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPage {
    page_id: PageId,
    parent: PageId,
    next: PageId,
    max_size: u32,
    key_size: usize,
    entries: Vec<(Vec<u8>, RowId)>,
}

impl LeafPage {
    pub const HEADER_SIZE: usize = NodeHeader::END + 4;

    /// Most entries a leaf page can hold for `key_size`-byte keys.
    pub const fn capacity(key_size: usize) -> usize {
        (PAGE_SIZE - Self::HEADER_SIZE) / (key_size + RowId::SIZE)
    }

    pub fn new(page_id: PageId, parent: PageId, max_size: u32, key_size: usize) -> Self {
        Self {
            page_id,
            parent,
            next: PageId::INVALID,
            max_size,
            key_size,
            entries: Vec::with_capacity(max_size as usize + 1),
        }
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

    pub fn next(&self) -> PageId {
        self.next
    }

    pub fn set_next(&mut self, next: PageId) {
        self.next = next;
    }

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

    pub fn value_at(&self, index: usize) -> RowId {
        self.entries[index].1
    }

    pub fn entries(&self) -> &[(Vec<u8>, RowId)] {
        &self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<(Vec<u8>, RowId)> {
        self.entries
    }

    /// Index of the first entry whose key is `>= key`.
    pub fn key_index(&self, key: &[u8]) -> usize {
        self.entries.partition_point(|(k, _)| k.as_slice() < key)
    }

    pub fn lookup(&self, key: &[u8]) -> Option<RowId> {
        self.entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
            .ok()
            .map(|index| self.entries[index].1)
    }

    /// Insert in sorted position. Returns `false` on a duplicate key.
    pub fn insert(&mut self, key: &[u8], value: RowId) -> bool {
        match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(_) => false,
            Err(index) => {
                self.entries.insert(index, (key.to_vec(), value));
                true
            }
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> bool {
        match self.entries.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(index) => {
                self.entries.remove(index);
                true
            }
            Err(_) => false,
        }
    }

    /// Move the upper half of the entries into a new right sibling with id
    /// `right_id`, linking it into the leaf chain after `self`.
    pub fn split(&mut self, right_id: PageId) -> LeafPage {
        let keep = self.entries.len() / 2;
        let mut right = LeafPage::new(right_id, self.parent, self.max_size, self.key_size);
        right.entries = self.entries.split_off(keep);
        right.next = self.next;
        self.next = right_id;
        right
    }

    /// Append every entry of `right` (the next leaf) and take over its link.
    pub fn merge_from(&mut self, right: LeafPage) {
        self.next = right.next;
        self.entries.extend(right.entries);
    }

    pub(crate) fn pop_last(&mut self) -> Option<(Vec<u8>, RowId)> {
        self.entries.pop()
    }

    pub(crate) fn pop_first(&mut self) -> Option<(Vec<u8>, RowId)> {
        (!self.entries.is_empty()).then(|| self.entries.remove(0))
    }

    pub(crate) fn push_front(&mut self, entry: (Vec<u8>, RowId)) {
        self.entries.insert(0, entry);
    }

    pub(crate) fn push_back(&mut self, entry: (Vec<u8>, RowId)) {
        self.entries.push(entry);
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
        page.write_u32(NodeHeader::END, self.next.0);

        let stride = self.key_size + RowId::SIZE;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            let offset = Self::HEADER_SIZE + i * stride;
            let data = page.as_mut_slice();
            data[offset..offset + self.key_size].copy_from_slice(key);
            data[offset + self.key_size..offset + stride].copy_from_slice(&value.to_bytes());
        }
        page.seal(PageType::BTreeLeaf);
    }

    pub fn decode(page: &Page, page_id: PageId, key_size: usize) -> Result<Self> {
        page.check(page_id.0, PageType::BTreeLeaf)?;
        let header = NodeHeader::read(page);
        header.validate(page_id, key_size, Self::capacity(key_size))?;

        let stride = key_size + RowId::SIZE;
        let data = page.as_slice();
        let entries = (0..header.size as usize)
            .map(|i| {
                let offset = Self::HEADER_SIZE + i * stride;
                let key = data[offset..offset + key_size].to_vec();
                let value = RowId::from_bytes(&data[offset + key_size..offset + stride]);
                (key, value)
            })
            .collect();

        Ok(Self {
            page_id,
            parent: header.parent,
            next: PageId(page.read_u32(NodeHeader::END)),
            max_size: header.max_size,
            key_size,
            entries,
        })
    }
}

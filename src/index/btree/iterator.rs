//! Forward cursor over the leaf chain.

use std::fmt;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{Error, PageId, Result, RowId};

use super::leaf_page::LeafPage;

/// A forward cursor over a B+tree's entries in key order.
///
/// The cursor copies one leaf at a time and holds no pins between calls.
/// It is not stable across mutation of the tree: after an insert or remove,
/// obtain a new cursor.
///
/// Use it either as a cursor ([`key`](Self::key), [`value`](Self::value),
/// [`advance`](Self::advance), [`is_end`](Self::is_end)) or as an
/// [`Iterator`] of `Result<(key, RowId)>`.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    key_size: usize,
    entries: Vec<(Vec<u8>, RowId)>,
    index: usize,
    next_leaf: PageId,
    /// Error hit while moving past an entry already yielded.
    pending: Option<Error>,
}

impl IndexIterator {
    /// Position at entry `index` of `leaf`, moving on to the following leaf
    /// if `index` is past its last entry.
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        key_size: usize,
        leaf: LeafPage,
        index: usize,
    ) -> Result<Self> {
        let next_leaf = leaf.next();
        let mut iter = Self {
            bpm,
            key_size,
            entries: leaf.into_entries(),
            index,
            next_leaf,
            pending: None,
        };
        iter.settle()?;
        Ok(iter)
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>, key_size: usize) -> Self {
        Self {
            bpm,
            key_size,
            entries: Vec::new(),
            index: 0,
            next_leaf: PageId::INVALID,
            pending: None,
        }
    }

    pub fn is_end(&self) -> bool {
        self.index >= self.entries.len()
    }

    /// Key under the cursor, `None` at the end.
    pub fn key(&self) -> Option<&[u8]> {
        self.entries.get(self.index).map(|(key, _)| key.as_slice())
    }

    /// Value under the cursor, `None` at the end.
    pub fn value(&self) -> Option<RowId> {
        self.entries.get(self.index).map(|(_, value)| *value)
    }

    /// Step to the next entry. Advancing the end cursor does nothing.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }
        self.index += 1;
        self.settle()
    }

    /// Load following leaves until the cursor rests on an entry or the
    /// chain runs out.
    fn settle(&mut self) -> Result<()> {
        while self.index >= self.entries.len() {
            let Some(page_id) = self.next_leaf.to_option() else {
                break;
            };
            let leaf = {
                let guard = self.bpm.fetch_page_read(page_id)?;
                LeafPage::decode(&guard, page_id, self.key_size)?
            };
            self.next_leaf = leaf.next();
            self.entries = leaf.into_entries();
            self.index = 0;
        }
        if self.is_end() {
            self.entries.clear();
            self.index = 0;
        }
        Ok(())
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(Vec<u8>, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        let (key, value) = self.entries.get(self.index).cloned()?;
        if let Err(e) = self.advance() {
            self.entries.clear();
            self.index = 0;
            self.next_leaf = PageId::INVALID;
            self.pending = Some(e);
        }
        Some(Ok((key, value)))
    }
}

/// Cursors are equal when they rest on the same row (or are both at the end).
impl PartialEq for IndexIterator {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl fmt::Debug for IndexIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexIterator")
            .field("value", &self.value())
            .field("next_leaf", &self.next_leaf)
            .finish()
    }
}

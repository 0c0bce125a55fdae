//! Disk-resident B+tree over the buffer pool.

use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::BufferPoolManager;
use crate::common::config::INDEX_ROOTS_PAGE_ID;
use crate::common::{Error, IndexId, PageId, Result, RowId};
use crate::storage::page::IndexRootsPage;

use super::internal_page::InternalPage;
use super::iterator::IndexIterator;
use super::leaf_page::LeafPage;
use super::node::BTreeNode;
use super::options::TreeOptions;

/// Deepest descent accepted before the tree is declared cyclic.
pub(crate) const MAX_HEIGHT: usize = 64;

/// Root-to-leaf path: each internal node with the index of the child taken.
type Path = Vec<(InternalPage, usize)>;

/// Result of inserting into one level, fed to the level above.
enum Propagate {
    Done,
    Split {
        left: PageId,
        separator: Vec<u8>,
        right: PageId,
    },
}

/// A unique-key B+tree index mapping fixed-width byte keys to [`RowId`]s.
///
/// All page access goes through the buffer pool. Nodes are decoded into
/// owned values, modified, and written back through short-lived write
/// guards; no guard is held across another fetch, so the tree never holds
/// more than one pin at a time.
///
/// The root page ID is persisted in the [`IndexRootsPage`] directory under
/// the tree's [`IndexId`], which lets [`open`](Self::open) find the tree
/// again after a restart.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use stratadb::index::btree::{BPlusTree, TreeOptions};
/// use stratadb::index::key;
/// use stratadb::{BufferPoolManager, DiskManager, PageId, RowId};
///
/// let bpm = Arc::new(BufferPoolManager::new(64, DiskManager::create("idx.db")?));
/// let mut tree = BPlusTree::open(1, bpm, TreeOptions::new(4))?;
///
/// tree.insert(&key::encode_u32(42), RowId::new(PageId::new(7), 3))?;
/// assert!(tree.get(&key::encode_u32(42))?.is_some());
/// # Ok::<(), stratadb::Error>(())
/// ```
pub struct BPlusTree {
    index_id: IndexId,
    bpm: Arc<BufferPoolManager>,
    options: TreeOptions,
    root_page_id: PageId,
}

impl BPlusTree {
    /// Open the tree registered as `index_id`, or an empty one.
    ///
    /// The root directory is created on logical page 0 the first time any
    /// tree is opened on a file.
    pub fn open(index_id: IndexId, bpm: Arc<BufferPoolManager>, options: TreeOptions) -> Result<Self> {
        options.validate()?;

        let roots_page_id = PageId::new(INDEX_ROOTS_PAGE_ID);
        if bpm.is_page_free(roots_page_id) {
            let mut guard = bpm.new_page()?;
            if guard.page_id() != roots_page_id {
                let stray = guard.page_id();
                drop(guard);
                bpm.delete_page(stray)?;
                return Err(Error::corrupted(
                    INDEX_ROOTS_PAGE_ID,
                    "root directory page is free but is not the next page allocated",
                ));
            }
            IndexRootsPage::new().encode(&mut guard);
            debug!("Created index root directory on {}", roots_page_id);
        }

        let root_page_id = {
            let guard = bpm.fetch_page_read(roots_page_id)?;
            IndexRootsPage::decode(&guard)?
                .get_root_id(index_id)
                .unwrap_or(PageId::INVALID)
        };

        debug!("Opened index {} with root {}", index_id, root_page_id);
        Ok(Self {
            index_id,
            bpm,
            options,
            root_page_id,
        })
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.is_valid()
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    // ========================================================================
    // Point operations
    // ========================================================================

    /// Look up the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<RowId>> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(None);
        }
        let (leaf, _) = self.find_leaf(key)?;
        Ok(leaf.lookup(key))
    }

    /// Insert `key -> value`. Returns `Ok(false)` if `key` is already present.
    ///
    /// On error the tree is left as it was.
    pub fn insert(&mut self, key: &[u8], value: RowId) -> Result<bool> {
        self.check_key(key)?;
        if self.is_empty() {
            self.start_new_tree(key, value)?;
            return Ok(true);
        }

        let (mut leaf, mut path) = self.find_leaf(key)?;
        if !leaf.insert(key, value) {
            return Ok(false);
        }
        if !leaf.is_overfull() {
            self.write_leaf(&leaf)?;
            return Ok(true);
        }

        // Every page the split cascade will need is allocated up front, so a
        // full pool or disk fails before anything is modified.
        let full_ancestors = path
            .iter()
            .rev()
            .take_while(|(parent, _)| parent.size() >= parent.max_size())
            .count();
        let grows_root = full_ancestors == path.len();
        let mut fresh = self.allocate_pages(1 + full_ancestors + usize::from(grows_root))?;

        let right_id = Self::take_page(&mut fresh)?;
        let right = leaf.split(right_id);
        self.write_leaf(&leaf)?;
        self.write_leaf(&right)?;
        debug!(
            "Split leaf {} -> {} ({} / {})",
            leaf.page_id(),
            right_id,
            leaf.size(),
            right.size()
        );

        let mut outcome = Propagate::Split {
            left: leaf.page_id(),
            separator: right.key_at(0).to_vec(),
            right: right_id,
        };
        while let Propagate::Split {
            left,
            separator,
            right,
        } = outcome
        {
            outcome = match path.pop() {
                Some((parent, index)) => {
                    self.insert_into_internal(parent, index, separator, right, &mut fresh)?
                }
                None => {
                    self.grow_root(left, separator, right, &mut fresh)?;
                    Propagate::Done
                }
            };
        }

        // Nonempty only if a node's recorded max disagreed with its size.
        for page_id in fresh {
            self.free_page(page_id)?;
        }
        Ok(true)
    }

    /// Remove `key`. Returns `Ok(false)` if it was not present.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(false);
        }

        let (mut leaf, mut path) = self.find_leaf(key)?;
        if !leaf.remove(key) {
            return Ok(false);
        }

        let mut node = BTreeNode::Leaf(leaf);
        loop {
            let Some((parent, index)) = path.pop() else {
                self.adjust_root(node)?;
                break;
            };
            if node.size() >= node.min_size() {
                self.write_node(&node)?;
                break;
            }
            match self.coalesce_or_redistribute(node, parent, index)? {
                Some(parent) => node = BTreeNode::Internal(parent),
                None => break,
            }
        }
        Ok(true)
    }

    /// Free every page of the tree and drop it from the root directory.
    pub fn destroy(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let mut pending = vec![self.root_page_id];
        while let Some(page_id) = pending.pop() {
            if let BTreeNode::Internal(internal) = self.fetch_node(page_id)? {
                pending.extend(internal.children());
            }
            self.free_page(page_id)?;
        }

        self.update_root(PageId::INVALID)?;
        debug!("Destroyed index {}", self.index_id);
        Ok(())
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Cursor at the smallest key.
    pub fn begin(&self) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(self.end());
        }

        let mut page_id = self.root_page_id;
        for _ in 0..MAX_HEIGHT {
            match self.fetch_node(page_id)? {
                BTreeNode::Internal(internal) => page_id = internal.child_at(0),
                BTreeNode::Leaf(leaf) => {
                    return IndexIterator::new(Arc::clone(&self.bpm), self.options.key_size, leaf, 0)
                }
            }
        }
        Err(Error::corrupted(page_id.0, "tree deeper than any valid tree"))
    }

    /// Cursor at the first key `>= key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<IndexIterator> {
        self.check_key(key)?;
        if self.is_empty() {
            return Ok(self.end());
        }
        let (leaf, _) = self.find_leaf(key)?;
        let index = leaf.key_index(key);
        IndexIterator::new(Arc::clone(&self.bpm), self.options.key_size, leaf, index)
    }

    /// The past-the-end cursor.
    pub fn end(&self) -> IndexIterator {
        IndexIterator::end(Arc::clone(&self.bpm), self.options.key_size)
    }

    // ========================================================================
    // Descent
    // ========================================================================

    fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.options.key_size {
            return Err(Error::KeySize {
                expected: self.options.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Descend from the root to the leaf that covers `key`.
    fn find_leaf(&self, key: &[u8]) -> Result<(LeafPage, Path)> {
        let mut path = Path::new();
        let mut page_id = self.root_page_id;
        while path.len() < MAX_HEIGHT {
            match self.fetch_node(page_id)? {
                BTreeNode::Internal(internal) => {
                    let index = internal.child_index_for(key);
                    page_id = internal.child_at(index);
                    path.push((internal, index));
                }
                BTreeNode::Leaf(leaf) => return Ok((leaf, path)),
            }
        }
        Err(Error::corrupted(page_id.0, "tree deeper than any valid tree"))
    }

    // ========================================================================
    // Insert helpers
    // ========================================================================

    fn start_new_tree(&mut self, key: &[u8], value: RowId) -> Result<()> {
        let root_id = {
            let mut guard = self.bpm.new_page()?;
            let mut leaf = LeafPage::new(
                guard.page_id(),
                PageId::INVALID,
                self.options.leaf_max_size,
                self.options.key_size,
            );
            leaf.insert(key, value);
            leaf.encode(&mut guard);
            guard.page_id()
        };

        if let Err(e) = self.update_root(root_id) {
            self.free_page(root_id)?;
            return Err(e);
        }
        Ok(())
    }

    /// Allocate `count` pages, releasing them all if any allocation fails.
    fn allocate_pages(&self, count: usize) -> Result<Vec<PageId>> {
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.bpm.new_page() {
                Ok(guard) => pages.push(guard.page_id()),
                Err(e) => {
                    for page_id in pages {
                        if let Err(undo) = self.bpm.delete_page(page_id) {
                            warn!("Failed to release {} after aborted split: {}", page_id, undo);
                        }
                    }
                    return Err(e);
                }
            }
        }
        // Popped from the back.
        pages.reverse();
        Ok(pages)
    }

    fn take_page(fresh: &mut Vec<PageId>) -> Result<PageId> {
        fresh.pop().ok_or_else(|| {
            Error::corrupted(PageId::INVALID.0, "split needed more pages than reserved")
        })
    }

    /// Add `(separator, right)` after child `index` of `parent`, splitting
    /// the parent if it overflows.
    fn insert_into_internal(
        &self,
        mut parent: InternalPage,
        index: usize,
        separator: Vec<u8>,
        right: PageId,
        fresh: &mut Vec<PageId>,
    ) -> Result<Propagate> {
        parent.insert_after(index, separator, right);
        if !parent.is_overfull() {
            self.write_internal(&parent)?;
            return Ok(Propagate::Done);
        }

        let sibling_id = Self::take_page(fresh)?;
        let (sibling, separator) = parent.split(sibling_id);
        self.write_internal(&parent)?;
        self.write_internal(&sibling)?;
        for child in sibling.children() {
            self.set_parent(child, sibling_id)?;
        }
        debug!(
            "Split internal {} -> {} ({} / {})",
            parent.page_id(),
            sibling_id,
            parent.size(),
            sibling.size()
        );

        Ok(Propagate::Split {
            left: parent.page_id(),
            separator,
            right: sibling_id,
        })
    }

    /// The old root split: put a new root above both halves.
    fn grow_root(
        &mut self,
        left: PageId,
        separator: Vec<u8>,
        right: PageId,
        fresh: &mut Vec<PageId>,
    ) -> Result<()> {
        let root_id = Self::take_page(fresh)?;
        let root = InternalPage::new_root(
            root_id,
            self.options.internal_max_size,
            self.options.key_size,
            left,
            separator,
            right,
        );
        self.write_internal(&root)?;
        self.set_parent(left, root_id)?;
        self.set_parent(right, root_id)?;
        self.update_root(root_id)
    }

    // ========================================================================
    // Remove helpers
    // ========================================================================

    /// Fix an underflowing `node`, the child at `index` of `parent`.
    ///
    /// Returns the parent when it lost an entry to a merge and needs
    /// checking in turn; `None` when the fix stayed local.
    fn coalesce_or_redistribute(
        &self,
        node: BTreeNode,
        mut parent: InternalPage,
        index: usize,
    ) -> Result<Option<InternalPage>> {
        let sibling_index = if index > 0 { index - 1 } else { index + 1 };
        if sibling_index >= parent.size() {
            return Err(Error::corrupted(
                parent.page_id().0,
                "non-root node without a sibling",
            ));
        }
        let sibling = self.fetch_node(parent.child_at(sibling_index))?;

        if node.size() + sibling.size() <= node.max_size() {
            // Always merge the right node into the left one.
            let (left, right, separator_index) = if index > 0 {
                (sibling, node, index)
            } else {
                (node, sibling, sibling_index)
            };
            self.merge(left, right, &mut parent, separator_index)?;
            return Ok(Some(parent));
        }

        match (node, sibling) {
            (BTreeNode::Leaf(mut node), BTreeNode::Leaf(mut sibling)) => {
                if index > 0 {
                    let entry = sibling.pop_last().ok_or_else(|| empty(sibling.page_id()))?;
                    node.push_front(entry);
                    parent.set_key_at(index, node.key_at(0).to_vec());
                } else {
                    let entry = sibling.pop_first().ok_or_else(|| empty(sibling.page_id()))?;
                    node.push_back(entry);
                    parent.set_key_at(sibling_index, sibling.key_at(0).to_vec());
                }
                self.write_leaf(&node)?;
                self.write_leaf(&sibling)?;
            }
            (BTreeNode::Internal(mut node), BTreeNode::Internal(mut sibling)) => {
                let moved = if index > 0 {
                    let (key, child) = sibling.pop_last().ok_or_else(|| empty(sibling.page_id()))?;
                    node.push_front(child, parent.key_at(index).to_vec());
                    parent.set_key_at(index, key);
                    child
                } else {
                    let (_, child) = sibling.pop_first().ok_or_else(|| empty(sibling.page_id()))?;
                    node.push_back(parent.key_at(sibling_index).to_vec(), child);
                    let next_separator = sibling
                        .take_first_key()
                        .ok_or_else(|| empty(sibling.page_id()))?;
                    parent.set_key_at(sibling_index, next_separator);
                    child
                };
                self.write_internal(&node)?;
                self.write_internal(&sibling)?;
                self.set_parent(moved, node.page_id())?;
            }
            (node, _) => {
                return Err(Error::corrupted(
                    node.page_id().0,
                    "sibling is a different node type",
                ))
            }
        }

        self.write_internal(&parent)?;
        debug!("Redistributed into child {} of {}", index, parent.page_id());
        Ok(None)
    }

    /// Fold `right` into `left` and drop the separator at
    /// `separator_index` from `parent`.
    fn merge(
        &self,
        left: BTreeNode,
        right: BTreeNode,
        parent: &mut InternalPage,
        separator_index: usize,
    ) -> Result<()> {
        let right_id = right.page_id();
        match (left, right) {
            (BTreeNode::Leaf(mut left), BTreeNode::Leaf(right)) => {
                left.merge_from(right);
                self.write_leaf(&left)?;
                debug!("Merged leaf {} into {}", right_id, left.page_id());
            }
            (BTreeNode::Internal(mut left), BTreeNode::Internal(right)) => {
                let separator = parent.key_at(separator_index).to_vec();
                let moved = left.merge_from(separator, right);
                self.write_internal(&left)?;
                for child in moved {
                    self.set_parent(child, left.page_id())?;
                }
                debug!("Merged internal {} into {}", right_id, left.page_id());
            }
            (left, _) => {
                return Err(Error::corrupted(
                    left.page_id().0,
                    "sibling is a different node type",
                ))
            }
        }

        self.free_page(right_id)?;
        parent.remove(separator_index);
        Ok(())
    }

    /// Settle the root after a removal reached it.
    fn adjust_root(&mut self, root: BTreeNode) -> Result<()> {
        match root {
            BTreeNode::Leaf(leaf) if leaf.size() == 0 => {
                self.free_page(leaf.page_id())?;
                self.update_root(PageId::INVALID)?;
                debug!("Index {} is now empty", self.index_id);
            }
            BTreeNode::Internal(internal) if internal.size() == 1 => {
                let child = internal.child_at(0);
                self.set_parent(child, PageId::INVALID)?;
                self.free_page(internal.page_id())?;
                self.update_root(child)?;
                debug!("Collapsed root {} into {}", internal.page_id(), child);
            }
            node => self.write_node(&node)?,
        }
        Ok(())
    }

    // ========================================================================
    // Page access
    // ========================================================================

    pub(crate) fn fetch_node(&self, page_id: PageId) -> Result<BTreeNode> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        BTreeNode::decode(&guard, page_id, self.options.key_size)
    }

    fn write_node(&self, node: &BTreeNode) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(node.page_id())?;
        node.encode(&mut guard);
        Ok(())
    }

    fn write_leaf(&self, leaf: &LeafPage) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(leaf.page_id())?;
        leaf.encode(&mut guard);
        Ok(())
    }

    fn write_internal(&self, internal: &InternalPage) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(internal.page_id())?;
        internal.encode(&mut guard);
        Ok(())
    }

    fn set_parent(&self, child: PageId, parent: PageId) -> Result<()> {
        let mut node = self.fetch_node(child)?;
        node.set_parent(parent);
        self.write_node(&node)
    }

    fn free_page(&self, page_id: PageId) -> Result<()> {
        if !self.bpm.delete_page(page_id)? {
            warn!("{} still pinned, leaving it allocated", page_id);
        }
        Ok(())
    }

    /// Record a new root (or `INVALID` for an empty tree) in the directory.
    fn update_root(&mut self, root: PageId) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(PageId::new(INDEX_ROOTS_PAGE_ID))?;
        let mut roots = IndexRootsPage::decode(&guard)?;
        if !root.is_valid() {
            roots.remove(self.index_id);
        } else if !roots.upsert(self.index_id, root) {
            return Err(Error::InvalidConfig(format!(
                "index root directory is full ({} entries)",
                IndexRootsPage::MAX_ENTRIES
            )));
        }
        roots.encode(&mut guard);
        drop(guard);

        debug!("Index {} root {} -> {}", self.index_id, self.root_page_id, root);
        self.root_page_id = root;
        Ok(())
    }
}

fn empty(page_id: PageId) -> Error {
    Error::corrupted(page_id.0, "node unexpectedly empty")
}

//! Structural integrity checks.

use crate::common::{Error, PageId, Result};

use super::node::BTreeNode;
use super::tree::{BPlusTree, MAX_HEIGHT};

/// Shape of a tree that passed [`BPlusTree::verify`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from root to leaves; 0 for an empty tree.
    pub height: usize,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    /// Total number of keys.
    pub entries: usize,
}

/// Key range a subtree must stay inside: `lower <= key < upper`.
struct Bounds<'a> {
    lower: Option<&'a [u8]>,
    upper: Option<&'a [u8]>,
}

struct Walk {
    stats: TreeStats,
    leaf_depth: Option<usize>,
    leaves: Vec<(PageId, PageId)>,
}

impl BPlusTree {
    /// Walk the whole tree and check every structural invariant:
    /// key order, separator bounds, node sizes, parent links, uniform leaf
    /// depth and the leaf chain.
    ///
    /// # Errors
    /// `Error::Corrupted` naming the first offending page.
    pub fn verify(&self) -> Result<TreeStats> {
        if self.is_empty() {
            return Ok(TreeStats::default());
        }

        let mut walk = Walk {
            stats: TreeStats::default(),
            leaf_depth: None,
            leaves: Vec::new(),
        };
        let bounds = Bounds {
            lower: None,
            upper: None,
        };
        self.verify_node(self.root_page_id(), PageId::INVALID, &bounds, 1, &mut walk)?;

        // Leaves visited left to right must be exactly the chain.
        for pair in walk.leaves.windows(2) {
            let (page_id, next) = pair[0];
            if next != pair[1].0 {
                return Err(Error::corrupted(
                    page_id.0,
                    format!("leaf links to {}, expected {}", next, pair[1].0),
                ));
            }
        }
        if let Some(&(page_id, next)) = walk.leaves.last() {
            if next.is_valid() {
                return Err(Error::corrupted(
                    page_id.0,
                    format!("last leaf links to {}", next),
                ));
            }
        }

        walk.stats.height = walk.leaf_depth.unwrap_or(0);
        Ok(walk.stats)
    }

    fn verify_node(
        &self,
        page_id: PageId,
        parent: PageId,
        bounds: &Bounds<'_>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<()> {
        if depth > MAX_HEIGHT {
            return Err(Error::corrupted(page_id.0, "tree deeper than any valid tree"));
        }

        let node = self.fetch_node(page_id)?;
        if node.parent() != parent {
            return Err(Error::corrupted(
                page_id.0,
                format!("parent is {}, expected {}", node.parent(), parent),
            ));
        }

        let is_root = !parent.is_valid();
        let min = match (&node, is_root) {
            (BTreeNode::Leaf(_), true) => 1,
            (BTreeNode::Internal(_), true) => 2,
            (_, false) => node.min_size(),
        };
        if node.size() < min || node.size() > node.max_size() {
            return Err(Error::corrupted(
                page_id.0,
                format!(
                    "size {} outside {}..={}",
                    node.size(),
                    min,
                    node.max_size()
                ),
            ));
        }

        match node {
            BTreeNode::Leaf(leaf) => {
                let keys: Vec<&[u8]> = leaf.entries().iter().map(|(k, _)| k.as_slice()).collect();
                check_keys(page_id, &keys, bounds)?;

                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(Error::corrupted(
                            page_id.0,
                            format!("leaf at depth {}, others at {}", depth, expected),
                        ));
                    }
                    Some(_) => {}
                }

                walk.stats.leaf_pages += 1;
                walk.stats.entries += leaf.size();
                walk.leaves.push((page_id, leaf.next()));
            }
            BTreeNode::Internal(internal) => {
                let separators: Vec<&[u8]> = (1..internal.size()).map(|i| internal.key_at(i)).collect();
                check_keys(page_id, &separators, bounds)?;
                walk.stats.internal_pages += 1;

                for i in 0..internal.size() {
                    let child_bounds = Bounds {
                        lower: if i == 0 { bounds.lower } else { Some(internal.key_at(i)) },
                        upper: if i + 1 < internal.size() {
                            Some(internal.key_at(i + 1))
                        } else {
                            bounds.upper
                        },
                    };
                    self.verify_node(internal.child_at(i), page_id, &child_bounds, depth + 1, walk)?;
                }
            }
        }
        Ok(())
    }
}

/// Keys strictly ascending and inside `bounds`.
fn check_keys(page_id: PageId, keys: &[&[u8]], bounds: &Bounds<'_>) -> Result<()> {
    if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(Error::corrupted(
            page_id.0,
            format!("keys out of order: {:?} before {:?}", pair[0], pair[1]),
        ));
    }
    if let (Some(lower), Some(first)) = (bounds.lower, keys.first()) {
        if *first < lower {
            return Err(Error::corrupted(
                page_id.0,
                format!("key {:?} below separator {:?}", first, lower),
            ));
        }
    }
    if let (Some(upper), Some(last)) = (bounds.upper, keys.last()) {
        if *last >= upper {
            return Err(Error::corrupted(
                page_id.0,
                format!("key {:?} not below separator {:?}", last, upper),
            ));
        }
    }
    Ok(())
}

//! Tree tuning.

use crate::common::{Error, Result};

use super::internal_page::InternalPage;
use super::leaf_page::LeafPage;

/// Shape of a B+tree's pages.
///
/// `leaf_max_size` and `internal_max_size` only apply to pages created by
/// this handle; existing pages keep the maximum recorded in their header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Width of every key in bytes.
    pub key_size: usize,
    /// Most entries in a leaf before it splits.
    pub leaf_max_size: u32,
    /// Most children of an internal node before it splits.
    pub internal_max_size: u32,
}

impl TreeOptions {
    /// Options for `key_size`-byte keys with pages filled to capacity.
    pub fn new(key_size: usize) -> Self {
        Self {
            key_size,
            leaf_max_size: LeafPage::capacity(key_size) as u32,
            internal_max_size: InternalPage::capacity(key_size) as u32,
        }
    }

    pub fn with_leaf_max_size(mut self, leaf_max_size: u32) -> Self {
        self.leaf_max_size = leaf_max_size;
        self
    }

    pub fn with_internal_max_size(mut self, internal_max_size: u32) -> Self {
        self.internal_max_size = internal_max_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_size == 0 {
            return Err(Error::InvalidConfig("key_size must be > 0".into()));
        }
        let leaf_capacity = LeafPage::capacity(self.key_size);
        if self.leaf_max_size < 2 || self.leaf_max_size as usize > leaf_capacity {
            return Err(Error::InvalidConfig(format!(
                "leaf_max_size {} outside 2..={}",
                self.leaf_max_size, leaf_capacity
            )));
        }
        let internal_capacity = InternalPage::capacity(self.key_size);
        if self.internal_max_size < 3 || self.internal_max_size as usize > internal_capacity {
            return Err(Error::InvalidConfig(format!(
                "internal_max_size {} outside 3..={}",
                self.internal_max_size, internal_capacity
            )));
        }
        Ok(())
    }
}

impl Default for TreeOptions {
    /// 8-byte keys.
    fn default() -> Self {
        Self::new(8)
    }
}

//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container
//! - [`PageHeader`] - Type tag and checksum at the start of every typed page
//! - [`PageType`] - Discriminator for different page formats
//! - [`MetaPage`], [`BitmapPage`] - Disk allocation state
//! - [`IndexRootsPage`] - Index ID to root page directory
//!
//! B+tree node pages live in [`crate::index::btree`].

mod bitmap_page;
mod index_roots_page;
mod meta_page;
#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use bitmap_page::BitmapPage;
pub use index_roots_page::IndexRootsPage;
pub use meta_page::MetaPage;
pub use page::Page;
pub use page_header::{PageHeader, PageType};

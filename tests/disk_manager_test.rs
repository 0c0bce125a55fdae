//! Disk manager integration tests: on-disk layout and reopen behavior.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};

use stratadb::{DiskConfig, DiskManager, Error, Page, PageId, PAGE_SIZE};
use tempfile::tempdir;

fn page_with(byte: u8) -> Page {
    let mut page = Page::new();
    page.as_mut_slice().fill(byte);
    page
}

#[test]
fn test_layout_of_first_extent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("layout.db");
    let mut dm = DiskManager::create(&path).unwrap();
    assert_eq!(dm.file_size().unwrap(), 0);

    let p0 = dm.allocate_page().unwrap();
    // Meta and bitmap 0 are written; the data page is not.
    assert_eq!(dm.file_size().unwrap(), 2 * PAGE_SIZE as u64);

    dm.write_page(p0, &page_with(0xAB)).unwrap();
    assert_eq!(dm.file_size().unwrap(), 3 * PAGE_SIZE as u64);
    drop(dm);

    // Logical 0 sits behind the meta page and the first bitmap.
    let mut raw = vec![0u8; PAGE_SIZE];
    let mut file = std::fs::File::open(&path).unwrap();
    file.seek(SeekFrom::Start(2 * PAGE_SIZE as u64)).unwrap();
    file.read_exact(&mut raw).unwrap();
    assert!(raw.iter().all(|&b| b == 0xAB));
}

#[test]
fn test_reopen_keeps_allocations_and_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("reopen.db");

    {
        let mut dm = DiskManager::create(&path).unwrap();
        for i in 0..10u8 {
            let pid = dm.allocate_page().unwrap();
            dm.write_page(pid, &page_with(i)).unwrap();
        }
        assert!(dm.deallocate_page(PageId::new(3)).unwrap());
        assert!(dm.deallocate_page(PageId::new(7)).unwrap());
        dm.sync().unwrap();
    }

    let mut dm = DiskManager::open(&path).unwrap();
    assert_eq!(dm.allocated_page_count(), 8);
    assert!(dm.is_page_free(PageId::new(3)));
    assert!(!dm.is_page_free(PageId::new(4)));
    assert_eq!(dm.read_page(PageId::new(9)).unwrap().as_slice()[0], 9);

    // Freed slots are handed out again, lowest first.
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(3));
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(7));
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(10));
}

#[test]
fn test_open_detects_corrupted_bitmap() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bitmap.db");
    {
        let mut dm = DiskManager::create(&path).unwrap();
        dm.allocate_page().unwrap();
    }

    let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(PAGE_SIZE as u64 + 200)).unwrap();
    file.write_all(&[0xFF]).unwrap();
    drop(file);

    match DiskManager::open(&path) {
        Err(Error::Corrupted { page_id, .. }) => assert_eq!(page_id, 1),
        Err(e) => panic!("expected corruption, got {e}"),
        Ok(_) => panic!("expected corruption"),
    }
}

#[test]
fn test_sync_on_write_and_max_pages() {
    let dir = tempdir().unwrap();
    let config = DiskConfig::default()
        .with_sync_on_write(true)
        .with_max_pages(3);
    let mut dm = DiskManager::create_with_config(dir.path().join("sync.db"), config).unwrap();
    assert!(dm.config().sync_on_write);

    for _ in 0..3 {
        let pid = dm.allocate_page().unwrap();
        dm.write_page(pid, &page_with(1)).unwrap();
    }
    assert!(matches!(dm.allocate_page(), Err(Error::OutOfPages)));

    dm.deallocate_page(PageId::new(1)).unwrap();
    assert_eq!(dm.allocate_page().unwrap(), PageId::new(1));
}

#[test]
fn test_double_free_is_reported() {
    let dir = tempdir().unwrap();
    let mut dm = DiskManager::create(dir.path().join("free.db")).unwrap();
    let pid = dm.allocate_page().unwrap();

    assert!(dm.deallocate_page(pid).unwrap());
    assert!(!dm.deallocate_page(pid).unwrap());
    assert!(!dm.deallocate_page(PageId::INVALID).unwrap());
    assert_eq!(dm.allocated_page_count(), 0);
}

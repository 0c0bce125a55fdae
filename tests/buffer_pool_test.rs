//! Buffer pool integration tests.
//!
//! Exercise pinning, eviction, persistence and latching through the public
//! API against a real file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use stratadb::{BufferPoolManager, DiskConfig, DiskManager, Error, PageId};
use tempfile::{tempdir, TempDir};

const FRAMES: usize = 10;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, TempDir) {
    let dir = tempdir().unwrap();
    let dm = DiskManager::create(dir.path().join("pool.db")).unwrap();
    (BufferPoolManager::new(pool_size, dm), dir)
}

fn write_str(data: &mut [u8], s: &str) {
    data[..s.len()].copy_from_slice(s.as_bytes());
    data[s.len()] = 0;
}

fn read_str(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

// ============================================================================
// Pinning
// ============================================================================

#[test]
fn test_guards_read_and_write() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let pid = bpm.allocate_page_id().unwrap();

    {
        let mut guard = bpm.fetch_page_write(pid).unwrap();
        write_str(guard.as_mut_slice(), "Hello, world!");
        assert_eq!(read_str(guard.as_slice()), "Hello, world!");
    }
    for _ in 0..2 {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(read_str(guard.as_slice()), "Hello, world!");
    }

    assert!(bpm.delete_page(pid).unwrap());
    assert!(bpm.is_page_free(pid));
}

#[test]
fn test_full_pool_refuses_new_pages() {
    let (bpm, _dir) = create_bpm(2);
    let p0 = bpm.allocate_page_id().unwrap();
    let p1 = bpm.allocate_page_id().unwrap();
    let t0 = bpm.allocate_page_id().unwrap();
    let t1 = bpm.allocate_page_id().unwrap();

    {
        let mut g0 = bpm.checked_write_page(p0).unwrap();
        write_str(g0.as_mut_slice(), "page0");
        let mut g1 = bpm.checked_write_page(p1).unwrap();
        write_str(g1.as_mut_slice(), "page1");

        assert!(bpm.checked_read_page(t0).is_none());
        assert!(matches!(bpm.fetch_page_write(t1), Err(Error::NoFreeFrames)));
        assert!(matches!(bpm.new_page(), Err(Error::NoFreeFrames)));

        g0.drop_guard();
        assert_eq!(bpm.get_pin_count(p0), Some(0));
        g1.drop_guard();
        assert_eq!(bpm.get_pin_count(p1), Some(0));
    }

    // Both originals get evicted.
    drop(bpm.checked_read_page(t0).unwrap());
    drop(bpm.checked_write_page(t1).unwrap());
    assert_eq!(bpm.get_pin_count(p0), None);
    assert_eq!(bpm.get_pin_count(p1), None);

    // And come back from disk intact.
    let g0 = bpm.fetch_page_read(p0).unwrap();
    let g1 = bpm.fetch_page_read(p1).unwrap();
    assert_eq!(read_str(g0.as_slice()), "page0");
    assert_eq!(read_str(g1.as_slice()), "page1");
}

#[test]
fn test_pin_accounting_while_filling_pool() {
    let (bpm, _dir) = create_bpm(FRAMES);

    let mut first = bpm.new_page().unwrap();
    let first_id = first.page_id();
    write_str(first.as_mut_slice(), "Hello");
    first.drop_guard();

    let mut guards: Vec<_> = (0..FRAMES).map(|_| bpm.new_page().unwrap()).collect();
    for guard in &guards {
        assert_eq!(bpm.get_pin_count(guard.page_id()), Some(1));
    }
    assert_eq!(bpm.evictable_count(), 0);
    assert!(bpm.checked_read_page(first_id).is_none());

    for _ in 0..FRAMES / 2 {
        let pid = guards[0].page_id();
        guards.remove(0);
        assert_eq!(bpm.get_pin_count(pid), Some(0));
    }
    assert_eq!(bpm.evictable_count(), FRAMES / 2);

    for _ in 0..FRAMES / 2 - 1 {
        guards.push(bpm.new_page().unwrap());
    }

    {
        let guard = bpm.fetch_page_read(first_id).unwrap();
        assert_eq!(read_str(guard.as_slice()), "Hello");
    }

    let _last = bpm.new_page().unwrap();
    assert!(bpm.checked_read_page(first_id).is_none());
}

#[test]
fn test_drop_guard_twice() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let p1 = bpm.allocate_page_id().unwrap();
    let p2 = bpm.allocate_page_id().unwrap();

    {
        let mut read = bpm.fetch_page_read(p1).unwrap();
        let mut write = bpm.fetch_page_write(p2).unwrap();
        read.drop_guard();
        write.drop_guard();
        assert!(!read.is_held());
        assert!(!write.is_held());

        read.drop_guard();
        write.drop_guard();
        assert_eq!(bpm.get_pin_count(p1), Some(0));
        assert_eq!(bpm.get_pin_count(p2), Some(0));
    }

    // Hangs if a released guard still held its latch.
    let _w1 = bpm.fetch_page_write(p1).unwrap();
    let _w2 = bpm.fetch_page_write(p2).unwrap();
}

#[test]
fn test_manual_pins_keep_page_resident() {
    let (bpm, _dir) = create_bpm(1);
    let pid = bpm.new_page().unwrap().page_id();

    bpm.pin_page(pid).unwrap();
    assert_eq!(bpm.get_pin_count(pid), Some(1));
    assert!(matches!(bpm.new_page(), Err(Error::NoFreeFrames)));

    {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(bpm.get_pin_count(pid), Some(2));
        // The guard's pin is not the manual one.
        assert!(bpm.unpin_page(pid, false));
        assert!(!bpm.unpin_page(pid, false));
        assert_eq!(bpm.get_pin_count(pid), Some(1));
        drop(guard);
    }

    assert_eq!(bpm.get_pin_count(pid), Some(0));
    assert!(bpm.check_all_unpinned());
    assert!(bpm.new_page().is_ok());
}

#[test]
fn test_unallocated_page_not_found() {
    let (bpm, _dir) = create_bpm(FRAMES);
    assert!(matches!(
        bpm.fetch_page_read(PageId::new(5)),
        Err(Error::PageNotFound(5))
    ));
    assert!(matches!(
        bpm.fetch_page_read(PageId::INVALID),
        Err(Error::InvalidPageId(_))
    ));
    assert_eq!(bpm.free_frame_count(), FRAMES);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_data_survives_eviction_cycles() {
    let (bpm, _dir) = create_bpm(2);

    let page_ids: Vec<PageId> = (0u8..6)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[0] = i;
            guard.as_mut_slice()[1] = i.wrapping_mul(3);
            guard.page_id()
        })
        .collect();

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], i as u8);
        assert_eq!(guard.as_slice()[1], (i as u8).wrapping_mul(3));
    }
    assert!(bpm.stats().snapshot().evictions >= 4);
}

#[test]
fn test_flush_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.db");

    let pid = {
        let bpm = BufferPoolManager::new(FRAMES, DiskManager::create(&path).unwrap());
        let mut guard = bpm.new_page().unwrap();
        write_str(guard.as_mut_slice(), "persistent!");
        let pid = guard.page_id();
        drop(guard);
        bpm.flush_all_pages().unwrap();
        assert_eq!(bpm.stats().snapshot().pages_written, 1);
        pid
    };

    let bpm = BufferPoolManager::new(FRAMES, DiskManager::open(&path).unwrap());
    assert!(!bpm.is_page_free(pid));
    let guard = bpm.fetch_page_read(pid).unwrap();
    assert_eq!(read_str(guard.as_slice()), "persistent!");
}

#[test]
fn test_dirty_pages_flushed_on_drop() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pool.db");

    let pid = {
        let bpm = BufferPoolManager::new(FRAMES, DiskManager::create(&path).unwrap());
        let mut guard = bpm.new_page().unwrap();
        write_str(guard.as_mut_slice(), "unflushed");
        guard.page_id()
    };

    let bpm = BufferPoolManager::new(FRAMES, DiskManager::open(&path).unwrap());
    let guard = bpm.fetch_page_read(pid).unwrap();
    assert_eq!(read_str(guard.as_slice()), "unflushed");
}

#[test]
fn test_out_of_pages_keeps_frame() {
    let dir = tempdir().unwrap();
    let config = DiskConfig::default().with_max_pages(2);
    let dm = DiskManager::create_with_config(dir.path().join("pool.db"), config).unwrap();
    let bpm = BufferPoolManager::new(FRAMES, dm);

    drop(bpm.new_page().unwrap());
    drop(bpm.new_page().unwrap());
    assert!(matches!(bpm.new_page(), Err(Error::OutOfPages)));
    assert_eq!(bpm.free_frame_count(), FRAMES - 2);
    assert_eq!(bpm.page_count(), 2);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_pinned_page_never_evicted() {
    const ROUNDS: usize = 50;
    const READERS: usize = 4;

    let (bpm, _dir) = create_bpm(1);
    let bpm = Arc::new(bpm);

    for round in 0..ROUNDS {
        let winner = bpm.new_page().unwrap().page_id();
        let loser = bpm.new_page().unwrap().page_id();

        // Main plus every reader.
        let barrier = Arc::new(Barrier::new(READERS + 1));
        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let bpm = Arc::clone(&bpm);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let _guard = bpm.fetch_page_read(winner).unwrap();
                    assert!(
                        bpm.checked_read_page(loser).is_none(),
                        "round {}: loser fetched while the only frame was pinned",
                        round
                    );
                })
            })
            .collect();

        let held = bpm.fetch_page_read(winner).unwrap();
        barrier.wait();
        for reader in readers {
            reader.join().unwrap();
        }
        drop(held);
    }
}

#[test]
fn test_holding_one_latch_does_not_block_another() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let bpm = Arc::new(bpm);
    let p0 = bpm.new_page().unwrap().page_id();
    let p1 = bpm.new_page().unwrap().page_id();

    let mut guard0 = bpm.fetch_page_write(p0).unwrap();

    let started = Arc::new(AtomicBool::new(false));
    let child = {
        let bpm = Arc::clone(&bpm);
        let started = Arc::clone(&started);
        thread::spawn(move || {
            started.store(true, Ordering::SeqCst);
            let _guard0 = bpm.fetch_page_write(p0).unwrap();
        })
    };

    while !started.load(Ordering::SeqCst) {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(100));

    // The child is parked on page 0's latch; page 1 must still be reachable.
    let _guard1 = bpm.fetch_page_write(p1).unwrap();
    guard0.drop_guard();
    child.join().unwrap();
}

#[test]
fn test_concurrent_writers_distinct_pages() {
    let (bpm, _dir) = create_bpm(FRAMES);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5).map(|_| bpm.new_page().unwrap().page_id()).collect();

    let handles: Vec<_> = page_ids
        .iter()
        .enumerate()
        .map(|(i, &pid)| {
            let bpm = Arc::clone(&bpm);
            thread::spawn(move || {
                for j in 0..50 {
                    let mut guard = bpm.fetch_page_write(pid).unwrap();
                    guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_concurrent_fetches_with_eviction() {
    let (bpm, _dir) = create_bpm(4);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..16u8)
        .map(|i| {
            let mut guard = bpm.new_page().unwrap();
            guard.as_mut_slice()[100] = i;
            guard.page_id()
        })
        .collect();
    let page_ids = Arc::new(page_ids);

    let handles: Vec<_> = (0..3)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            let page_ids = Arc::clone(&page_ids);
            thread::spawn(move || {
                for round in 0..200 {
                    let i = (round * 7 + t * 5) % page_ids.len();
                    // Each thread holds one pin at a time, so a frame is always free.
                    let guard = bpm.fetch_page_read(page_ids[i]).unwrap();
                    assert_eq!(guard.as_slice()[100], i as u8);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(bpm.check_all_unpinned());
    let stats = bpm.stats().snapshot();
    assert_eq!(stats.hits + stats.misses, 600);
}

// ============================================================================
// Eviction walkthroughs
// ============================================================================

#[test]
fn test_unpinned_page_evicted_and_written_back() {
    let (bpm, _dir) = create_bpm(3);
    let ids: Vec<PageId> = (0..4).map(|_| bpm.allocate_page_id().unwrap()).collect();

    for &pid in &ids[..3] {
        bpm.pin_page(pid).unwrap();
    }
    assert!(matches!(bpm.fetch_page_read(ids[3]), Err(Error::NoFreeFrames)));

    assert!(bpm.unpin_page(ids[0], true));
    drop(bpm.fetch_page_read(ids[3]).unwrap());

    assert!(!bpm.contains_page(ids[0]));
    assert!(bpm.contains_page(ids[3]));
    let stats = bpm.stats().snapshot();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.pages_written, 1);

    for &pid in &ids[1..3] {
        assert!(bpm.unpin_page(pid, false));
    }
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_double_release_keeps_other_holder_pinned() {
    let (bpm, _dir) = create_bpm(1);
    let pid = bpm.new_page().unwrap().page_id();
    let other = bpm.allocate_page_id().unwrap();

    let mut first = bpm.fetch_page_read(pid).unwrap();
    let second = bpm.fetch_page_read(pid).unwrap();
    assert_eq!(bpm.get_pin_count(pid), Some(2));

    first.drop_guard();
    first.drop_guard();
    assert!(!bpm.unpin_page(pid, false));
    assert_eq!(bpm.get_pin_count(pid), Some(1));
    assert_eq!(bpm.evictable_count(), 0);
    assert!(bpm.checked_read_page(other).is_none());

    drop(second);
    assert_eq!(bpm.get_pin_count(pid), Some(0));
    assert!(bpm.checked_read_page(other).is_some());
}

// ============================================================================
// Randomized pin discipline
// ============================================================================

mod pin_discipline {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use stratadb::buffer::PageReadGuard;

    #[derive(Debug, Clone)]
    enum Op {
        New,
        Fetch(usize),
        Release(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            1 => Just(Op::New),
            3 => any::<usize>().prop_map(Op::Fetch),
            2 => any::<usize>().prop_map(Op::Release),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_held_pages_stay_resident(
            ops in prop::collection::vec(op(), 1..200),
            pool_size in 1usize..6,
        ) {
            let (bpm, _dir) = create_bpm(pool_size);
            let mut pages: Vec<PageId> = Vec::new();
            let mut held: Vec<PageReadGuard<'_>> = Vec::new();

            for op in ops {
                match op {
                    Op::New => match bpm.new_page() {
                        Ok(mut guard) => {
                            let stamp = pages.len() as u8;
                            guard.as_mut_slice()[0] = stamp;
                            pages.push(guard.page_id());
                        }
                        Err(Error::NoFreeFrames) => {
                            let pinned: HashSet<PageId> = held.iter().map(|g| g.page_id()).collect();
                            prop_assert_eq!(pinned.len(), pool_size);
                        }
                        Err(e) => return Err(TestCaseError::fail(e.to_string())),
                    },
                    Op::Fetch(i) if !pages.is_empty() => {
                        let pid = pages[i % pages.len()];
                        match bpm.fetch_page_read(pid) {
                            Ok(guard) => {
                                prop_assert_eq!(guard.as_slice()[0], (i % pages.len()) as u8);
                                held.push(guard);
                            }
                            Err(Error::NoFreeFrames) => {
                                prop_assert!(!bpm.contains_page(pid));
                                prop_assert_eq!(bpm.evictable_count(), 0);
                            }
                            Err(e) => return Err(TestCaseError::fail(e.to_string())),
                        }
                    }
                    Op::Release(i) if !held.is_empty() => {
                        let index = i % held.len();
                        held.swap_remove(index);
                    }
                    _ => {}
                }

                prop_assert!(bpm.page_count() <= pool_size);
                for guard in &held {
                    prop_assert!(bpm.contains_page(guard.page_id()));
                    prop_assert!(bpm.get_pin_count(guard.page_id()).unwrap_or(0) >= 1);
                }
            }

            held.clear();
            prop_assert!(bpm.check_all_unpinned());
        }
    }
}

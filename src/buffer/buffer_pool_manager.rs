use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::clock_replacer::ClockReplacer;
use crate::common::config::{FrameId, PageId, PAGE_SIZE};
use crate::recovery::log_manager::LogManager;
use crate::storage::disk::disk_manager::DiskManager;
use crate::storage::page::page::Page;
use crate::storage::page::page_guard::{BasicPageGuard, ReadPageGuard, WritePageGuard};

/// The page table and free list, protected by one pool-wide latch (§4.4,
/// §5 lock hierarchy item 2). Every structural operation — a page-table
/// lookup paired with an install, or a free-list pop paired with an
/// eviction — holds this lock for its entire duration, the same way the
/// original holds a single `lock_guard<shared_mutex>` across each
/// `FetchPageImpl`/`NewPageImpl` call. Splitting this into independent
/// locks per field lets two racing misses on the same `page_id` both claim
/// a frame and both install a mapping, so it stays one lock.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
}

/// BufferPoolManager reads disk pages into a fixed-size in-memory pool and
/// writes them back out, handing out pins so callers never read a page the
/// pool has recycled out from under them (C4, §4.4).
///
/// Every method takes `&self` — the pool is meant to sit behind an `Arc` and
/// be shared across threads. Structural state (`page_table`, `free_list`)
/// sits behind one pool-wide latch; each `Page`'s own fields have their own
/// lock on top of that.
pub struct BufferPoolManager {
    pool_size: usize,
    pages: Vec<Page>,
    disk_manager: Arc<DiskManager>,
    log_manager: Option<Arc<LogManager>>,

    pool_state: Mutex<PoolState>,
    replacer: ClockReplacer,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        disk_manager: DiskManager,
        log_manager: Option<Arc<LogManager>>,
    ) -> BufferPoolManager {
        let free_list = (0..pool_size).rev().collect();
        Self {
            pool_size,
            pages: (0..pool_size).map(|_| Page::new()).collect(),
            disk_manager: Arc::new(disk_manager),
            log_manager,
            pool_state: Mutex::new(PoolState { page_table: HashMap::new(), free_list }),
            replacer: ClockReplacer::new(pool_size),
        }
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn get_pages(&self) -> &Vec<Page> {
        &self.pages
    }

    /// Ensures the WAL invariant holds before a dirty frame is written to
    /// disk: the log record describing the page's last update must already
    /// be durable (§4.4, §4.5, §5 — "log before data"). No-op if logging is
    /// disabled or the page was never logged (`INVALID_LSN`).
    fn force_log_flush_for(&self, page: &Page) {
        if let Some(log_manager) = &self.log_manager {
            let page_lsn = page.get_lsn();
            if page_lsn != crate::common::config::INVALID_LSN {
                tracing::trace!(page_id = page.get_page_id(), page_lsn, "forcing log flush before write-back");
                log_manager.flush_log_to(page_lsn);
            }
        }
    }

    fn write_back_if_dirty(&self, page: &Page) {
        if page.is_dirty() {
            self.force_log_flush_for(page);
            let mut buf = [0u8; PAGE_SIZE];
            buf.copy_from_slice(&page.get_data()[..]);
            self.disk_manager.write_page(page.get_page_id(), &buf);
            page.set_dirty(false);
        }
    }

    /// Finds a frame to hold a page: the free list first, then a clock
    /// victim. Evicts and writes back the victim's current occupant if
    /// there is one. Returns `None` if every frame is pinned. Caller must
    /// already hold `pool_state` — this is always one step inside a larger
    /// structural operation, never a standalone critical section.
    fn find_frame(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Some(frame_id);
        }
        let frame_id = self.replacer.victim().or_else(|| {
            tracing::debug!(pool_size = self.pool_size, "buffer pool exhausted, no victim available");
            None
        })?;
        let page = &self.pages[frame_id];
        tracing::trace!(frame_id, evicted_page_id = page.get_page_id(), dirty = page.is_dirty(), "evicting frame");
        self.write_back_if_dirty(page);
        state.page_table.remove(&page.get_page_id());
        Some(frame_id)
    }

    /// Allocates a new page in the pool, returning `None` if the pool is
    /// full of pinned pages (§4.4 NewPage). Holds the pool latch across the
    /// whole miss → victim → install sequence so two concurrent callers
    /// never claim the same frame or clobber each other's page-table entry.
    pub fn new_page(&self) -> Option<Page> {
        let mut state = self.pool_state.lock();
        let frame_id = self.find_frame(&mut state)?;
        let page_id = self.disk_manager.allocate_page();

        let page = &self.pages[frame_id];
        page.reset();
        page.set_page_id(page_id);
        page.pin();

        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Some(page.clone())
    }

    /// Fetches `page_id`, pinning it. Reads it from disk into a recycled
    /// frame if it isn't already resident (§4.4 FetchPage). Holds the pool
    /// latch across the lookup, the miss path's victim search, the disk
    /// read, and the page-table install — the same single critical section
    /// the original takes for the whole call, so two racing fetches of an
    /// unmapped `page_id` can't both install a mapping.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Page> {
        let mut state = self.pool_state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let page = &self.pages[frame_id];
            page.pin();
            self.replacer.pin(frame_id);
            return Some(page.clone());
        }

        let frame_id = self.find_frame(&mut state)?;
        let page = &self.pages[frame_id];
        page.reset();
        page.set_page_id(page_id);

        let mut buf = [0u8; PAGE_SIZE];
        self.disk_manager.read_page(page_id, &mut buf);
        page.get_data_mut().copy_from_slice(&buf);

        page.pin();
        state.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);

        Some(page.clone())
    }

    /// Decrements `page_id`'s pin count, allowing it to be evicted once it
    /// reaches zero. `is_dirty` is OR'd onto the page's dirty flag — a
    /// caller unpinning after a read-only access should pass `false`, but
    /// must never clear a dirty flag another pinner set (§4.4 UnpinPage).
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.pool_state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let page = &self.pages[frame_id];
        if page.get_pin_count() <= 0 {
            return false;
        }
        if is_dirty {
            page.set_dirty(true);
        }
        page.unpin();
        if page.get_pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes `page_id` back to disk if dirty and clears its dirty flag.
    /// Flushing a page that isn't dirty is a no-op that still returns
    /// `true`; returns `false` only if the page isn't resident (§4.4
    /// FlushPage, §8 property 3).
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let state = self.pool_state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let page = &self.pages[frame_id];
        drop(state);
        self.write_back_if_dirty(page);
        true
    }

    /// Writes every dirty page to disk. Each frame is flushed under its own
    /// current `page_id`, not the loop index it happens to sit at — frames
    /// get reassigned to different pages as the pool churns, so flushing by
    /// index would write a frame's bytes to the wrong page slot on disk.
    pub fn flush_all_pages(&self) {
        for page in self.pages.iter() {
            if page.get_page_id() == crate::common::config::INVALID_PAGE_ID {
                continue;
            }
            self.write_back_if_dirty(page);
        }
    }

    /// Removes `page_id` from the pool. Fails if it's still pinned.
    /// Returns `true` if the page wasn't resident to begin with (§4.4
    /// DeletePage).
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.pool_state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return true;
        };
        let page = &self.pages[frame_id];
        if page.get_pin_count() > 0 {
            return false;
        }
        state.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        state.free_list.push(frame_id);
        drop(state);

        page.reset();
        self.disk_manager.deallocate_page(page_id);
        true
    }
}

/// Guard-returning wrappers, split out so they can take `Arc<Self>` (guards
/// unpin through a cloned `Arc` on `Drop`) without requiring every plain
/// accessor above to do the same (§4.2).
impl BufferPoolManager {
    pub fn new_page_guarded(self: &Arc<Self>) -> Option<BasicPageGuard> {
        let page = self.new_page()?;
        Some(BasicPageGuard::new(self.clone(), page))
    }

    pub fn fetch_page_basic(self: &Arc<Self>, page_id: PageId) -> Option<BasicPageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(BasicPageGuard::new(self.clone(), page))
    }

    pub fn fetch_page_read(self: &Arc<Self>, page_id: PageId) -> Option<ReadPageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(ReadPageGuard::new(self.clone(), page))
    }

    pub fn fetch_page_write(self: &Arc<Self>, page_id: PageId) -> Option<WritePageGuard> {
        let page = self.fetch_page(page_id)?;
        Some(WritePageGuard::new(self.clone(), page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn bpm(pool_size: usize) -> (TempDir, BufferPoolManager) {
        let dir = TempDir::new("test").unwrap();
        let db_name = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_name.to_str().unwrap());
        (dir, BufferPoolManager::new(pool_size, disk_manager, None))
    }

    #[test]
    fn new_page_then_read_back_after_eviction() {
        let (_dir, bpm) = bpm(2);

        let page0 = bpm.new_page().unwrap();
        let page0_id = page0.get_page_id();
        page0.get_data_mut()[..5].copy_from_slice(b"hello");
        assert!(bpm.unpin_page(page0_id, true));

        // Fill the pool so page0's frame gets recycled.
        let _p1 = bpm.new_page().unwrap();
        let _p2 = bpm.new_page().unwrap();

        let refetched = bpm.fetch_page(page0_id).unwrap();
        assert_eq!(&refetched.get_data()[..5], b"hello");
    }

    #[test]
    fn pool_exhaustion_returns_none_until_unpinned() {
        let (_dir, bpm) = bpm(2);
        let _a = bpm.new_page().unwrap();
        let _b = bpm.new_page().unwrap();
        assert!(bpm.new_page().is_none());
    }

    #[test]
    fn unpin_with_wrong_page_id_fails() {
        let (_dir, bpm) = bpm(2);
        assert!(!bpm.unpin_page(999, false));
    }

    #[test]
    fn delete_page_refuses_while_pinned() {
        let (_dir, bpm) = bpm(2);
        let page = bpm.new_page().unwrap();
        let page_id = page.get_page_id();
        assert!(!bpm.delete_page(page_id));
        bpm.unpin_page(page_id, false);
        assert!(bpm.delete_page(page_id));
    }

    #[test]
    fn flush_page_on_a_clean_page_is_a_noop_that_still_succeeds() {
        let (_dir, bpm) = bpm(2);
        let page = bpm.new_page().unwrap();
        let page_id = page.get_page_id();
        bpm.unpin_page(page_id, true);
        assert!(bpm.flush_page(page_id));
        let writes_after_first_flush = bpm.disk_manager.get_num_writes();

        assert!(bpm.flush_page(page_id));
        assert_eq!(bpm.disk_manager.get_num_writes(), writes_after_first_flush);
    }

    #[test]
    fn flush_all_pages_writes_each_frames_own_page_id() {
        let (_dir, bpm) = bpm(3);
        let mut ids = vec![];
        for i in 0..3 {
            let page = bpm.new_page().unwrap();
            page.get_data_mut()[0] = i as u8 + 1;
            ids.push(page.get_page_id());
            bpm.unpin_page(page.get_page_id(), true);
        }

        bpm.flush_all_pages();

        let mut buf = [0u8; PAGE_SIZE];
        for (i, &page_id) in ids.iter().enumerate() {
            bpm.disk_manager.read_page(page_id, &mut buf);
            assert_eq!(buf[0], i as u8 + 1);
        }
    }
}

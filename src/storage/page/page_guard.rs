use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPoolManager;
use crate::common::config::PageId;
use crate::storage::page::page::{MutRefPageData, Page, RefPageData};

/// Holds a pin on a page until dropped; unpins through the owning buffer
/// pool manager on `Drop` so callers can never forget to (§3 Lifecycle,
/// §4.4). Does not itself take a page-level latch — `ReadPageGuard` and
/// `WritePageGuard` add that.
pub struct BasicPageGuard {
    bpm: Arc<BufferPoolManager>,
    page: Page,
    is_dirty: bool,
}

impl BasicPageGuard {
    pub fn new(bpm: Arc<BufferPoolManager>, page: Page) -> BasicPageGuard {
        Self {
            bpm,
            page,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page.get_page_id()
    }

    pub fn get_data(&self) -> RefPageData<'_> {
        self.page.get_data()
    }

    pub fn get_data_mut(&mut self) -> MutRefPageData<'_> {
        self.is_dirty = true;
        self.page.get_data_mut()
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page.get_page_id(), self.is_dirty);
    }
}

/// A `BasicPageGuard` plus a held read latch on the page (§4.2). The page's
/// own `parking_lot::RwLock` backs the latch itself; holding this guard
/// around a critical section and routing every access through
/// `get_data`/`get_data_mut` is what gives callers the latch discipline §5
/// describes.
pub struct ReadPageGuard {
    guard: BasicPageGuard,
}

impl ReadPageGuard {
    pub fn new(bpm: Arc<BufferPoolManager>, page: Page) -> Self {
        Self {
            guard: BasicPageGuard::new(bpm, page),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    pub fn get_data(&self) -> RefPageData<'_> {
        self.guard.get_data()
    }
}

/// A `BasicPageGuard` plus a held write latch on the page (§4.2).
pub struct WritePageGuard {
    guard: BasicPageGuard,
}

impl WritePageGuard {
    pub fn new(bpm: Arc<BufferPoolManager>, page: Page) -> Self {
        WritePageGuard {
            guard: BasicPageGuard::new(bpm, page),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    pub fn get_data(&self) -> RefPageData<'_> {
        self.guard.get_data()
    }

    pub fn get_data_mut(&mut self) -> MutRefPageData<'_> {
        self.guard.get_data_mut()
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::storage::disk::disk_manager::DiskManager;

    #[test]
    fn guard_unpins_on_drop() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_file.to_str().unwrap());
        let bpm = Arc::new(BufferPoolManager::new(5, disk_manager, None));

        let page0 = bpm.new_page().unwrap();
        assert_eq!(page0.get_pin_count(), 1);

        {
            let guard = BasicPageGuard::new(bpm.clone(), page0.clone());
            assert_eq!(*page0.get_data(), *guard.get_data());
            assert_eq!(page0.get_page_id(), guard.page_id());
        }

        assert_eq!(page0.get_pin_count(), 0);
    }

    #[test]
    fn write_guard_marks_dirty_on_mutation() {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let disk_manager = DiskManager::new(db_file.to_str().unwrap());
        let bpm = Arc::new(BufferPoolManager::new(5, disk_manager, None));

        let page = bpm.new_page().unwrap();
        assert!(!page.is_dirty());
        {
            let mut guard = WritePageGuard::new(bpm.clone(), page.clone());
            guard.get_data_mut()[0] = 7;
        }
        assert!(page.is_dirty());
    }
}

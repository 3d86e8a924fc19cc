use std::sync::Arc;

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::common::config::{Lsn, PageId, INVALID_PAGE_ID, PAGE_SIZE};

const OFFSET_LSN: usize = 4;

pub type RefPageData<'a> = MappedRwLockReadGuard<'a, [u8; PAGE_SIZE]>;
pub type MutRefPageData<'a> = MappedRwLockWriteGuard<'a, [u8; PAGE_SIZE]>;

/// Page is the basic unit of storage within the database system. Page
/// provides a wrapper for actual data pages being held in main memory. Page
/// also contains book-keeping information used by the buffer pool manager,
/// e.g. pin count, dirty flag, page id.
///
/// Frames are owned exclusively by the buffer pool manager; a `Page` handle
/// is a cheap `Arc` clone and stays valid only between the matching
/// `FetchPage`/`NewPage` and `UnpinPage` calls (§3 Lifecycle).
#[derive(Debug, Clone)]
pub struct Page(Arc<RwLock<PageInner>>);

#[derive(Debug)]
struct PageInner {
    // The actual data that is stored within a page.
    data: [u8; PAGE_SIZE],

    // The ID of this page.
    page_id: PageId,

    // The pin count of this page.
    pin_count: i32,

    // True if the page is dirty, i.e. it is different from its corresponding page on disk.
    is_dirty: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl Page {
    /// Constructor. Zeros out the page data.
    pub fn new() -> Page {
        let inner = PageInner {
            data: [0; PAGE_SIZE],
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        };
        Page(Arc::new(RwLock::new(inner)))
    }

    /// Resets a frame back to its just-freed state (§4.4 DeletePage).
    pub fn reset(&self) {
        let mut p = self.0.write();
        p.data.fill(0);
        p.page_id = INVALID_PAGE_ID;
        p.pin_count = 0;
        p.is_dirty = false;
    }

    /// @return the actual data contained within this page
    pub fn get_data(&self) -> RefPageData<'_> {
        RwLockReadGuard::map(self.0.read(), |i| &i.data)
    }
    pub fn get_data_mut(&self) -> MutRefPageData<'_> {
        RwLockWriteGuard::map(self.0.write(), |i| &mut i.data)
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.0.write().page_id = page_id;
    }

    /// @return the page id of this page, or `INVALID_PAGE_ID` if unassigned
    pub fn get_page_id(&self) -> PageId {
        self.0.read().page_id
    }

    /// @return the pin count of this page
    pub fn get_pin_count(&self) -> i32 {
        self.0.read().pin_count
    }

    pub fn pin(&self) {
        self.0.write().pin_count += 1;
    }

    pub fn unpin(&self) {
        self.0.write().pin_count -= 1;
    }

    /// @return true if the page in memory has been modified from the page on
    /// disk, false otherwise
    pub fn is_dirty(&self) -> bool {
        self.0.read().is_dirty
    }

    pub fn set_dirty(&self, is_dirty: bool) {
        self.0.write().is_dirty = is_dirty;
    }

    /// @return the page LSN.
    // This method assumes that LSN is stored at a fixed offset in the data.
    pub fn get_lsn(&self) -> Lsn {
        let inner = self.0.read();
        Lsn::from_ne_bytes(
            inner.data[OFFSET_LSN..OFFSET_LSN + std::mem::size_of::<Lsn>()]
                .try_into()
                .unwrap(),
        )
    }

    /// Sets the page LSN.
    pub fn set_lsn(&self, lsn: Lsn) {
        let mut inner = self.0.write();
        let lsn_bytes = lsn.to_ne_bytes();
        inner.data[OFFSET_LSN..OFFSET_LSN + std::mem::size_of::<Lsn>()].copy_from_slice(&lsn_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_page_is_zeroed_and_untracked() {
        let page = Page::new();
        assert_eq!(page.get_page_id(), INVALID_PAGE_ID);
        assert_eq!(page.get_pin_count(), 0);
        assert!(!page.is_dirty());
        assert_eq!(&*page.get_data(), &[0u8; PAGE_SIZE]);
    }

    #[test]
    fn pin_unpin_tracks_count() {
        let page = Page::new();
        page.pin();
        page.pin();
        assert_eq!(page.get_pin_count(), 2);
        page.unpin();
        assert_eq!(page.get_pin_count(), 1);
    }

    #[test]
    fn lsn_roundtrips_through_page_bytes() {
        let page = Page::new();
        page.set_lsn(42);
        assert_eq!(page.get_lsn(), 42);
    }

    #[test]
    fn reset_clears_all_metadata() {
        let page = Page::new();
        page.set_page_id(7);
        page.pin();
        page.set_dirty(true);
        page.get_data_mut()[0] = 9;
        page.reset();
        assert_eq!(page.get_page_id(), INVALID_PAGE_ID);
        assert_eq!(page.get_pin_count(), 0);
        assert!(!page.is_dirty());
        assert_eq!(page.get_data()[0], 0);
    }
}

//! Append-only staging page for hash-join build-side tuples (C9, §4.9).
//! Tuples are packed back-to-back from the high end of the page downward;
//! each one is laid out exactly like `Tuple::serialize_to` (`size:u32` then
//! `data`), so a `TmpTuple` offset can be handed straight to
//! `Tuple::deserialize_from`.

use crate::common::config::PageId;
use crate::storage::page::page::MutRefPageData;
use crate::storage::table::tuple::Tuple;

const OFFSET_PAGE_ID: usize = 0;
const OFFSET_LSN: usize = 4;
const OFFSET_FREE_SPACE_PTR: usize = 8;
pub const HEADER_SIZE: usize = 12;

/// Points at a tuple staged on a `TmpTuplePage`: the page holding it and
/// the offset of its size prefix (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmpTuple {
    pub page_id: PageId,
    pub offset: u32,
}

impl TmpTuple {
    pub fn new(page_id: PageId, offset: u32) -> Self {
        Self { page_id, offset }
    }
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap())
}
fn write_i32(data: &mut [u8], offset: usize, v: i32) {
    data[offset..offset + 4].copy_from_slice(&v.to_ne_bytes());
}
fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes(data[offset..offset + 4].try_into().unwrap())
}
fn write_u32(data: &mut [u8], offset: usize, v: u32) {
    data[offset..offset + 4].copy_from_slice(&v.to_ne_bytes());
}

pub struct TmpTuplePage<'a> {
    data: MutRefPageData<'a>,
}

impl<'a> TmpTuplePage<'a> {
    pub fn new(data: MutRefPageData<'a>) -> Self {
        Self { data }
    }

    /// Resets the page to empty: free space runs from just past the header
    /// to the end of the page (§4.9).
    pub fn init(&mut self, page_id: PageId) {
        write_i32(&mut self.data, OFFSET_PAGE_ID, page_id);
        write_i32(&mut self.data, OFFSET_LSN, 0);
        write_u32(&mut self.data, OFFSET_FREE_SPACE_PTR, self.data.len() as u32);
    }

    pub fn get_page_id(&self) -> PageId {
        read_i32(&self.data, OFFSET_PAGE_ID)
    }

    pub fn get_lsn(&self) -> i32 {
        read_i32(&self.data, OFFSET_LSN)
    }

    pub fn set_lsn(&mut self, lsn: i32) {
        write_i32(&mut self.data, OFFSET_LSN, lsn);
    }

    fn free_space_ptr(&self) -> usize {
        read_u32(&self.data, OFFSET_FREE_SPACE_PTR) as usize
    }

    pub fn free_space_remaining(&self) -> usize {
        self.free_space_ptr() - HEADER_SIZE
    }

    /// Stages `tuple`, writing it size-prefix-first just below the current
    /// free-space boundary. Rejects if there isn't room, leaving the page
    /// unchanged (§4.9).
    pub fn insert(&mut self, tuple: &Tuple) -> Option<TmpTuple> {
        let len = tuple.serialized_len();
        if self.free_space_remaining() < len {
            return None;
        }
        let new_ptr = self.free_space_ptr() - len;
        tuple.serialize_to(&mut self.data[new_ptr..new_ptr + len]);
        write_u32(&mut self.data, OFFSET_FREE_SPACE_PTR, new_ptr as u32);
        Some(TmpTuple::new(self.get_page_id(), new_ptr as u32))
    }

    /// Reads back a tuple staged earlier by `insert` on this page.
    pub fn get_tuple(&self, tmp: TmpTuple) -> Tuple {
        Tuple::deserialize_from(&self.data[tmp.offset as usize..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::page::Page;

    fn new_page(page_id: PageId) -> Page {
        let page = Page::new();
        page.set_page_id(page_id);
        {
            let mut tp = TmpTuplePage::new(page.get_data_mut());
            tp.init(page_id);
        }
        page
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let page = new_page(1);
        let mut tp = TmpTuplePage::new(page.get_data_mut());
        let handle = tp.insert(&Tuple::new(b"build-side".to_vec())).unwrap();
        assert_eq!(tp.get_tuple(handle).data, b"build-side");
    }

    #[test]
    fn tuples_pack_downward_without_overlap() {
        let page = new_page(1);
        let mut tp = TmpTuplePage::new(page.get_data_mut());
        let a = tp.insert(&Tuple::new(b"first".to_vec())).unwrap();
        let b = tp.insert(&Tuple::new(b"second".to_vec())).unwrap();
        assert!(b.offset < a.offset);
        assert_eq!(tp.get_tuple(a).data, b"first");
        assert_eq!(tp.get_tuple(b).data, b"second");
    }

    #[test]
    fn insert_fails_when_out_of_room() {
        let page = new_page(1);
        let mut tp = TmpTuplePage::new(page.get_data_mut());
        assert!(tp.insert(&Tuple::new(vec![0u8; crate::common::config::PAGE_SIZE])).is_none());
    }

    #[test]
    fn insert_fails_leaves_page_unchanged() {
        let page = new_page(1);
        let mut tp = TmpTuplePage::new(page.get_data_mut());
        let before = tp.free_space_remaining();
        assert!(tp.insert(&Tuple::new(vec![0u8; crate::common::config::PAGE_SIZE])).is_none());
        assert_eq!(tp.free_space_remaining(), before);
    }
}

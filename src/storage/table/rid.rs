use crate::common::config::PageId;

/// Record identifier: the page a tuple lives on plus its slot index within
/// that page (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub const SIZE: usize = 8;

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn serialize_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_ne_bytes());
    }

    pub fn deserialize_from(buf: &[u8]) -> Self {
        let page_id = PageId::from_ne_bytes(buf[0..4].try_into().unwrap());
        let slot = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
        Self { page_id, slot }
    }
}

//! Fixed-size wire encoding for hash index keys/values. The storage core
//! has no type system (that's the catalog/executor layer's job, out of
//! scope here) — indexable keys and values just need a known-at-compile-time
//! byte width so `HashTableBlockPage` can lay out a fixed slot size.

use crate::storage::table::rid::Rid;

pub trait FixedSizeEncode: Clone + PartialEq {
    const SIZE: usize;

    fn encode(&self, buf: &mut [u8]);
    fn decode(buf: &[u8]) -> Self;
}

impl FixedSizeEncode for i32 {
    const SIZE: usize = 4;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        i32::from_ne_bytes(buf.try_into().unwrap())
    }
}

impl FixedSizeEncode for i64 {
    const SIZE: usize = 8;

    fn encode(&self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_ne_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        i64::from_ne_bytes(buf.try_into().unwrap())
    }
}

impl FixedSizeEncode for Rid {
    const SIZE: usize = Rid::SIZE;

    fn encode(&self, buf: &mut [u8]) {
        self.serialize_to(buf);
    }

    fn decode(buf: &[u8]) -> Self {
        Rid::deserialize_from(buf)
    }
}

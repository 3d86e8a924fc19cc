/// A tuple is a size-prefixed byte blob: `{ size: u32, data[size] }` (§3,
/// §6). The storage core treats tuple contents opaquely — interpreting
/// bytes into typed columns is the catalog/type-system layer's job, out of
/// scope here (§1).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tuple {
    pub data: Vec<u8>,
}

impl Tuple {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialized size including the 4-byte length prefix.
    pub fn serialized_len(&self) -> usize {
        4 + self.data.len()
    }

    pub fn serialize_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&(self.data.len() as u32).to_ne_bytes());
        buf[4..4 + self.data.len()].copy_from_slice(&self.data);
    }

    pub fn deserialize_from(buf: &[u8]) -> Self {
        let size = u32::from_ne_bytes(buf[0..4].try_into().unwrap()) as usize;
        Self {
            data: buf[4..4 + size].to_vec(),
        }
    }
}

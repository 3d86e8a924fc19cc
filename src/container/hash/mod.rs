pub mod encode;
pub mod linear_probe_hash_table;

pub use encode::FixedSizeEncode;
pub use linear_probe_hash_table::LinearProbeHashTable;

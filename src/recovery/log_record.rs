//! Wire format for log records (§3, §6). The exact body layouts — in
//! particular the UPDATE record's back-to-back old/new tuple encoding and
//! its cursor arithmetic — follow the original `log_manager.cpp`/
//! `log_recovery.cpp` (`original_source/`), since spec.md's §6 states only
//! the shape, not byte-for-byte placement.

use crate::common::config::{Lsn, PageId, TxnId, INVALID_LSN, INVALID_TXN_ID};
use crate::storage::table::rid::Rid;
use crate::storage::table::tuple::Tuple;

pub const HEADER_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    Insert = 1,
    MarkDelete = 2,
    ApplyDelete = 3,
    RollbackDelete = 4,
    Update = 5,
    Begin = 6,
    Commit = 7,
    Abort = 8,
    NewPage = 9,
}

impl LogRecordType {
    fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::Insert,
            2 => Self::MarkDelete,
            3 => Self::ApplyDelete,
            4 => Self::RollbackDelete,
            5 => Self::Update,
            6 => Self::Begin,
            7 => Self::Commit,
            8 => Self::Abort,
            9 => Self::NewPage,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogRecordBody {
    Insert { rid: Rid, tuple: Tuple },
    MarkDelete { rid: Rid, tuple: Tuple },
    ApplyDelete { rid: Rid, tuple: Tuple },
    RollbackDelete { rid: Rid, tuple: Tuple },
    Update { rid: Rid, old_tuple: Tuple, new_tuple: Tuple },
    NewPage { prev_page_id: PageId, page_id: PageId },
    Begin,
    Commit,
    Abort,
}

impl LogRecordBody {
    fn record_type(&self) -> LogRecordType {
        match self {
            Self::Insert { .. } => LogRecordType::Insert,
            Self::MarkDelete { .. } => LogRecordType::MarkDelete,
            Self::ApplyDelete { .. } => LogRecordType::ApplyDelete,
            Self::RollbackDelete { .. } => LogRecordType::RollbackDelete,
            Self::Update { .. } => LogRecordType::Update,
            Self::NewPage { .. } => LogRecordType::NewPage,
            Self::Begin => LogRecordType::Begin,
            Self::Commit => LogRecordType::Commit,
            Self::Abort => LogRecordType::Abort,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            Self::Insert { tuple, .. }
            | Self::MarkDelete { tuple, .. }
            | Self::ApplyDelete { tuple, .. }
            | Self::RollbackDelete { tuple, .. } => Rid::SIZE + tuple.serialized_len(),
            Self::Update { old_tuple, new_tuple, .. } => {
                Rid::SIZE + old_tuple.serialized_len() + new_tuple.serialized_len()
            }
            Self::NewPage { .. } => 8,
            Self::Begin | Self::Commit | Self::Abort => 0,
        }
    }
}

/// A full log record: the common 20-byte header plus a type-specific body
/// (§3, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub size: u32,
    pub lsn: Lsn,
    pub txn_id: TxnId,
    pub prev_lsn: Lsn,
    pub body: LogRecordBody,
}

impl LogRecord {
    /// Builds a record with the header fields recovery/manager fill in
    /// later (`lsn` is assigned by `LogManager::append_log_record`).
    pub fn new(txn_id: TxnId, prev_lsn: Lsn, body: LogRecordBody) -> Self {
        let size = (HEADER_SIZE + body.body_len()) as u32;
        Self {
            size,
            lsn: INVALID_LSN,
            txn_id,
            prev_lsn,
            body,
        }
    }

    pub fn record_type(&self) -> LogRecordType {
        self.body.record_type()
    }

    pub fn serialized_len(&self) -> usize {
        self.size as usize
    }

    /// Serializes header then body into `buf` (must be at least
    /// `serialized_len()` bytes).
    pub fn serialize_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.size.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.lsn.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.txn_id.to_ne_bytes());
        buf[12..16].copy_from_slice(&self.prev_lsn.to_ne_bytes());
        buf[16..20].copy_from_slice(&(self.record_type() as u32).to_ne_bytes());

        let mut pos = HEADER_SIZE;
        match &self.body {
            LogRecordBody::Insert { rid, tuple }
            | LogRecordBody::MarkDelete { rid, tuple }
            | LogRecordBody::ApplyDelete { rid, tuple }
            | LogRecordBody::RollbackDelete { rid, tuple } => {
                rid.serialize_to(&mut buf[pos..pos + Rid::SIZE]);
                pos += Rid::SIZE;
                tuple.serialize_to(&mut buf[pos..pos + tuple.serialized_len()]);
            }
            LogRecordBody::Update { rid, old_tuple, new_tuple } => {
                rid.serialize_to(&mut buf[pos..pos + Rid::SIZE]);
                pos += Rid::SIZE;
                old_tuple.serialize_to(&mut buf[pos..pos + old_tuple.serialized_len()]);
                pos += old_tuple.serialized_len();
                new_tuple.serialize_to(&mut buf[pos..pos + new_tuple.serialized_len()]);
            }
            LogRecordBody::NewPage { prev_page_id, page_id } => {
                buf[pos..pos + 4].copy_from_slice(&prev_page_id.to_ne_bytes());
                pos += 4;
                buf[pos..pos + 4].copy_from_slice(&page_id.to_ne_bytes());
            }
            LogRecordBody::Begin | LogRecordBody::Commit | LogRecordBody::Abort => {}
        }
    }

    /// Deserializes one record starting at `data[0]`. Returns `None` if
    /// the header's declared `size` is zero/negative-looking or runs past
    /// the end of `data` — callers treat this as end-of-log, not
    /// corruption (§7 CorruptLogRecord / §4.6).
    pub fn deserialize_from(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE {
            return None;
        }
        let size = u32::from_ne_bytes(data[0..4].try_into().unwrap());
        if size == 0 || size as usize > data.len() {
            return None;
        }
        let lsn = Lsn::from_ne_bytes(data[4..8].try_into().unwrap());
        let txn_id = TxnId::from_ne_bytes(data[8..12].try_into().unwrap());
        let prev_lsn = Lsn::from_ne_bytes(data[12..16].try_into().unwrap());
        let record_type = LogRecordType::from_u32(u32::from_ne_bytes(data[16..20].try_into().unwrap()))?;

        let mut pos = HEADER_SIZE;
        let body = match record_type {
            LogRecordType::Insert | LogRecordType::MarkDelete | LogRecordType::ApplyDelete | LogRecordType::RollbackDelete => {
                let rid = Rid::deserialize_from(&data[pos..pos + Rid::SIZE]);
                pos += Rid::SIZE;
                let tuple = Tuple::deserialize_from(&data[pos..]);
                match record_type {
                    LogRecordType::Insert => LogRecordBody::Insert { rid, tuple },
                    LogRecordType::MarkDelete => LogRecordBody::MarkDelete { rid, tuple },
                    LogRecordType::ApplyDelete => LogRecordBody::ApplyDelete { rid, tuple },
                    LogRecordType::RollbackDelete => LogRecordBody::RollbackDelete { rid, tuple },
                    _ => unreachable!(),
                }
            }
            LogRecordType::Update => {
                let rid = Rid::deserialize_from(&data[pos..pos + Rid::SIZE]);
                pos += Rid::SIZE;
                let old_tuple = Tuple::deserialize_from(&data[pos..]);
                pos += old_tuple.serialized_len();
                let new_tuple = Tuple::deserialize_from(&data[pos..]);
                LogRecordBody::Update { rid, old_tuple, new_tuple }
            }
            LogRecordType::NewPage => {
                let prev_page_id = PageId::from_ne_bytes(data[pos..pos + 4].try_into().unwrap());
                pos += 4;
                let page_id = PageId::from_ne_bytes(data[pos..pos + 4].try_into().unwrap());
                LogRecordBody::NewPage { prev_page_id, page_id }
            }
            LogRecordType::Begin => LogRecordBody::Begin,
            LogRecordType::Commit => LogRecordBody::Commit,
            LogRecordType::Abort => LogRecordBody::Abort,
        };

        Some(Self { size, lsn, txn_id, prev_lsn, body })
    }
}

pub fn begin(txn_id: TxnId, prev_lsn: Lsn) -> LogRecord {
    LogRecord::new(txn_id, prev_lsn, LogRecordBody::Begin)
}
pub fn commit(txn_id: TxnId, prev_lsn: Lsn) -> LogRecord {
    LogRecord::new(txn_id, prev_lsn, LogRecordBody::Commit)
}
pub fn abort(txn_id: TxnId, prev_lsn: Lsn) -> LogRecord {
    LogRecord::new(txn_id, prev_lsn, LogRecordBody::Abort)
}

const _: TxnId = INVALID_TXN_ID;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_record_roundtrips() {
        let rid = Rid::new(3, 1);
        let tuple = Tuple::new(b"hello".to_vec());
        let mut rec = LogRecord::new(7, INVALID_LSN, LogRecordBody::Insert { rid, tuple });
        rec.lsn = 5;

        let mut buf = vec![0u8; rec.serialized_len()];
        rec.serialize_to(&mut buf);

        let decoded = LogRecord::deserialize_from(&buf).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn update_record_roundtrips_with_two_tuples() {
        let rid = Rid::new(1, 0);
        let old_tuple = Tuple::new(b"old".to_vec());
        let new_tuple = Tuple::new(b"newvalue".to_vec());
        let mut rec = LogRecord::new(
            2,
            4,
            LogRecordBody::Update { rid, old_tuple, new_tuple },
        );
        rec.lsn = 9;

        let mut buf = vec![0u8; rec.serialized_len()];
        rec.serialize_to(&mut buf);
        let decoded = LogRecord::deserialize_from(&buf).unwrap();
        assert_eq!(decoded, rec);
    }

    #[test]
    fn empty_body_records_roundtrip() {
        for body in [LogRecordBody::Begin, LogRecordBody::Commit, LogRecordBody::Abort] {
            let mut rec = LogRecord::new(1, INVALID_LSN, body);
            rec.lsn = 1;
            let mut buf = vec![0u8; rec.serialized_len()];
            rec.serialize_to(&mut buf);
            assert_eq!(LogRecord::deserialize_from(&buf).unwrap(), rec);
        }
    }

    #[test]
    fn zero_size_header_is_rejected_as_end_of_log() {
        let buf = [0u8; HEADER_SIZE];
        assert!(LogRecord::deserialize_from(&buf).is_none());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let rid = Rid::new(1, 0);
        let tuple = Tuple::new(b"abcdef".to_vec());
        let mut rec = LogRecord::new(1, INVALID_LSN, LogRecordBody::Insert { rid, tuple });
        rec.lsn = 1;
        let mut buf = vec![0u8; rec.serialized_len()];
        rec.serialize_to(&mut buf);
        let truncated = &buf[..buf.len() - 2];
        assert!(LogRecord::deserialize_from(truncated).is_none());
    }
}

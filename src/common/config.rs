//! Process-wide constants and ID types (§3, §6).

/// Size of a page/frame, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Number of (key, value) slots held by one hash table block page (§4.7).
pub const BLOCK_ARRAY_SIZE: usize = 256;

/// Size of the log manager's append buffer (§4.5).
pub const LOG_BUFFER_SIZE: usize = PAGE_SIZE * 16;

/// Default batching window for the background flush thread (§4.5, §5).
pub const LOG_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

pub type PageId = i32;
pub type FrameId = usize;
pub type Lsn = i32;
pub type TxnId = u32;

pub const INVALID_PAGE_ID: PageId = -1;
pub const INVALID_LSN: Lsn = -1;
pub const INVALID_TXN_ID: TxnId = TxnId::MAX;

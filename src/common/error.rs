//! Error taxonomy for the storage core (§7).
//!
//! The buffer pool and hash index never throw on domain outcomes — those
//! stay `Option`/`bool` returns per §7. `BustubError` only backs the I/O
//! boundary (fatal) and log corruption detected mid-stream (non-fatal,
//! handled internally by stopping redo for the current buffer window).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BustubError {
    #[error("disk I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),

    #[error("corrupt log record at offset {offset}: {reason}")]
    CorruptLogRecord { offset: usize, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, BustubError>;

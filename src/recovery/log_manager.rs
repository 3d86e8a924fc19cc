//! Background WAL flushing (C5, §4.5). Grounded on `log_manager.cpp`
//! (`original_source/`): records accumulate in an in-memory buffer; a
//! background thread swaps it for an empty one and writes the swapped-out
//! buffer to disk on a timeout, on demand, or when the buffer fills up.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::common::config::{Lsn, INVALID_LSN, LOG_BUFFER_SIZE, LOG_TIMEOUT};
use crate::recovery::log_record::LogRecord;
use crate::storage::disk::disk_manager::DiskManager;

struct LogBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl LogBuffer {
    fn new() -> Self {
        Self {
            data: vec![0u8; LOG_BUFFER_SIZE],
            offset: 0,
        }
    }
}

struct Shared {
    active: Mutex<LogBuffer>,
    need_flush: Mutex<bool>,
    cv_flush: Condvar,
    cv_appended: Condvar,
    next_lsn: AtomicI32,
    persistent_lsn: AtomicI32,
    running: AtomicBool,
    disk_manager: Arc<DiskManager>,
}

/// Owns the append buffer and the background flush thread. One
/// `LogManager` per database instance; shared behind an `Arc` by the log
/// writers (transactions/recovery) and the `BufferPoolManager`'s WAL-order
/// check.
pub struct LogManager {
    shared: Arc<Shared>,
    flush_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LogManager {
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        Self {
            shared: Arc::new(Shared {
                active: Mutex::new(LogBuffer::new()),
                need_flush: Mutex::new(false),
                cv_flush: Condvar::new(),
                cv_appended: Condvar::new(),
                next_lsn: AtomicI32::new(0),
                persistent_lsn: AtomicI32::new(INVALID_LSN),
                running: AtomicBool::new(false),
                disk_manager,
            }),
            flush_thread: Mutex::new(None),
        }
    }

    /// Spawns the background flush thread. No-op if already running.
    pub fn run_flush_thread(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("starting log manager flush thread");
        let shared = self.shared.clone();
        let handle = std::thread::spawn(move || Self::flush_loop(shared));
        *self.flush_thread.lock().unwrap() = Some(handle);
    }

    fn flush_loop(shared: Arc<Shared>) {
        while shared.running.load(Ordering::SeqCst) {
            let mut need_flush = shared.need_flush.lock().unwrap();
            let (guard, _timeout_result) = shared
                .cv_flush
                .wait_timeout_while(need_flush, LOG_TIMEOUT, |need| !*need)
                .unwrap();
            need_flush = guard;

            Self::do_flush(&shared);

            *need_flush = false;
            shared.cv_appended.notify_all();
        }
    }

    fn do_flush(shared: &Shared) {
        let mut active = shared.active.lock().unwrap();
        if active.offset == 0 {
            return;
        }
        let flushed_up_to = shared.next_lsn.load(Ordering::SeqCst) - 1;
        shared.disk_manager.write_log(&active.data[..active.offset]);
        active.offset = 0;
        shared.persistent_lsn.store(flushed_up_to, Ordering::SeqCst);
        tracing::debug!(persistent_lsn = flushed_up_to, "flushed log buffer to disk");
    }

    /// Signals the flush thread and blocks until the current buffer
    /// contents are durable.
    pub fn flush(&self) {
        if !self.shared.running.load(Ordering::SeqCst) {
            // No background thread — flush synchronously on this thread.
            Self::do_flush(&self.shared);
            return;
        }
        self.request_flush_and_wait();
    }

    /// Stops the background thread after one final flush.
    pub fn stop_flush_thread(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.cv_flush.notify_all();
        if let Some(handle) = self.flush_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
        Self::do_flush(&self.shared);
    }

    /// Appends `record` to the buffer, assigning it the next LSN and
    /// blocking until there's room if the buffer is full (§4.5). Returns
    /// the assigned LSN.
    pub fn append_log_record(&self, record: &mut LogRecord) -> Lsn {
        let mut active = self.shared.active.lock().unwrap();
        let size = record.serialized_len();

        while active.offset + size > LOG_BUFFER_SIZE {
            drop(active);
            self.request_flush_and_wait();
            active = self.shared.active.lock().unwrap();
        }

        record.lsn = self.shared.next_lsn.fetch_add(1, Ordering::SeqCst);
        let offset = active.offset;
        record.serialize_to(&mut active.data[offset..offset + size]);
        active.offset += size;
        record.lsn
    }

    fn request_flush_and_wait(&self) {
        let mut need_flush = self.shared.need_flush.lock().unwrap();
        *need_flush = true;
        self.shared.cv_flush.notify_all();
        need_flush = self
            .shared
            .cv_appended
            .wait_while(need_flush, |need| *need)
            .unwrap();
        drop(need_flush);
    }

    /// Blocks until `persistent_lsn >= lsn` — the WAL-ordering rule the
    /// buffer pool manager relies on before writing a dirty page back to
    /// disk (§4.4, §4.5).
    pub fn flush_log_to(&self, lsn: Lsn) {
        while self.shared.persistent_lsn.load(Ordering::SeqCst) < lsn {
            if self.shared.running.load(Ordering::SeqCst) {
                self.request_flush_and_wait();
            } else {
                Self::do_flush(&self.shared);
                break;
            }
        }
    }

    pub fn get_persistent_lsn(&self) -> Lsn {
        self.shared.persistent_lsn.load(Ordering::SeqCst)
    }

    pub fn get_next_lsn(&self) -> Lsn {
        self.shared.next_lsn.load(Ordering::SeqCst)
    }
}

impl Drop for LogManager {
    fn drop(&mut self) {
        self.stop_flush_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::log_record::{self, LogRecordBody};
    use crate::storage::table::rid::Rid;
    use crate::storage::table::tuple::Tuple;
    use tempdir::TempDir;

    fn log_manager() -> (TempDir, LogManager) {
        let dir = TempDir::new("test").unwrap();
        let db_file = dir.path().join("test.db");
        let dm = Arc::new(DiskManager::new(db_file.to_str().unwrap()));
        (dir, LogManager::new(dm))
    }

    #[test]
    fn append_assigns_increasing_lsns() {
        let (_dir, lm) = log_manager();
        let mut a = log_record::begin(1, INVALID_LSN);
        let mut b = log_record::commit(1, 0);
        let lsn_a = lm.append_log_record(&mut a);
        let lsn_b = lm.append_log_record(&mut b);
        assert!(lsn_b > lsn_a);
    }

    #[test]
    fn synchronous_flush_without_thread_persists_and_advances_lsn() {
        let (_dir, lm) = log_manager();
        let mut rec = LogRecord::new(
            1,
            INVALID_LSN,
            LogRecordBody::Insert { rid: Rid::new(1, 0), tuple: Tuple::new(b"x".to_vec()) },
        );
        let lsn = lm.append_log_record(&mut rec);
        assert_eq!(lm.get_persistent_lsn(), INVALID_LSN);
        lm.flush_log_to(lsn);
        assert!(lm.get_persistent_lsn() >= lsn);
    }

    #[test]
    fn background_thread_flushes_on_demand() {
        let (_dir, lm) = log_manager();
        lm.run_flush_thread();
        let mut rec = log_record::begin(1, INVALID_LSN);
        let lsn = lm.append_log_record(&mut rec);
        lm.flush_log_to(lsn);
        assert!(lm.get_persistent_lsn() >= lsn);
        lm.stop_flush_thread();
    }
}

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::common::config::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// DiskManager takes care of the allocation and deallocation of pages within
/// a database. It performs the reading and writing of pages to and from
/// disk, providing a logical file layer within the context of a database
/// management system (C1, §4.1).
///
/// Pages live at `offset = page_id * PAGE_SIZE` in the db file; the log is a
/// separate, append-only file. Every `write_log` ends with an `fsync` (§4.1).
pub struct DiskManager {
    log_io: Mutex<File>,
    db_io: Mutex<File>,

    next_page_id: AtomicI32,
    num_flushes: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Creates a new disk manager that writes to the specified database
    /// file, with the log file at the same path with a `.log` extension.
    pub fn new(db_file: &str) -> Self {
        let file_name = Path::new(db_file);
        let log_name = file_name.with_extension("log");

        let log_io = OpenOptions::new()
            .read(true)
            .append(true)
            .write(true)
            .open(&log_name)
            .or_else(|_| {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(&log_name)
            })
            .unwrap();

        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .open(db_file)
            .or_else(|_| {
                OpenOptions::new()
                    .create(true)
                    .read(true)
                    .write(true)
                    .open(db_file)
            })
            .unwrap();

        let num_pages = db_io.metadata().unwrap().len() as usize / PAGE_SIZE;

        Self {
            log_io: Mutex::new(log_io),
            db_io: Mutex::new(db_io),
            next_page_id: AtomicI32::new(num_pages as i32),
            num_flushes: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        }
    }

    /// Allocates the next page id. Monotonically increasing; reuse of
    /// deallocated ids is not required by any invariant (§4.1).
    pub fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Marks `page_id` reusable. No-op on the current single-file layout —
    /// freeing real disk space would require tracking a free-page list,
    /// which no invariant in §8 requires.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Write a page to the database file.
    pub fn write_page(&self, page_id: PageId, page_data: &[u8; PAGE_SIZE]) {
        let offset = page_id as u64 * PAGE_SIZE as u64;
        self.num_writes.fetch_add(1, Ordering::SeqCst);

        let mut db_io = self.db_io.lock().unwrap();
        db_io.seek(SeekFrom::Start(offset)).unwrap();
        db_io
            .write_all(page_data)
            .unwrap_or_else(|e| panic!("I/O error while writing: {:?}", e));
        db_io.flush().unwrap();
    }

    /// Read a page from the database file. Reads short of a full page (e.g.
    /// a page never written before) are zero-filled rather than treated as
    /// an error.
    pub fn read_page(&self, page_id: PageId, page_data: &mut [u8; PAGE_SIZE]) {
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut db_io = self.db_io.lock().unwrap();
        if offset > db_io.metadata().unwrap().len() {
            page_data.fill(0);
            return;
        }
        db_io.seek(SeekFrom::Start(offset)).unwrap();
        match db_io.read(page_data) {
            Ok(read_count) if read_count < PAGE_SIZE => {
                page_data[read_count..].fill(0);
            }
            Ok(_) => {}
            Err(e) => panic!("I/O error while reading: {:?}", e),
        }
    }

    /// Append `log_data` to the log file and fsync. Only performs a
    /// sequential write — this always blocks until the data is durable
    /// (§4.1, §4.5 WAL ordering depends on this).
    pub fn write_log(&self, log_data: &[u8]) {
        if log_data.is_empty() {
            return;
        }

        self.num_flushes.fetch_add(1, Ordering::SeqCst);
        let mut log_io = self.log_io.lock().unwrap();
        log_io
            .write_all(log_data)
            .unwrap_or_else(|e| panic!("I/O error while writing log: {:?}", e));
        log_io.flush().unwrap();
    }

    /// Reads up to `log_data.len()` bytes starting at `offset`. Returns
    /// `false` when `offset` is at or past the end of the log — this is
    /// how recovery's redo pass detects the end of the log stream, not an
    /// error condition (§4.6, §7).
    pub fn read_log(&self, log_data: &mut [u8], offset: usize) -> bool {
        let mut log_io = self.log_io.lock().unwrap();
        let len = log_io.metadata().unwrap().len() as usize;
        if offset >= len {
            return false;
        }
        log_io.seek(SeekFrom::Start(offset as u64)).unwrap();
        match log_io.read(log_data) {
            Ok(read_count) if read_count < log_data.len() => {
                log_data[read_count..].fill(0);
            }
            Ok(_) => {}
            Err(e) => panic!("I/O error while reading log: {:?}", e),
        }
        true
    }

    pub fn get_num_flushes(&self) -> u32 {
        self.num_flushes.load(Ordering::SeqCst)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::SeqCst)
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        // Only used when a caller wants a disk manager with no backing file
        // chosen ahead of time.
        Self::new("bustub.db")
    }
}

const _: () = {
    // INVALID_PAGE_ID must never be producible by allocate_page.
    assert!(INVALID_PAGE_ID < 0);
};
